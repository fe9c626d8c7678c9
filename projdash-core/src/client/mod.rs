//! Client-side view of a refresh.
//!
//! Anything that consumes the progress stream (the CLI progress display,
//! or a browser through the server) folds events with [`reducer`] and
//! compares before/after views with [`delta`].

pub mod delta;
pub mod reducer;

pub use delta::{
    compute_deltas, snapshot, AggregateDelta, Aggregates, Cause, CauseSummary, ProjectDelta,
    RefreshDeltas, Snapshot,
};
pub use reducer::{reduce, LlmStatus, ProjectProgress, RefreshState, StoreStatus};
