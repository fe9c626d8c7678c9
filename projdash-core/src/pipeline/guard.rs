//! Single-run guard.
//!
//! At most one refresh holds a [`RunPermit`] at a time. Each acquisition
//! bumps a generation counter; a permit only releases the guard if its
//! generation is still current, so a permit taken over after going stale
//! cannot release its successor.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct GuardState {
    generation: u64,
    active: Option<ActiveRun>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRun {
    generation: u64,
    started: Instant,
    started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<GuardState>,
    stale_after: Duration,
}

/// Process-wide "run in progress" lock with staleness takeover.
#[derive(Debug, Clone)]
pub struct RunGuard {
    inner: Arc<Inner>,
}

impl RunGuard {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GuardState::default()),
                stale_after,
            }),
        }
    }

    /// Acquire the guard, or `Error::AlreadyRunning` if a fresh run holds it.
    pub fn try_acquire(&self) -> Result<RunPermit> {
        let mut state = self.inner.state.lock().map_err(|_| Error::LockPoisoned)?;

        if let Some(active) = state.active {
            let age = active.started.elapsed();
            if age < self.inner.stale_after {
                return Err(Error::AlreadyRunning);
            }
            warn!(
                "Taking over refresh guard held since {} ({}s, generation {})",
                active.started_at.to_rfc3339(),
                age.as_secs(),
                active.generation
            );
        }

        state.generation += 1;
        let generation = state.generation;
        state.active = Some(ActiveRun {
            generation,
            started: Instant::now(),
            started_at: Utc::now(),
        });

        Ok(RunPermit {
            inner: Arc::clone(&self.inner),
            generation,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running_since().is_some()
    }

    /// Start time of the current holder, if any.
    pub fn running_since(&self) -> Option<DateTime<Utc>> {
        self.inner
            .state
            .lock()
            .ok()
            .and_then(|state| state.active.map(|a| a.started_at))
    }
}

/// Proof of holding the guard. Releases on drop.
#[derive(Debug)]
pub struct RunPermit {
    inner: Arc<Inner>,
    generation: u64,
}

impl RunPermit {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        // A poisoned lock still holds valid state; release regardless.
        let mut state = match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.active.is_some_and(|a| a.generation == self.generation) {
            state.active = None;
        }
    }
}
