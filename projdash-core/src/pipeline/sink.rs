//! Event delivery.
//!
//! Progress events are lossy; terminal events wait for room in the channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::events::PipelineEvent;

/// Upper bound on how long a terminal event waits for a slow subscriber.
const TERMINAL_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Sending half of a bounded progress channel.
///
/// `emit` never waits: a full or closed channel drops the event, so a slow
/// or vanished subscriber cannot stall a run. `emit_terminal` waits for
/// capacity, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    /// Bounded channel of `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: PipelineEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Event channel full, dropping {}", event.event_type());
            }
            Err(TrySendError::Closed(event)) => {
                debug!("Event channel closed, dropping {}", event.event_type());
            }
        }
    }

    /// Deliver the final event of a run. Waits for the subscriber to make
    /// room; returns early if it is gone.
    pub async fn emit_terminal(&self, event: PipelineEvent) {
        self.emit_terminal_within(event, TERMINAL_SEND_TIMEOUT).await
    }

    async fn emit_terminal_within(&self, event: PipelineEvent, limit: Duration) {
        let Some(tx) = &self.tx else {
            return;
        };
        let kind = event.event_type();
        match tokio::time::timeout(limit, tx.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("Event channel closed, dropping {}", kind),
            Err(_) => warn!("Subscriber did not drain in time, dropping {}", kind),
        }
    }

    /// True once the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::RunSummary;

    fn done() -> PipelineEvent {
        PipelineEvent::Done(RunSummary::default())
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel(4);
        sink.emit(PipelineEvent::ScanStart);
        sink.emit(PipelineEvent::DeriveStart);
        assert_eq!(rx.recv().await, Some(PipelineEvent::ScanStart));
        assert_eq!(rx.recv().await, Some(PipelineEvent::DeriveStart));
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(PipelineEvent::ScanStart);
        sink.emit(PipelineEvent::DeriveStart);
        assert_eq!(rx.recv().await, Some(PipelineEvent::ScanStart));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_swallowed() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        assert!(sink.is_closed());
        sink.emit(PipelineEvent::ScanStart);

        let noop = EventSink::noop();
        noop.emit(PipelineEvent::ScanStart);
        assert!(!noop.is_closed());
    }

    #[tokio::test]
    async fn test_terminal_event_waits_for_room_in_full_channel() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(PipelineEvent::ScanStart);

        let reader = async {
            let mut seen = Vec::new();
            while let Some(event) = rx.recv().await {
                let last = event.is_terminal();
                seen.push(event);
                if last {
                    break;
                }
            }
            seen
        };
        let (_, seen) = tokio::join!(sink.emit_terminal(done()), reader);

        assert_eq!(seen, vec![PipelineEvent::ScanStart, done()]);
    }

    #[tokio::test]
    async fn test_terminal_event_to_closed_channel_returns() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.emit_terminal(done()).await;
        EventSink::noop().emit_terminal(done()).await;
    }

    #[tokio::test]
    async fn test_terminal_event_gives_up_on_stuck_subscriber() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(PipelineEvent::ScanStart);

        sink.emit_terminal_within(done(), Duration::from_millis(20))
            .await;

        assert_eq!(rx.recv().await, Some(PipelineEvent::ScanStart));
        assert!(rx.try_recv().is_err());
    }
}
