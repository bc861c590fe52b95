//! Event Sinks
//!
//! Observer implementations for engine events. Delivery is
//! fire-and-forget: a sink that cannot accept an event drops it without
//! affecting the execution.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use log::{debug, info};

use super::event::ExecutionEvent;

/// Receives push events from the engine.
///
/// Implementations must tolerate delivery from the engine's worker
/// threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExecutionEvent);
}

/// Forwards events into an mpsc channel for an external transport.
pub struct ChannelSink {
    sender: Mutex<Sender<ExecutionEvent>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ExecutionEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ExecutionEvent) {
        if let Ok(sender) = self.sender.lock() {
            // A disconnected receiver is not the engine's problem
            let _ = sender.send(event);
        }
    }
}

/// Writes events to the log.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ExecutionEvent) {
        match &event {
            ExecutionEvent::ExecutionUpdate {
                execution_id,
                status,
                error,
                ..
            } => match error {
                Some(e) => info!("[{}] status {} ({})", execution_id, status, e),
                None => info!("[{}] status {}", execution_id, status),
            },
            ExecutionEvent::NodeStart {
                execution_id,
                node_id,
                node_kind,
            } => debug!("[{}] node '{}' ({}) starting", execution_id, node_id, node_kind),
            ExecutionEvent::NodeComplete {
                execution_id,
                node_id,
                error,
                ..
            } => match error {
                Some(e) => info!("[{}] node '{}' failed: {}", execution_id, node_id, e),
                None => debug!("[{}] node '{}' complete", execution_id, node_id),
            },
            ExecutionEvent::HumanNotification {
                execution_id,
                message,
                requires_acknowledgment,
                ..
            } => info!(
                "[{}] notification: {}{}",
                execution_id,
                message,
                if *requires_acknowledgment {
                    " (awaiting acknowledgment)"
                } else {
                    ""
                }
            ),
        }
    }
}

/// Discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ExecutionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::registry::ExecutionStatus;
    use std::sync::mpsc::channel;

    fn sample_event() -> ExecutionEvent {
        ExecutionEvent::ExecutionUpdate {
            execution_id: "exec-1".to_string(),
            status: ExecutionStatus::Running,
            current_node_id: None,
            error: None,
            step: 1,
        }
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, rx) = channel();
        let sink = ChannelSink::new(tx);

        sink.emit(sample_event());

        let received = rx.try_recv().unwrap();
        assert_eq!(received, sample_event());
    }

    #[test]
    fn test_channel_sink_ignores_disconnected_receiver() {
        let (tx, rx) = channel();
        let sink = ChannelSink::new(tx);
        drop(rx);

        // Must not panic
        sink.emit(sample_event());
    }

    #[test]
    fn test_null_sink_drops() {
        NullSink.emit(sample_event());
    }

    #[test]
    fn test_log_sink_handles_all_variants() {
        let sink = LogSink;
        sink.emit(sample_event());
        sink.emit(ExecutionEvent::NodeStart {
            execution_id: "e".to_string(),
            node_id: "n".to_string(),
            node_kind: crate::workflow::model::NodeKind::Start,
        });
        sink.emit(ExecutionEvent::NodeComplete {
            execution_id: "e".to_string(),
            node_id: "n".to_string(),
            result: None,
            error: Some("boom".to_string()),
        });
        sink.emit(ExecutionEvent::HumanNotification {
            execution_id: "e".to_string(),
            node_id: "n".to_string(),
            message: "hello".to_string(),
            requires_acknowledgment: true,
        });
    }
}
