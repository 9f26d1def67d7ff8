//! Event stream for observers of a run.
//!
//! Subscribers get bounded channels. Publishing never blocks: a full
//! subscriber misses the event and a disconnected one is dropped.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};

use crate::action::ActionId;
use crate::error::{ExecutionError, LabError, LabResult};

use super::RunStatus;

/// Something observable happened inside the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LabEvent {
    /// An action went through the pipeline.
    ActionProcessed {
        /// Id of the recorded action.
        action_id: ActionId,
        /// Kind tag as submitted.
        kind: String,
        /// Pipeline verdict.
        is_valid: bool,
        /// Zero-based step the action was submitted in.
        step: u32,
    },
    /// A step goal was met.
    StepAdvanced {
        /// Step that completed.
        from: u32,
        /// Step now active; equals the step count once finished.
        to: u32,
    },
    /// The run changed status.
    StatusChanged {
        /// Previous status.
        from: RunStatus,
        /// New status.
        to: RunStatus,
    },
    /// The final step completed and the run was scored.
    Completed {
        /// Score reported in the session result.
        final_score: f64,
    },
}

/// A bounded subscription to [`LabEvent`]s.
///
/// Events published while the buffer is full are dropped for this
/// subscriber. Dropping the stream unsubscribes on the next publish.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<LabEvent>,
}

impl EventStream {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> LabResult<LabEvent> {
        self.rx
            .recv()
            .map_err(|_| LabError::Execution(ExecutionError::Disconnected))
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> LabResult<LabEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => LabError::Execution(ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => LabError::Execution(ExecutionError::Disconnected),
        })
    }

    /// Next buffered event, if any.
    pub fn try_recv(&self) -> Option<LabEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drains every buffered event.
    pub fn drain(&self) -> Vec<LabEvent> {
        self.rx.try_iter().collect()
    }
}

/// Fan-out to every live subscriber.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<LabEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self, capacity: usize) -> EventStream {
        let (tx, rx) = bounded(capacity.max(1));
        self.subscribers.push(tx);
        EventStream { rx }
    }

    /// Never blocks.
    pub(crate) fn publish(&mut self, event: &LabEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}
