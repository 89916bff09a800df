use crate::types::{AgentId, LogEntry, LogStatus, RunId, RunStatus};

/// Event emitted by the orchestrator as a run or test progresses.
///
/// Every variant carries the originating `RunId` so concurrent runs never
/// cross-talk: subscribers filter by id, there is no "current run" slot.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A run or test transitioned to `Running`.
    Started { run_id: RunId },
    /// A log entry arrived from the backend stream (appended newest-last).
    Log { run_id: RunId, entry: LogEntry },
    /// An agent's aggregate status within the run changed. Nodes surface
    /// this through the agent they instantiate.
    AgentStatus {
        run_id: RunId,
        agent_id: AgentId,
        status: LogStatus,
    },
    /// The run reached a terminal status.
    Finished {
        run_id: RunId,
        status: RunStatus,
        errors: Vec<String>,
    },
    /// The log stream dropped before a terminal result arrived.
    TransportLost { run_id: RunId, reason: String },
    /// The backend acknowledged a cancellation request.
    CancelAcknowledged { run_id: RunId },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct RunEventBus {
    tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl RunEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for RunEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
