//! Run and test orchestration.
//!
//! Every invocation, whether a whole-workflow run or a single-agent test,
//! gets its own `RunId` and `RunRecord`; there is no global "current run"
//! slot, so concurrent invocations cannot cross-talk. The orchestrator is an
//! append-only sink for the backend's log stream: entries are never
//! reordered or deduplicated, ordering is the transport's responsibility.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vitalgraph_core::config::RunConfig;
use vitalgraph_core::error::{Result, VitalError};
use vitalgraph_core::event::{RunEvent, RunEventBus};
use vitalgraph_core::types::{AgentId, LogEntry, LogStatus, RunId, RunStatus, WorkflowId};
use vitalgraph_editor::registry::Agent;
use vitalgraph_editor::vars::{self, VariableMap};
use vitalgraph_editor::Workflow;

use crate::client::{ExecutionBackend, RunStreamItem, TestRequest};

/// Timeout policy applied to each run and test.
#[derive(Debug, Clone, Default)]
pub struct RunPolicy {
    /// Mark the run `error("timeout")` if no terminal signal arrives within
    /// this window. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl RunPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
        }
    }
}

/// The state of one run or test, immutable once terminal.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Append-only, newest-last.
    pub log_entries: Vec<LogEntry>,
    pub errors: Vec<String>,
    pub result: Option<serde_json::Value>,
}

impl RunRecord {
    fn new(id: RunId) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            status: RunStatus::Running,
            log_entries: Vec::new(),
            errors: Vec::new(),
            result: None,
        }
    }

    /// Aggregate status for one agent: the newest log entry wins.
    pub fn agent_status(&self, agent: &AgentId) -> Option<LogStatus> {
        self.log_entries
            .iter()
            .rev()
            .find(|e| &e.agent_id == agent)
            .map(|e| e.status)
    }
}

/// Result of a successful single-agent test.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub run_id: RunId,
    pub output: String,
    pub execution_time_ms: Option<u64>,
}

struct RunSlot {
    record: RunRecord,
    cancel: CancellationToken,
}

/// How a run stream ended.
enum StreamEnd {
    Done(crate::client::RunResult),
    TransportLost(String),
    /// The stream closed without a terminal frame.
    Closed,
}

/// Drives tests and runs against the execution backend.
pub struct RunOrchestrator {
    backend: Arc<dyn ExecutionBackend>,
    events: Arc<RunEventBus>,
    policy: RunPolicy,
    runs: Arc<Mutex<HashMap<RunId, RunSlot>>>,
}

impl RunOrchestrator {
    pub fn new(backend: Arc<dyn ExecutionBackend>, events: Arc<RunEventBus>, policy: RunPolicy) -> Self {
        Self {
            backend,
            events,
            policy,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current status of a run, if it exists.
    pub fn status(&self, id: &RunId) -> Option<RunStatus> {
        self.runs.lock().unwrap().get(id).map(|s| s.record.status)
    }

    /// Snapshot of a run's record.
    pub fn record(&self, id: &RunId) -> Option<RunRecord> {
        self.runs.lock().unwrap().get(id).map(|s| s.record.clone())
    }

    /// Drop every terminal run record, returning how many were removed.
    /// Live runs are kept; their records stay queryable until terminal and
    /// pruned.
    pub fn prune_terminal(&self) -> usize {
        let mut runs = self.runs.lock().unwrap();
        let before = runs.len();
        runs.retain(|_, slot| !slot.record.status.is_terminal());
        let pruned = before - runs.len();
        if pruned > 0 {
            debug!(pruned, remaining = runs.len(), "Terminal run records pruned");
        }
        pruned
    }

    /// Request cooperative cancellation of a specific run.
    ///
    /// This only signals intent: the terminal transition to
    /// `error("cancelled")` happens once the backend acknowledges by closing
    /// the stream, so status queries in between still report `Running`.
    pub fn stop(&self, id: &RunId) -> Result<()> {
        let runs = self.runs.lock().unwrap();
        let slot = runs
            .get(id)
            .ok_or_else(|| VitalError::NotFound(format!("run '{}'", id)))?;
        if slot.record.status.is_terminal() {
            debug!(run_id = %id, "Stop requested for already-terminal run");
            return Ok(());
        }
        info!(run_id = %id, "Cancellation requested");
        slot.cancel.cancel();
        Ok(())
    }

    /// Single-agent test: one synchronous backend invocation, no streaming.
    ///
    /// Resolves on backend success, fails on backend-reported error,
    /// timeout, cancellation, or transport loss. There is no stream to
    /// drain, so `stop()` takes effect immediately. Placeholder-marked
    /// variables are stripped before dispatch.
    pub async fn test(
        &self,
        agent: &Agent,
        variables: &VariableMap,
        enable_web_search: bool,
    ) -> Result<TestOutcome> {
        if !agent.is_active {
            return Err(VitalError::Execution(format!(
                "agent '{}' is inactive",
                agent.name
            )));
        }

        let id = RunId::new();
        let cancel = CancellationToken::new();
        {
            let mut runs = self.runs.lock().unwrap();
            runs.insert(
                id.clone(),
                RunSlot {
                    record: RunRecord::new(id.clone()),
                    cancel: cancel.clone(),
                },
            );
        }
        self.events.publish(RunEvent::Started { run_id: id.clone() });
        info!(run_id = %id, agent = %agent.name, "Test started");

        let request = TestRequest {
            agent_id: agent.id.clone(),
            variables: vars::payload(variables),
            enable_web_search,
        };

        let call = async {
            tokio::select! {
                _ = cancel.cancelled() => Err(VitalError::Cancelled),
                result = self.backend.test(request) => result,
            }
        };
        let response = match self.policy.timeout {
            Some(window) => match tokio::time::timeout(window, call).await {
                Ok(result) => result,
                Err(_) => {
                    let secs = window.as_secs();
                    self.finish(&id, RunStatus::Error, vec!["timeout".to_string()], None);
                    return Err(VitalError::Timeout(secs));
                }
            },
            None => call.await,
        };

        match response {
            Ok(response) if response.success => {
                self.finish(
                    &id,
                    RunStatus::Success,
                    Vec::new(),
                    response.output.clone().map(serde_json::Value::String),
                );
                Ok(TestOutcome {
                    run_id: id,
                    output: response.output.unwrap_or_default(),
                    execution_time_ms: response.execution_time_ms,
                })
            }
            Ok(response) => {
                let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
                self.finish(&id, RunStatus::Error, vec![reason.clone()], None);
                Err(VitalError::Execution(reason))
            }
            Err(VitalError::Cancelled) => {
                self.events.publish(RunEvent::CancelAcknowledged { run_id: id.clone() });
                self.finish(&id, RunStatus::Error, vec!["cancelled".to_string()], None);
                Err(VitalError::Cancelled)
            }
            Err(e) => {
                self.finish(&id, RunStatus::Error, vec![e.to_string()], None);
                Err(e)
            }
        }
    }

    /// Start a whole-workflow run. Returns immediately with the run id;
    /// progress is observable via `status`/`record` and the event bus.
    pub async fn start_run(&self, workflow: &Workflow) -> Result<RunId> {
        // Execution order must be well-defined before dispatch
        let order = workflow.topo_order()?;
        debug!(workflow = %workflow.name, nodes = order.len(), "Run order validated");

        let id = RunId::new();
        let cancel = CancellationToken::new();
        {
            let mut runs = self.runs.lock().unwrap();
            runs.insert(
                id.clone(),
                RunSlot {
                    record: RunRecord::new(id.clone()),
                    cancel: cancel.clone(),
                },
            );
        }
        self.events.publish(RunEvent::Started { run_id: id.clone() });
        info!(run_id = %id, workflow = %workflow.name, "Run started");

        let backend = self.backend.clone();
        let events = self.events.clone();
        let runs = self.runs.clone();
        let policy = self.policy.clone();
        let run_id = id.clone();
        let workflow_id = workflow.id.clone();

        tokio::spawn(async move {
            let consume = consume_run(
                backend,
                events.clone(),
                runs.clone(),
                run_id.clone(),
                workflow_id,
                cancel,
            );

            let outcome = match policy.timeout {
                Some(window) => match tokio::time::timeout(window, consume).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(run_id = %run_id, timeout_secs = window.as_secs(), "Run timed out");
                        finish_run(
                            &runs,
                            &events,
                            &run_id,
                            RunStatus::Error,
                            vec!["timeout".to_string()],
                            None,
                        );
                        return;
                    }
                },
                None => consume.await,
            };

            apply_outcome(&runs, &events, &run_id, outcome);
        });

        Ok(id)
    }
}

/// What the consume loop observed.
struct ConsumeOutcome {
    end: StreamEnd,
    cancel_requested: bool,
}

/// Consume the backend's run stream, appending log entries as they arrive.
async fn consume_run(
    backend: Arc<dyn ExecutionBackend>,
    events: Arc<RunEventBus>,
    runs: Arc<Mutex<HashMap<RunId, RunSlot>>>,
    run_id: RunId,
    workflow_id: WorkflowId,
    cancel: CancellationToken,
) -> ConsumeOutcome {
    let mut stream = match backend.run(workflow_id).await {
        Ok(stream) => stream,
        Err(e) => {
            return ConsumeOutcome {
                end: StreamEnd::TransportLost(e.to_string()),
                cancel_requested: cancel.is_cancelled(),
            }
        }
    };

    let mut cancel_requested = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled(), if !cancel_requested => {
                // Keep draining: the terminal transition waits for the
                // backend to acknowledge by ending the stream.
                cancel_requested = true;
                debug!(run_id = %run_id, "Draining stream after cancellation request");
            }
            item = stream.next() => match item {
                Some(Ok(RunStreamItem::Log { entry })) => {
                    append_log(&runs, &events, &run_id, entry);
                }
                Some(Ok(RunStreamItem::Done { result })) => {
                    for entry in result.log_entries.clone() {
                        append_log(&runs, &events, &run_id, entry);
                    }
                    return ConsumeOutcome {
                        end: StreamEnd::Done(result),
                        cancel_requested,
                    };
                }
                Some(Err(e)) => {
                    return ConsumeOutcome {
                        end: StreamEnd::TransportLost(e.to_string()),
                        cancel_requested,
                    };
                }
                None => {
                    return ConsumeOutcome {
                        end: StreamEnd::Closed,
                        cancel_requested,
                    };
                }
            }
        }
    }
}

/// Append one log entry and surface per-entry errors into the aggregate
/// list. A node error does not halt the run; independent branches continue
/// and only the backend's final result decides the terminal status.
fn append_log(
    runs: &Mutex<HashMap<RunId, RunSlot>>,
    events: &RunEventBus,
    run_id: &RunId,
    entry: LogEntry,
) {
    let mut runs = runs.lock().unwrap();
    let Some(slot) = runs.get_mut(run_id) else {
        return;
    };
    if slot.record.status.is_terminal() {
        return;
    }
    if entry.status == LogStatus::Error {
        slot.record
            .errors
            .push(format!("{}: {}", entry.agent_id, entry.message));
    }
    events.publish(RunEvent::AgentStatus {
        run_id: run_id.clone(),
        agent_id: entry.agent_id.clone(),
        status: entry.status,
    });
    events.publish(RunEvent::Log {
        run_id: run_id.clone(),
        entry: entry.clone(),
    });
    slot.record.log_entries.push(entry);
}

fn apply_outcome(
    runs: &Mutex<HashMap<RunId, RunSlot>>,
    events: &RunEventBus,
    run_id: &RunId,
    outcome: ConsumeOutcome,
) {
    match (outcome.cancel_requested, outcome.end) {
        (true, _) => {
            // Backend acknowledged by ending the stream
            events.publish(RunEvent::CancelAcknowledged { run_id: run_id.clone() });
            finish_run(
                runs,
                events,
                run_id,
                RunStatus::Error,
                vec!["cancelled".to_string()],
                None,
            );
        }
        (false, StreamEnd::Done(result)) => {
            let status = if result.success {
                RunStatus::Success
            } else {
                RunStatus::Error
            };
            finish_run(runs, events, run_id, status, result.errors, result.data);
        }
        (false, StreamEnd::TransportLost(reason)) => {
            events.publish(RunEvent::TransportLost {
                run_id: run_id.clone(),
                reason: reason.clone(),
            });
            finish_run(
                runs,
                events,
                run_id,
                RunStatus::Error,
                vec![format!("transport: {}", reason)],
                None,
            );
        }
        (false, StreamEnd::Closed) => {
            // No terminal frame: indeterminate, surfaced as transport loss
            let reason = "stream closed before terminal result".to_string();
            events.publish(RunEvent::TransportLost {
                run_id: run_id.clone(),
                reason: reason.clone(),
            });
            finish_run(
                runs,
                events,
                run_id,
                RunStatus::Error,
                vec![format!("transport: {}", reason)],
                None,
            );
        }
    }
}

fn finish_run(
    runs: &Mutex<HashMap<RunId, RunSlot>>,
    events: &RunEventBus,
    run_id: &RunId,
    status: RunStatus,
    errors: Vec<String>,
    result: Option<serde_json::Value>,
) {
    let mut runs = runs.lock().unwrap();
    let Some(slot) = runs.get_mut(run_id) else {
        return;
    };
    if slot.record.status.is_terminal() {
        return;
    }
    slot.record.status = status;
    slot.record.errors.extend(errors);
    slot.record.result = result;
    info!(run_id = %run_id, status = ?status, errors = slot.record.errors.len(), "Run finished");
    events.publish(RunEvent::Finished {
        run_id: run_id.clone(),
        status,
        errors: slot.record.errors.clone(),
    });
}

impl RunOrchestrator {
    fn finish(
        &self,
        run_id: &RunId,
        status: RunStatus,
        errors: Vec<String>,
        result: Option<serde_json::Value>,
    ) {
        finish_run(&self.runs, &self.events, run_id, status, errors, result);
    }
}
