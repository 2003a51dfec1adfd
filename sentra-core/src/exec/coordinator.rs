//! Execution coordinator - ties a command to a run, a parser, and storage
//!
//! A run is non-blocking: `start` returns a handle immediately and the
//! lifecycle proceeds on a spawned task, delivering events through a
//! channel. Whatever the outcome, exactly one history row is recorded;
//! only a storage failure propagates instead.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::FinalCommand;
use crate::intent::IntentType;
use crate::parsers::{OutputParser, ParseError, ParserRegistry};
use crate::registry::ToolRegistry;
use crate::store::{EntityStore, ExecutionRecord, ExecutionStatus, ParseStatus};
use crate::{Error, Result};

use super::runner::{RunStatus, ToolRunner};

/// Notifications delivered while a run progresses
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started { execution_id: String },
    /// Raw tool output, delivered as soon as the process finishes
    Output { chunk: String },
    Completed { record: ExecutionRecord },
}

/// Handle to an in-flight run
pub struct RunHandle {
    pub execution_id: String,
    pub events: mpsc::Receiver<RunEvent>,
    cancel_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<RunStatus>,
    task: JoinHandle<Result<ExecutionRecord>>,
}

impl RunHandle {
    /// Current lifecycle state of the run
    pub fn status(&self) -> RunStatus {
        *self.status_rx.borrow()
    }

    /// Request cancellation; the underlying process is killed and the
    /// run's pending completion is suppressed
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Wait for the run to finish and take its history record
    ///
    /// A storage failure during entity persistence surfaces here.
    pub async fn join(self) -> Result<ExecutionRecord> {
        self.task
            .await
            .map_err(|e| Error::Execution(format!("run task panicked: {}", e)))?
    }
}

/// Coordinates tool runs: execute, parse, store, record
pub struct ExecutionCoordinator {
    runner: Arc<dyn ToolRunner>,
    parsers: Arc<ParserRegistry>,
    store: Arc<Mutex<EntityStore>>,
    timeout: Duration,
    active: Arc<Mutex<HashSet<String>>>,
}

impl ExecutionCoordinator {
    /// Create a coordinator, verifying parser coverage against the tool
    /// registry up front
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        parsers: ParserRegistry,
        tools: &ToolRegistry,
        store: Arc<Mutex<EntityStore>>,
        timeout: Duration,
    ) -> Result<Self> {
        parsers.verify_coverage(tools)?;
        Ok(Self {
            runner,
            parsers: Arc::new(parsers),
            store,
            timeout,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Start a run; returns immediately with a handle
    ///
    /// One run per tool slot: starting an intent that is already running
    /// is an error.
    pub fn start(
        &self,
        intent: IntentType,
        command: FinalCommand,
        stage_id: Option<i64>,
    ) -> Result<RunHandle> {
        let tool_id = intent.as_str().to_string();

        let parser = self
            .parsers
            .get(intent)
            .ok_or_else(|| Error::ParserMissing(tool_id.clone()))?;

        {
            let mut active = self
                .active
                .lock()
                .map_err(|_| Error::Execution("active-run registry poisoned".to_string()))?;
            if !active.insert(tool_id.clone()) {
                return Err(Error::Execution(format!(
                    "{} is already running",
                    tool_id
                )));
            }
        }

        let execution_id = ExecutionRecord::new_execution_id();
        let (event_tx, event_rx) = mpsc::channel(8);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(RunStatus::Idle);

        let runner = Arc::clone(&self.runner);
        let store = Arc::clone(&self.store);
        let active = Arc::clone(&self.active);
        let timeout = self.timeout;
        let task_execution_id = execution_id.clone();

        let task = tokio::spawn(async move {
            let result = run_to_record(
                runner,
                parser,
                store,
                &event_tx,
                &status_tx,
                task_execution_id,
                tool_id.clone(),
                command,
                stage_id,
                timeout,
                cancel_rx,
            )
            .await;

            if let Ok(mut active) = active.lock() {
                active.remove(&tool_id);
            }

            result
        });

        Ok(RunHandle {
            execution_id,
            events: event_rx,
            cancel_tx,
            status_rx,
            task,
        })
    }
}

/// What the raced execution step produced
enum RunOutcome {
    Finished(crate::exec::runner::RunOutput),
    SpawnError(String),
    TimedOut,
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
async fn run_to_record(
    runner: Arc<dyn ToolRunner>,
    parser: Arc<dyn OutputParser>,
    store: Arc<Mutex<EntityStore>>,
    event_tx: &mpsc::Sender<RunEvent>,
    status_tx: &watch::Sender<RunStatus>,
    execution_id: String,
    tool_id: String,
    command: FinalCommand,
    stage_id: Option<i64>,
    timeout: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) -> Result<ExecutionRecord> {
    let started_at = Utc::now();
    let _ = status_tx.send(RunStatus::Running);
    let _ = event_tx
        .send(RunEvent::Started {
            execution_id: execution_id.clone(),
        })
        .await;

    // Race the run against its timeout and the cancellation flag. A
    // cancelled or timed-out run drops the runner future, which kills the
    // child process; its completion never reaches us.
    let outcome = tokio::select! {
        result = runner.run(&command) => match result {
            Ok(output) => RunOutcome::Finished(output),
            Err(e) => RunOutcome::SpawnError(e.to_string()),
        },
        _ = tokio::time::sleep(timeout) => RunOutcome::TimedOut,
        _ = cancel_rx.changed() => RunOutcome::Cancelled,
    };

    let mut run_status = RunStatus::Success;
    let mut status = ExecutionStatus::Success;
    let mut parse_status = ParseStatus::Parsed;
    let mut raw_output = String::new();
    let mut entities_created: u32 = 0;
    let mut error_message: Option<String> = None;

    match outcome {
        RunOutcome::Cancelled => {
            info!(tool_id = %tool_id, "run cancelled");
            run_status = RunStatus::Cancelled;
            status = ExecutionStatus::Failed;
            parse_status = ParseStatus::EmptyOutput;
            error_message = Some("execution cancelled".to_string());
        }
        RunOutcome::TimedOut => {
            warn!(tool_id = %tool_id, timeout_secs = timeout.as_secs(), "run timed out");
            run_status = RunStatus::Timeout;
            status = ExecutionStatus::Failed;
            parse_status = ParseStatus::EmptyOutput;
            error_message = Some(format!(
                "execution timeout after {} seconds",
                timeout.as_secs()
            ));
        }
        RunOutcome::SpawnError(message) => {
            warn!(tool_id = %tool_id, error = %message, "run failed to execute");
            run_status = RunStatus::Failed;
            status = ExecutionStatus::Failed;
            parse_status = ParseStatus::EmptyOutput;
            error_message = Some(message);
        }
        RunOutcome::Finished(output) => {
            raw_output = output.combined();
            if !raw_output.is_empty() {
                let _ = event_tx
                    .send(RunEvent::Output {
                        chunk: raw_output.clone(),
                    })
                    .await;
            }

            if output.exit_code != 0 {
                run_status = RunStatus::Failed;
                status = ExecutionStatus::Failed;
                parse_status = ParseStatus::EmptyOutput;
                error_message =
                    Some(format!("process exited with code {}", output.exit_code));
            } else if raw_output.trim().is_empty() {
                // The tool ran; there was simply nothing to parse
                status = ExecutionStatus::PartialSuccess;
                parse_status = ParseStatus::EmptyOutput;
            } else {
                match parser.parse(&raw_output) {
                    Ok(entities) => {
                        entities_created = persist_entities(&store, &entities)?;
                        debug!(tool_id = %tool_id, entities_created, "entities persisted");
                    }
                    Err(ParseError::NoData(message)) => {
                        // The tool itself succeeded; this is not a failure
                        status = ExecutionStatus::PartialSuccess;
                        parse_status = ParseStatus::ParseFailed;
                        error_message = Some(message);
                    }
                }
            }
        }
    }

    let record = ExecutionRecord {
        execution_id,
        tool_id: tool_id.clone(),
        stage_id,
        status,
        parse_status,
        raw_output,
        started_at,
        completed_at: Utc::now(),
        entities_created,
        error_message,
    };

    {
        let mut store = store
            .lock()
            .map_err(|_| Error::Store("store lock poisoned".to_string()))?;
        store.record_execution(&record)?;
    }

    let _ = status_tx.send(run_status);
    let _ = event_tx
        .send(RunEvent::Completed {
            record: record.clone(),
        })
        .await;

    Ok(record)
}

/// Batch-upsert parsed entities and link the relationship edges their
/// payloads imply
///
/// A failure here is a storage failure: it rolls the batch back and
/// propagates to the caller.
fn persist_entities(
    store: &Arc<Mutex<EntityStore>>,
    entities: &[crate::store::Entity],
) -> Result<u32> {
    let mut store = store
        .lock()
        .map_err(|_| Error::Store("store lock poisoned".to_string()))?;

    let count = store.upsert_batch(entities)?;

    let batch_ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    for entity in entities {
        if let Some((parent_id, relationship)) = entity.parent_link() {
            let parent_known =
                batch_ids.contains(parent_id.as_str()) || store.get(&parent_id)?.is_some();
            if parent_known {
                store.link(&parent_id, &entity.id, relationship)?;
            }
        }
    }

    Ok(count as u32)
}
