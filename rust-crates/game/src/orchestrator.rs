//! Runs submitted operations on background tasks and reports their
//! outcome back to the session over a channel.
use crate::{
    catalog::OperationDescriptor,
    error::SyncError,
    ledger::{
        Confirmation,
        Ledger,
        OperationId,
        OperationReport,
        PollStatus,
        Signer,
    },
    record::PlayerRecord,
    store::PlayerStore,
    sync::{
        Refresh,
        RemoteSync,
    },
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::AbortHandle,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    /// Wait before the first poll, while the ledger includes the operation.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationHandle {
    pub seq: u64,
}

#[derive(Debug)]
pub enum OperationOutcome {
    Succeeded {
        report: OperationReport,
        refresh: Result<Refresh, SyncError>,
    },
    Failed {
        operation_id: Option<OperationId>,
        reason: String,
    },
}

/// Exactly one is sent per submitted operation, tagged with the sequence
/// number it was submitted under.
#[derive(Debug)]
pub struct Completion {
    pub seq: u64,
    pub outcome: OperationOutcome,
}

#[derive(Debug)]
pub enum BackgroundEvent {
    /// The ledger accepted the operation and assigned it an id.
    Submitted {
        seq: u64,
        operation_id: OperationId,
    },
    Finished(Completion),
    Refreshed {
        seq: u64,
        result: Result<Refresh, SyncError>,
    },
}

pub struct Orchestrator<S, L> {
    ledger: Arc<L>,
    sync: RemoteSync<S, L>,
    settings: PollSettings,
    events: mpsc::UnboundedSender<BackgroundEvent>,
    operations: HashMap<u64, AbortHandle>,
    refreshes: Vec<AbortHandle>,
}

impl<S: PlayerStore, L: Ledger> Orchestrator<S, L> {
    pub fn new(
        ledger: Arc<L>,
        sync: RemoteSync<S, L>,
        settings: PollSettings,
    ) -> (Self, mpsc::UnboundedReceiver<BackgroundEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let orchestrator = Self {
            ledger,
            sync,
            settings,
            events,
            operations: HashMap::new(),
            refreshes: Vec::new(),
        };
        (orchestrator, receiver)
    }

    /// Starts the operation on a background task and returns immediately.
    pub fn submit(
        &mut self,
        seq: u64,
        signer: Signer,
        descriptor: OperationDescriptor,
        record: PlayerRecord,
    ) -> OperationHandle {
        self.reap();
        let task = tokio::spawn(run_operation(
            self.ledger.clone(),
            self.sync.clone(),
            self.settings,
            seq,
            signer,
            descriptor,
            record,
            self.events.clone(),
        ));
        self.operations.insert(seq, task.abort_handle());
        OperationHandle { seq }
    }

    /// Reports a failure for an operation that could not be handed to the
    /// ledger at all.
    pub fn fail(&self, seq: u64, reason: impl Into<String>) -> OperationHandle {
        let completion = Completion {
            seq,
            outcome: OperationOutcome::Failed {
                operation_id: None,
                reason: reason.into(),
            },
        };
        if self.events.send(BackgroundEvent::Finished(completion)).is_err() {
            debug!(seq, "session gone before failure was reported");
        }
        OperationHandle { seq }
    }

    /// Syncs the record and market in the background.
    pub fn refresh(&mut self, seq: u64, record: PlayerRecord) {
        self.reap();
        let sync = self.sync.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let result = sync.refresh(&record, None).await;
            let _ = events.send(BackgroundEvent::Refreshed { seq, result });
        });
        self.refreshes.push(task.abort_handle());
    }

    /// Operations submitted but not yet reported.
    pub fn in_flight(&self) -> usize {
        self.operations
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Stops every background task. Operations already accepted by the
    /// ledger still go through; only their reporting is dropped.
    pub fn shutdown(&mut self) {
        let pending = self.in_flight();
        for handle in self.operations.values().chain(&self.refreshes) {
            handle.abort();
        }
        self.operations.clear();
        self.refreshes.clear();
        if pending > 0 {
            info!(pending, "abandoned in-flight operations");
        }
    }

    fn reap(&mut self) {
        self.operations.retain(|_, handle| !handle.is_finished());
        self.refreshes.retain(|handle| !handle.is_finished());
    }
}

impl<S, L> Drop for Orchestrator<S, L> {
    fn drop(&mut self) {
        for handle in self.operations.values().chain(&self.refreshes) {
            handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_operation<S: PlayerStore, L: Ledger>(
    ledger: Arc<L>,
    sync: RemoteSync<S, L>,
    settings: PollSettings,
    seq: u64,
    signer: Signer,
    descriptor: OperationDescriptor,
    record: PlayerRecord,
    events: mpsc::UnboundedSender<BackgroundEvent>,
) {
    let outcome = match ledger.submit_operation(&signer, &descriptor).await {
        Err(err) => {
            warn!(seq, error = %err, "submission failed");
            OperationOutcome::Failed {
                operation_id: None,
                reason: err.to_string(),
            }
        }
        Ok(operation_id) => {
            info!(seq, operation = %operation_id, "operation submitted");
            let _ = events.send(BackgroundEvent::Submitted {
                seq,
                operation_id: operation_id.clone(),
            });
            match await_confirmation(ledger.as_ref(), &operation_id, settings).await {
                Ok(confirmation) => {
                    info!(seq, operation = %operation_id, "operation confirmed");
                    let refresh = sync.refresh(&record, Some(&operation_id)).await;
                    OperationOutcome::Succeeded {
                        report: OperationReport {
                            operation_id,
                            confirmation,
                        },
                        refresh,
                    }
                }
                Err(reason) => {
                    warn!(seq, operation = %operation_id, %reason, "operation failed");
                    OperationOutcome::Failed {
                        operation_id: Some(operation_id),
                        reason,
                    }
                }
            }
        }
    };
    if events
        .send(BackgroundEvent::Finished(Completion { seq, outcome }))
        .is_err()
    {
        debug!(seq, "session gone before completion was reported");
    }
}

/// Waits the settle delay, then polls up to `max_attempts` times.
pub async fn await_confirmation<L: Ledger>(
    ledger: &L,
    operation_id: &OperationId,
    settings: PollSettings,
) -> Result<Confirmation, String> {
    time::sleep(settings.settle_delay).await;
    for attempt in 1..=settings.max_attempts {
        match ledger.poll_operation(operation_id).await {
            Ok(PollStatus::Confirmed(confirmation)) => return Ok(confirmation),
            Ok(PollStatus::Rejected(reason)) => return Err(reason),
            Ok(PollStatus::Pending) => {
                debug!(operation = %operation_id, attempt, "operation pending")
            }
            Err(err) => {
                warn!(operation = %operation_id, attempt, error = %err, "poll failed")
            }
        }
        if attempt < settings.max_attempts {
            time::sleep(settings.poll_interval).await;
        }
    }
    Err(format!(
        "operation not confirmed after {} attempts",
        settings.max_attempts
    ))
}
