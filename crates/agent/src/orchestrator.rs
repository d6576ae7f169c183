//! Call lifecycle supervision.
//!
//! The orchestrator binds each voice session to a fresh
//! [`ConversationManager`], keeps at most one manager per call id and forgets
//! the call as soon as its manager stops. It never sees individual turns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailvoice_core::conversation::{CallId, CallerId};
use mailvoice_core::errors::FailureClass;
use mailvoice_voice::VoiceChannel;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tracing::{error, info};

use crate::manager::{CallReport, Collaborators, ConversationManager, ManagerHandle, ManagerSettings};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("call `{0}` is already active")]
    DuplicateCall(CallId),
    #[error("no active call `{0}`")]
    UnknownCall(CallId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveCallInfo {
    pub call_id: CallId,
    pub caller: CallerId,
    pub started_at: DateTime<Utc>,
}

struct ActiveCall {
    caller: CallerId,
    started_at: DateTime<Utc>,
    handle: ManagerHandle,
}

/// Resolves with the call's report once its manager has stopped and the call
/// has been released.
pub struct CallCompletion {
    call_id: CallId,
    report: oneshot::Receiver<CallReport>,
}

impl CallCompletion {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// `None` when the manager died without producing a report.
    pub async fn wait(self) -> Option<CallReport> {
        self.report.await.ok()
    }
}

pub struct Orchestrator {
    collaborators: Collaborators,
    settings: ManagerSettings,
    calls: Arc<Mutex<HashMap<CallId, ActiveCall>>>,
    released: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: ManagerSettings) -> Self {
        Self {
            collaborators,
            settings,
            calls: Arc::new(Mutex::new(HashMap::new())),
            released: Arc::new(Notify::new()),
        }
    }

    /// Starts a manager for `call_id` on `channel`. Must be called from within
    /// a tokio runtime.
    pub fn start_call(
        &self,
        call_id: CallId,
        caller: CallerId,
        channel: Arc<dyn VoiceChannel>,
    ) -> Result<CallCompletion, OrchestratorError> {
        let manager = ConversationManager::new(
            call_id.clone(),
            caller.clone(),
            channel,
            self.collaborators.clone(),
            self.settings.clone(),
        );

        {
            let mut calls = lock(&self.calls);
            if calls.contains_key(&call_id) {
                return Err(OrchestratorError::DuplicateCall(call_id));
            }
            calls.insert(
                call_id.clone(),
                ActiveCall { caller: caller.clone(), started_at: Utc::now(), handle: manager.handle() },
            );
        }

        let (report_tx, report_rx) = oneshot::channel();
        let task = tokio::spawn(manager.run());
        let calls = Arc::clone(&self.calls);
        let released = Arc::clone(&self.released);
        let supervised = call_id.clone();

        tokio::spawn(async move {
            let report = match task.await {
                Ok(report) => Some(report),
                Err(join_error) => {
                    error!(
                        event_name = "call.manager_failed",
                        call_id = %supervised,
                        failure_class = FailureClass::UnrecoverableSession.as_str(),
                        error = %join_error,
                        "conversation manager stopped unexpectedly"
                    );
                    None
                }
            };

            lock(&calls).remove(&supervised);
            released.notify_waiters();
            info!(event_name = "call.released", call_id = %supervised, "call released");

            if let Some(report) = report {
                let _ = report_tx.send(report);
            }
        });

        info!(event_name = "call.accepted", call_id = %call_id, caller = %caller, "call accepted");
        Ok(CallCompletion { call_id, report: report_rx })
    }

    /// Asks the call's manager to stop. The call stays listed until it has.
    pub fn end_call(&self, call_id: &CallId) -> Result<(), OrchestratorError> {
        let calls = lock(&self.calls);
        let call = calls.get(call_id).ok_or_else(|| OrchestratorError::UnknownCall(call_id.clone()))?;
        if !call.handle.terminate() {
            info!(event_name = "call.end_requested", call_id = %call_id, "manager already stopping");
        }
        Ok(())
    }

    pub fn active_calls(&self) -> Vec<ActiveCallInfo> {
        let mut active = lock(&self.calls)
            .iter()
            .map(|(call_id, call)| ActiveCallInfo {
                call_id: call_id.clone(),
                caller: call.caller.clone(),
                started_at: call.started_at,
            })
            .collect::<Vec<_>>();
        active.sort_by(|left, right| left.call_id.cmp(&right.call_id));
        active
    }

    pub fn active_call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Ends every call and waits up to `grace` for the managers to stop.
    /// Returns how many calls were still active when the wait ended.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let handles =
            lock(&self.calls).values().map(|call| call.handle.clone()).collect::<Vec<_>>();
        info!(event_name = "orchestrator.shutdown", calls = handles.len(), "ending active calls");
        for handle in &handles {
            handle.terminate();
        }

        let drained = tokio::time::timeout(grace, async {
            loop {
                let released = self.released.notified();
                if self.active_call_count() == 0 {
                    return;
                }
                released.await;
            }
        })
        .await;

        let remaining = self.active_call_count();
        if drained.is_err() {
            error!(
                event_name = "orchestrator.shutdown_incomplete",
                remaining,
                "calls still active after the grace period"
            );
        }
        remaining
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
