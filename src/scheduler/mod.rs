//! Daily update scheduler
//!
//! Mirrors the server-side recurring job. Local state only changes after
//! the server confirms, so a failed call leaves the previous state.

use crate::error::{OrchestrationError, RemoteError, Result};
use crate::models::{ErrorState, UpdateJobState};
use crate::remote::{Backend, Endpoint};
use crate::signal::ChangeSignal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const START_FAILED: &str = "Failed to start daily updates";
pub const STOP_FAILED: &str = "Failed to stop daily updates";
pub const TRIGGER_FAILED: &str = "Failed to trigger update";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Server confirmed the change.
    Changed,
    /// Already in the requested state, no call made.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerView {
    pub state: UpdateJobState,
    pub busy: bool,
    pub error: ErrorState,
    /// Last confirmation message from the server.
    pub notice: Option<String>,
}

#[derive(Default)]
struct SchedulerInner {
    state: UpdateJobState,
    in_flight: bool,
    error: ErrorState,
    notice: Option<String>,
}

pub struct UpdateScheduler {
    backend: Backend,
    changes: ChangeSignal,
    inner: RwLock<SchedulerInner>,
}

impl UpdateScheduler {
    pub fn new(backend: Backend, changes: ChangeSignal) -> Self {
        Self {
            backend,
            changes,
            inner: RwLock::new(SchedulerInner::default()),
        }
    }

    pub async fn view(&self) -> SchedulerView {
        let inner = self.inner.read().await;
        SchedulerView {
            state: inner.state,
            busy: inner.in_flight,
            error: inner.error.clone(),
            notice: inner.notice.clone(),
        }
    }

    pub async fn state(&self) -> UpdateJobState {
        self.inner.read().await.state
    }

    pub async fn start(&self) -> Result<ScheduleOutcome> {
        self.transition(UpdateJobState::Running).await
    }

    pub async fn stop(&self) -> Result<ScheduleOutcome> {
        self.transition(UpdateJobState::Stopped).await
    }

    /// One-off refresh; does not touch the running state.
    pub async fn trigger_update(&self) -> Result<String> {
        self.begin(None).await?;
        info!("Triggering transaction update");
        let outcome = self
            .backend
            .scheduler_call(Endpoint::TriggerUpdate, "Update requested")
            .await;
        self.finish(outcome, None, TRIGGER_FAILED).await
    }

    async fn transition(&self, target: UpdateJobState) -> Result<ScheduleOutcome> {
        if !self.begin(Some(target)).await? {
            debug!(state = %target, "Daily updates already in requested state");
            return Ok(ScheduleOutcome::Unchanged);
        }

        let (endpoint, default_message, failure) = match target {
            UpdateJobState::Running => (Endpoint::StartDailyUpdates, "Daily updates started", START_FAILED),
            UpdateJobState::Stopped => (Endpoint::StopDailyUpdates, "Daily updates stopped", STOP_FAILED),
        };

        info!(requested = %target, "Requesting daily update change");
        let outcome = self.backend.scheduler_call(endpoint, default_message).await;
        self.finish(outcome, Some(target), failure).await?;
        Ok(ScheduleOutcome::Changed)
    }

    async fn update<R>(&self, f: impl FnOnce(&mut SchedulerInner) -> R) -> R {
        let result = f(&mut *self.inner.write().await);
        self.changes.notify();
        result
    }

    /// Claim the in-flight slot. Returns false when `target` is already
    /// the current state and nothing needs sending.
    async fn begin(&self, target: Option<UpdateJobState>) -> Result<bool> {
        self.update(|inner| {
            if inner.in_flight {
                return Err(OrchestrationError::Busy("Daily updates"));
            }
            if target == Some(inner.state) {
                return Ok(false);
            }
            inner.in_flight = true;
            inner.error.clear();
            Ok(true)
        })
        .await
    }

    async fn finish(
        &self,
        outcome: std::result::Result<String, RemoteError>,
        target: Option<UpdateJobState>,
        failure: &str,
    ) -> Result<String> {
        self.update(|inner| {
            inner.in_flight = false;
            match outcome {
                Ok(message) => {
                    if let Some(state) = target {
                        inner.state = state;
                    }
                    info!(state = %inner.state, message = %message, "Daily updates confirmed");
                    inner.notice = Some(message.clone());
                    Ok(message)
                }
                Err(e) => {
                    warn!(state = %inner.state, error = %e, "Daily update request failed");
                    let err = OrchestrationError::remote(e, failure);
                    inner.error.record_failure(&err);
                    Err(err)
                }
            }
        })
        .await
    }
}
