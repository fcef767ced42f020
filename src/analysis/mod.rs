//! One-shot analysis jobs
//!
//! `AnalysisJob` is generic over what it sends and where; the two kinds
//! are statement upload (`FileAnalysis`) and synthetic-transaction
//! simulation (`TransactionSimulation`).

use crate::error::{OrchestrationError, Result};
use crate::models::{AnalysisResult, ErrorState, UploadedFile, ALLOWED_EXTENSIONS};
use crate::remote::{require_str, Backend, Endpoint, Payload};
use crate::signal::ChangeSignal;
use serde::Serialize;
use std::marker::PhantomData;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const NO_FILE_SELECTED: &str = "Please select a file first";

/// What a job sends, where, and which response field carries the report.
pub trait AnalysisKind: Send + Sync + 'static {
    type Input: Send;

    /// Name used in logs and busy rejections.
    const LABEL: &'static str;
    const ENDPOINT: Endpoint;
    const RESULT_FIELD: &'static str;
    const FAILURE_MESSAGE: &'static str;

    /// Validate the input and build the request body. Runs before any
    /// network call; an error here means nothing is sent.
    fn prepare(input: Self::Input) -> Result<Payload>;
}

/// Uploaded statement analysis.
pub struct FileAnalysis;

impl AnalysisKind for FileAnalysis {
    type Input = Option<UploadedFile>;

    const LABEL: &'static str = "Statement analysis";
    const ENDPOINT: Endpoint = Endpoint::Analyze;
    const RESULT_FIELD: &'static str = "summary";
    const FAILURE_MESSAGE: &'static str = "Failed to analyze statement";

    fn prepare(input: Self::Input) -> Result<Payload> {
        let file = input.ok_or_else(|| OrchestrationError::Validation(NO_FILE_SELECTED.to_string()))?;

        if !file.has_allowed_extension() {
            return Err(OrchestrationError::Validation(format!(
                "Unsupported file type. Please upload one of: {}",
                ALLOWED_EXTENSIONS
                    .iter()
                    .map(|ext| format!(".{}", ext))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        if file.is_empty() {
            return Err(OrchestrationError::Validation(format!(
                "{} is empty",
                file.file_name()
            )));
        }

        debug!(
            file_name = %file.file_name(),
            bytes = file.len(),
            fingerprint = %file.fingerprint(),
            "Prepared statement upload"
        );
        Ok(Payload::Multipart(file))
    }
}

/// Analysis of the server's simulated transactions for the linked account.
pub struct TransactionSimulation;

impl AnalysisKind for TransactionSimulation {
    type Input = ();

    const LABEL: &'static str = "Transaction simulation";
    const ENDPOINT: Endpoint = Endpoint::SimulateTransactions;
    const RESULT_FIELD: &'static str = "analysis";
    const FAILURE_MESSAGE: &'static str = "Failed to simulate transactions";

    fn prepare(_input: Self::Input) -> Result<Payload> {
        Ok(Payload::Empty)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub status: JobStatus,
    pub result: Option<AnalysisResult>,
    pub error: ErrorState,
}

impl JobView {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

struct JobInner {
    status: JobStatus,
    result: Option<AnalysisResult>,
    error: ErrorState,
}

impl JobInner {
    /// Start a fresh attempt: the previous report and error go away now,
    /// not when the new attempt finishes.
    fn reset(&mut self) {
        self.result = None;
        self.error.clear();
    }

    fn fail(&mut self, err: OrchestrationError) -> OrchestrationError {
        self.status = JobStatus::Failed;
        self.error.record_failure(&err);
        err
    }
}

pub struct AnalysisJob<K: AnalysisKind> {
    backend: Backend,
    changes: ChangeSignal,
    inner: RwLock<JobInner>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: AnalysisKind> AnalysisJob<K> {
    pub fn new(backend: Backend, changes: ChangeSignal) -> Self {
        Self {
            backend,
            changes,
            inner: RwLock::new(JobInner {
                status: JobStatus::Idle,
                result: None,
                error: ErrorState::default(),
            }),
            _kind: PhantomData,
        }
    }

    pub async fn view(&self) -> JobView {
        let inner = self.inner.read().await;
        JobView {
            status: inner.status,
            result: inner.result.clone(),
            error: inner.error.clone(),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.status == JobStatus::Running
    }

    async fn update<R>(&self, f: impl FnOnce(&mut JobInner) -> R) -> R {
        let result = f(&mut *self.inner.write().await);
        self.changes.notify();
        result
    }

    /// Run one attempt. A submit while another is running is rejected.
    pub async fn submit(&self, input: K::Input) -> Result<AnalysisResult> {
        let payload = self
            .update(|inner| {
                if inner.status == JobStatus::Running {
                    return Err(OrchestrationError::Busy(K::LABEL));
                }
                inner.reset();

                match K::prepare(input) {
                    Ok(payload) => {
                        inner.status = JobStatus::Running;
                        Ok(payload)
                    }
                    Err(err) => {
                        warn!(job = K::LABEL, error = %err, "Analysis input rejected");
                        Err(inner.fail(err))
                    }
                }
            })
            .await?;

        let endpoint = K::ENDPOINT;
        info!(job = K::LABEL, endpoint = %endpoint, "Submitting analysis");
        let outcome = self
            .backend
            .call(endpoint, payload)
            .await
            .and_then(|body| require_str(&body, K::RESULT_FIELD));

        self.update(|inner| match outcome {
            Ok(text) => {
                let result = AnalysisResult::new(text);
                inner.result = Some(result.clone());
                inner.status = JobStatus::Succeeded;
                info!(job = K::LABEL, chars = result.text.len(), "Analysis complete");
                Ok(result)
            }
            Err(e) => {
                warn!(job = K::LABEL, error = %e, "Analysis failed");
                Err(inner.fail(OrchestrationError::remote(e, K::FAILURE_MESSAGE)))
            }
        })
        .await
    }

    /// Record a precondition failure decided outside the job (e.g. no bank
    /// account connected). Leaves a running attempt untouched.
    pub async fn reject(&self, message: &str) -> OrchestrationError {
        self.update(|inner| {
            if inner.status == JobStatus::Running {
                return OrchestrationError::Busy(K::LABEL);
            }
            inner.reset();
            warn!(job = K::LABEL, reason = message, "Analysis rejected");
            inner.fail(OrchestrationError::Validation(message.to_string()))
        })
        .await
    }
}
