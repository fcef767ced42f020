//! Aggregate client state
//!
//! Owns every component, enforces the cross-component preconditions
//! (simulation needs a connected account) and exposes one view model.
//! Errors stay in the component that produced them.

use crate::analysis::{AnalysisJob, AnalysisKind, FileAnalysis, JobStatus, JobView, TransactionSimulation};
use crate::error::{OrchestrationError, Result};
use crate::link::{LinkPhase, LinkSession, LinkView, LinkWidget, WidgetError};
use crate::models::{
    AnalysisResult, ErrorState, PublicToken, SimulatedTransaction, TransactionDraft,
    UpdateJobState, UploadedFile,
};
use crate::remote::{Backend, RemoteClient};
use crate::scheduler::{ScheduleOutcome, SchedulerView, UpdateScheduler};
use crate::signal::ChangeSignal;
use crate::transactions::{EntryView, TransactionEntry};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

pub const CONNECT_FIRST: &str = "Please connect a bank account first";

/// Snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorView {
    pub link: LinkView,
    pub file_analysis: JobView,
    pub simulation: JobView,
    pub transaction_entry: EntryView,
    pub schedule: SchedulerView,
    pub selected_file: Option<String>,

    pub can_open_widget: bool,
    pub can_simulate: bool,
    pub can_submit_file: bool,
    pub can_add_transaction: bool,
    pub can_start_updates: bool,
    pub can_stop_updates: bool,
}

impl OrchestratorView {
    fn derive(
        link: LinkView,
        file_analysis: JobView,
        simulation: JobView,
        transaction_entry: EntryView,
        schedule: SchedulerView,
        selected_file: Option<String>,
    ) -> Self {
        let connected = link.connected;
        Self {
            can_open_widget: link.phase == LinkPhase::TokenReady && !connected,
            can_simulate: connected && !simulation.is_running(),
            can_submit_file: !file_analysis.is_running(),
            can_add_transaction: connected && !transaction_entry.in_flight,
            can_start_updates: schedule.state == UpdateJobState::Stopped && !schedule.busy,
            can_stop_updates: schedule.state == UpdateJobState::Running && !schedule.busy,
            link,
            file_analysis,
            simulation,
            transaction_entry,
            schedule,
            selected_file,
        }
    }

    /// Every scoped error slot, labelled by region.
    pub fn errors(&self) -> Vec<(&'static str, &ErrorState)> {
        [
            ("link", &self.link.error),
            ("file_analysis", &self.file_analysis.error),
            ("simulation", &self.simulation.error),
            ("transaction_entry", &self.transaction_entry.error),
            ("schedule", &self.schedule.error),
        ]
        .into_iter()
        .filter(|(_, slot)| !slot.is_empty())
        .collect()
    }

    pub fn file_status(&self) -> JobStatus {
        self.file_analysis.status
    }

    pub fn draft(&self) -> &TransactionDraft {
        &self.transaction_entry.draft
    }
}

pub struct OrchestratorState {
    link: LinkSession,
    file_analysis: AnalysisJob<FileAnalysis>,
    simulation: AnalysisJob<TransactionSimulation>,
    transaction_entry: TransactionEntry,
    scheduler: UpdateScheduler,
    selected_file: RwLock<Option<UploadedFile>>,
    changes: ChangeSignal,
}

impl OrchestratorState {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        let backend = Backend::new(client);
        let changes = ChangeSignal::new();

        Self {
            link: LinkSession::new(backend.clone(), changes.clone()),
            file_analysis: AnalysisJob::new(backend.clone(), changes.clone()),
            simulation: AnalysisJob::new(backend.clone(), changes.clone()),
            transaction_entry: TransactionEntry::new(backend.clone(), changes.clone()),
            scheduler: UpdateScheduler::new(backend, changes.clone()),
            selected_file: RwLock::new(None),
            changes,
        }
    }

    /// First-load work: fetch the initial link token.
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing finance helper");
        self.link.request_token().await
    }

    pub async fn view(&self) -> OrchestratorView {
        let selected_file = self
            .selected_file
            .read()
            .await
            .as_ref()
            .map(|f| f.file_name().to_string());

        OrchestratorView::derive(
            self.link.view().await,
            self.file_analysis.view().await,
            self.simulation.view().await,
            self.transaction_entry.view().await,
            self.scheduler.view().await,
            selected_file,
        )
    }

    /// Revision counter bumped on every state change; re-read `view()` when
    /// it moves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    // =============================
    // Bank Linking
    // =============================

    pub async fn request_link_token(&self) -> Result<()> {
        self.link.request_token().await
    }

    pub async fn open_widget(&self, widget: &dyn LinkWidget) -> Result<()> {
        self.link.open_widget(widget).await
    }

    pub async fn on_widget_success(&self, public_token: PublicToken, metadata: Value) -> Result<()> {
        self.link.on_widget_success(public_token, metadata).await
    }

    pub async fn on_widget_error(&self, error: WidgetError) -> Result<()> {
        self.link.on_widget_error(error).await
    }

    pub async fn create_sandbox_item(&self) -> Result<()> {
        self.link.create_sandbox_item().await
    }

    // =============================
    // Statement Analysis
    // =============================

    pub async fn select_file(&self, file: UploadedFile) {
        debug!(file_name = %file.file_name(), "Statement selected");
        *self.selected_file.write().await = Some(file);
        self.changes.notify();
    }

    pub async fn clear_selected_file(&self) {
        *self.selected_file.write().await = None;
        self.changes.notify();
    }

    /// Submit the selected statement. The selection is consumed whatever
    /// the outcome, except when a previous upload is still running.
    pub async fn submit_file(&self) -> Result<AnalysisResult> {
        if self.file_analysis.is_running().await {
            return Err(OrchestrationError::Busy(FileAnalysis::LABEL));
        }
        let file = self.selected_file.write().await.take();
        self.changes.notify();
        self.file_analysis.submit(file).await
    }

    // =============================
    // Simulation
    // =============================

    pub async fn simulate_transactions(&self) -> Result<AnalysisResult> {
        if !self.link.connected().await {
            return Err(self.simulation.reject(CONNECT_FIRST).await);
        }
        self.simulation.submit(()).await
    }

    pub async fn set_transaction_name(&self, name: impl Into<String>) {
        self.transaction_entry.set_name(name).await
    }

    pub async fn set_transaction_amount(&self, amount: impl Into<String>) {
        self.transaction_entry.set_amount(amount).await
    }

    pub async fn add_transaction(&self) -> Result<SimulatedTransaction> {
        if !self.link.connected().await {
            return Err(self.transaction_entry.reject(CONNECT_FIRST).await);
        }
        self.transaction_entry.submit().await
    }

    // =============================
    // Daily Updates
    // =============================

    pub async fn start_updates(&self) -> Result<ScheduleOutcome> {
        self.scheduler.start().await
    }

    pub async fn stop_updates(&self) -> Result<ScheduleOutcome> {
        self.scheduler.stop().await
    }

    pub async fn trigger_update(&self) -> Result<String> {
        self.scheduler.trigger_update().await
    }
}
