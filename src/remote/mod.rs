//! Backend API access
//!
//! `RemoteClient` is the single seam every component talks through:
//! one call is one round trip, with no retries. `Backend` layers the
//! typed endpoint contracts on top of it.

use crate::error::RemoteError;
use crate::models::{LinkToken, PublicToken, SimulatedTransaction, UploadedFile};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub mod http;
pub use http::HttpRemoteClient;

/// Backend endpoints, all POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CreateLinkToken,
    SetAccessToken,
    CreateSandboxItem,
    Analyze,
    SimulateTransactions,
    SimulateTransaction,
    StartDailyUpdates,
    StopDailyUpdates,
    TriggerUpdate,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::CreateLinkToken,
        Endpoint::SetAccessToken,
        Endpoint::CreateSandboxItem,
        Endpoint::Analyze,
        Endpoint::SimulateTransactions,
        Endpoint::SimulateTransaction,
        Endpoint::StartDailyUpdates,
        Endpoint::StopDailyUpdates,
        Endpoint::TriggerUpdate,
    ];

    /// Path segment below the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::CreateLinkToken => "create_link_token",
            Endpoint::SetAccessToken => "set_access_token",
            Endpoint::CreateSandboxItem => "create_sandbox_item",
            Endpoint::Analyze => "analyze",
            Endpoint::SimulateTransactions => "simulate_transactions",
            Endpoint::SimulateTransaction => "simulate_transaction",
            Endpoint::StartDailyUpdates => "start_daily_updates",
            Endpoint::StopDailyUpdates => "stop_daily_updates",
            Endpoint::TriggerUpdate => "trigger_update",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Request body for a call.
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Json(Value),
    /// Sent as multipart form data under the `file` field.
    Multipart(UploadedFile),
}

/// Trait for executing backend calls
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn call(&self, endpoint: Endpoint, payload: Payload) -> Result<Value, RemoteError>;
}

/// Typed facade over a shared `RemoteClient`.
#[derive(Clone)]
pub struct Backend {
    client: Arc<dyn RemoteClient>,
}

impl Backend {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    pub async fn call(&self, endpoint: Endpoint, payload: Payload) -> Result<Value, RemoteError> {
        debug!(endpoint = %endpoint, "Calling backend");
        self.client.call(endpoint, payload).await
    }

    pub async fn create_link_token(&self) -> Result<LinkToken, RemoteError> {
        let body = self.call(Endpoint::CreateLinkToken, Payload::Empty).await?;
        require_str(&body, "link_token").map(LinkToken::new)
    }

    pub async fn set_access_token(&self, public_token: &PublicToken) -> Result<(), RemoteError> {
        self.call(
            Endpoint::SetAccessToken,
            Payload::Json(json!({ "public_token": public_token.as_str() })),
        )
        .await?;
        Ok(())
    }

    pub async fn create_sandbox_item(&self) -> Result<(), RemoteError> {
        self.call(Endpoint::CreateSandboxItem, Payload::Empty).await?;
        Ok(())
    }

    pub async fn simulate_transaction(&self, tx: &SimulatedTransaction) -> Result<(), RemoteError> {
        let body = serde_json::to_value(tx)
            .map_err(|e| RemoteError::InvalidResponse(format!("Unencodable transaction: {}", e)))?;
        self.call(Endpoint::SimulateTransaction, Payload::Json(body)).await?;
        Ok(())
    }

    /// Scheduler endpoints answer with a confirmation `message`; a success
    /// without one falls back to `default_message`.
    pub async fn scheduler_call(
        &self,
        endpoint: Endpoint,
        default_message: &str,
    ) -> Result<String, RemoteError> {
        let body = self.call(endpoint, Payload::Empty).await?;
        Ok(body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default_message.to_string()))
    }
}

/// Read a required string field from a success body.
pub fn require_str(body: &Value, field: &str) -> Result<String, RemoteError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::InvalidResponse(format!("missing '{}' in response", field)))
}
