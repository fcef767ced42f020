//! Bank-linking session
//!
//! Token acquisition, widget handoff, public-token exchange and the
//! sandbox shortcut. This is the only place `connected` is written.

use crate::error::{OrchestrationError, Result};
use crate::models::{ErrorState, LinkToken, PublicToken};
use crate::remote::Backend;
use crate::signal::ChangeSignal;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const LINK_TOKEN_FAILED: &str = "Failed to generate Plaid link token";
pub const CONNECT_FAILED: &str = "Failed to connect bank account";
pub const SANDBOX_FAILED: &str = "Failed to create sandbox item";
pub const CONNECTED_NOTICE: &str = "Bank account connected successfully!";
pub const SANDBOX_NOTICE: &str = "Sandbox bank account connected";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    Uninitialized,
    TokenPending,
    TokenReady,
    /// Token request failed or the token was spent without connecting.
    TokenFailed,
    WidgetOpen,
    Connected,
}

/// Opaque failure reported by the bank-linking widget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WidgetError(pub String);

/// External bank-linking widget.
///
/// The widget reports back through `LinkSession::on_widget_success` or
/// `LinkSession::on_widget_error`; `open` only hands the token over.
#[async_trait]
pub trait LinkWidget: Send + Sync {
    fn is_ready(&self) -> bool;
    async fn open(&self, token: LinkToken) -> std::result::Result<(), WidgetError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub phase: LinkPhase,
    pub connected: bool,
    pub has_token: bool,
    pub busy: bool,
    pub error: ErrorState,
    pub notice: Option<String>,
}

struct LinkInner {
    phase: LinkPhase,
    token: Option<LinkToken>,
    connected: bool,
    token_in_flight: bool,
    exchange_in_flight: bool,
    sandbox_in_flight: bool,
    error: ErrorState,
    notice: Option<String>,
}

impl LinkInner {
    /// Move to `phase` unless already connected; `Connected` is terminal.
    fn settle(&mut self, phase: LinkPhase) {
        if !self.connected {
            self.phase = phase;
        }
    }

    fn mark_connected(&mut self, notice: &str) {
        self.connected = true;
        self.phase = LinkPhase::Connected;
        self.token = None;
        self.notice = Some(notice.to_string());
    }

    fn fail(&mut self, err: OrchestrationError) -> OrchestrationError {
        self.error.record_failure(&err);
        err
    }
}

pub struct LinkSession {
    backend: Backend,
    changes: ChangeSignal,
    inner: RwLock<LinkInner>,
}

impl LinkSession {
    pub fn new(backend: Backend, changes: ChangeSignal) -> Self {
        Self {
            backend,
            changes,
            inner: RwLock::new(LinkInner {
                phase: LinkPhase::Uninitialized,
                token: None,
                connected: false,
                token_in_flight: false,
                exchange_in_flight: false,
                sandbox_in_flight: false,
                error: ErrorState::default(),
                notice: None,
            }),
        }
    }

    pub async fn connected(&self) -> bool {
        self.inner.read().await.connected
    }

    pub async fn view(&self) -> LinkView {
        let inner = self.inner.read().await;
        LinkView {
            phase: inner.phase,
            connected: inner.connected,
            has_token: inner.token.is_some(),
            busy: inner.token_in_flight || inner.exchange_in_flight || inner.sandbox_in_flight,
            error: inner.error.clone(),
            notice: inner.notice.clone(),
        }
    }

    async fn update<R>(&self, f: impl FnOnce(&mut LinkInner) -> R) -> R {
        let result = f(&mut *self.inner.write().await);
        self.changes.notify();
        result
    }

    /// Fetch a fresh link token. Retryable after any failure.
    pub async fn request_token(&self) -> Result<()> {
        self.update(|inner| {
            if inner.token_in_flight {
                return Err(OrchestrationError::Busy("Link token request"));
            }
            if inner.connected {
                return Err(OrchestrationError::AlreadyConnected);
            }
            if inner.phase == LinkPhase::WidgetOpen || inner.exchange_in_flight {
                return Err(OrchestrationError::Busy("Bank linking session"));
            }
            inner.token_in_flight = true;
            inner.error.clear();
            inner.token = None;
            inner.phase = LinkPhase::TokenPending;
            Ok(())
        })
        .await?;

        info!("Requesting link token");
        let outcome = self.backend.create_link_token().await;

        self.update(|inner| {
            inner.token_in_flight = false;
            match outcome {
                Ok(token) => {
                    if inner.connected {
                        debug!("Discarding link token, already connected");
                    } else {
                        inner.token = Some(token);
                        inner.phase = LinkPhase::TokenReady;
                        info!("Link token ready");
                    }
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Link token request failed");
                    inner.settle(LinkPhase::TokenFailed);
                    Err(inner.fail(OrchestrationError::remote(e, LINK_TOKEN_FAILED)))
                }
            }
        })
        .await
    }

    /// Hand the current token to the widget. The token is spent either way.
    pub async fn open_widget(&self, widget: &dyn LinkWidget) -> Result<()> {
        let token = self
            .update(|inner| {
                if inner.connected {
                    return Err(OrchestrationError::AlreadyConnected);
                }
                if inner.phase != LinkPhase::TokenReady {
                    return Err(inner.fail(OrchestrationError::Validation(
                        "Bank linking is not ready yet".to_string(),
                    )));
                }
                if !widget.is_ready() {
                    return Err(inner.fail(OrchestrationError::Validation(
                        "Bank linking widget is still loading".to_string(),
                    )));
                }
                let Some(token) = inner.token.take() else {
                    return Err(inner.fail(OrchestrationError::Validation(
                        "Bank linking is not ready yet".to_string(),
                    )));
                };
                inner.error.clear();
                inner.phase = LinkPhase::WidgetOpen;
                Ok(token)
            })
            .await?;

        info!("Opening bank linking widget");
        match widget.open(token).await {
            Ok(()) => Ok(()),
            Err(e) => self.on_widget_error(e).await,
        }
    }

    /// Widget success callback: exchange the public token for access.
    pub async fn on_widget_success(&self, public_token: PublicToken, metadata: Value) -> Result<()> {
        self.update(|inner| {
            if inner.exchange_in_flight {
                return Err(OrchestrationError::Busy("Bank account connection"));
            }
            if inner.connected {
                return Err(OrchestrationError::AlreadyConnected);
            }
            if inner.phase != LinkPhase::WidgetOpen {
                return Err(inner.fail(OrchestrationError::Validation(
                    "No bank linking session is open".to_string(),
                )));
            }
            inner.exchange_in_flight = true;
            inner.error.clear();
            Ok(())
        })
        .await?;

        let institution = metadata
            .pointer("/institution/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(institution = %institution, "Exchanging public token");

        let outcome = self.backend.set_access_token(&public_token).await;

        self.update(|inner| {
            inner.exchange_in_flight = false;
            match outcome {
                Ok(()) => {
                    inner.mark_connected(CONNECTED_NOTICE);
                    info!("Bank account connected");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Public token exchange failed");
                    if inner.phase == LinkPhase::WidgetOpen {
                        inner.settle(LinkPhase::TokenFailed);
                    }
                    Err(inner.fail(OrchestrationError::remote(e, CONNECT_FAILED)))
                }
            }
        })
        .await
    }

    /// Widget failure callback. Ignored unless a widget session is open.
    pub async fn on_widget_error(&self, error: WidgetError) -> Result<()> {
        self.update(|inner| {
            if inner.phase != LinkPhase::WidgetOpen || inner.exchange_in_flight {
                debug!(error = %error, "Ignoring widget error outside an open session");
                return Ok(());
            }

            warn!(error = %error, "Bank linking widget failed");
            inner.token = None;
            inner.settle(LinkPhase::TokenFailed);
            Err(inner.fail(OrchestrationError::Widget(error.0)))
        })
        .await
    }

    /// Connect a test account without going through the widget.
    pub async fn create_sandbox_item(&self) -> Result<()> {
        self.update(|inner| {
            if inner.sandbox_in_flight {
                return Err(OrchestrationError::Busy("Sandbox item creation"));
            }
            if inner.connected {
                return Err(OrchestrationError::AlreadyConnected);
            }
            inner.sandbox_in_flight = true;
            inner.error.clear();
            Ok(())
        })
        .await?;

        info!("Creating sandbox item");
        let outcome = self.backend.create_sandbox_item().await;

        self.update(|inner| {
            inner.sandbox_in_flight = false;
            match outcome {
                Ok(()) => {
                    inner.mark_connected(SANDBOX_NOTICE);
                    info!("Sandbox item connected");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Sandbox item creation failed");
                    Err(inner.fail(OrchestrationError::remote(e, SANDBOX_FAILED)))
                }
            }
        })
        .await
    }
}
