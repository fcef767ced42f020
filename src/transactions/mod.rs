//! Manual synthetic-transaction entry
//!
//! Holds the name/amount inputs and posts one `SimulatedTransaction` per
//! submit. Inputs are cleared only after the server accepts it.

use crate::error::{OrchestrationError, Result};
use crate::models::{ErrorState, SimulatedTransaction, TransactionDraft};
use crate::remote::Backend;
use crate::signal::ChangeSignal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const ADD_FAILED: &str = "Failed to add transaction";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryView {
    pub draft: TransactionDraft,
    pub in_flight: bool,
    pub error: ErrorState,
    pub notice: Option<String>,
}

#[derive(Default)]
struct EntryInner {
    draft: TransactionDraft,
    in_flight: bool,
    error: ErrorState,
    notice: Option<String>,
}

pub struct TransactionEntry {
    backend: Backend,
    changes: ChangeSignal,
    inner: RwLock<EntryInner>,
}

impl TransactionEntry {
    pub fn new(backend: Backend, changes: ChangeSignal) -> Self {
        Self {
            backend,
            changes,
            inner: RwLock::new(EntryInner::default()),
        }
    }

    pub async fn view(&self) -> EntryView {
        let inner = self.inner.read().await;
        EntryView {
            draft: inner.draft.clone(),
            in_flight: inner.in_flight,
            error: inner.error.clone(),
            notice: inner.notice.clone(),
        }
    }

    async fn update<R>(&self, f: impl FnOnce(&mut EntryInner) -> R) -> R {
        let result = f(&mut *self.inner.write().await);
        self.changes.notify();
        result
    }

    pub async fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.update(|inner| inner.draft.transaction_name = name).await
    }

    pub async fn set_amount(&self, amount: impl Into<String>) {
        let amount = amount.into();
        self.update(|inner| inner.draft.transaction_amount = amount).await
    }

    pub async fn submit(&self) -> Result<SimulatedTransaction> {
        let tx = self
            .update(|inner| {
                if inner.in_flight {
                    return Err(OrchestrationError::Busy("Transaction entry"));
                }
                inner.error.clear();

                match inner.draft.parse() {
                    Ok(tx) => {
                        inner.in_flight = true;
                        Ok(tx)
                    }
                    Err(err) => {
                        inner.error.record_failure(&err);
                        Err(err)
                    }
                }
            })
            .await?;

        info!(name = %tx.name, amount = %tx.amount, "Adding simulated transaction");
        let outcome = self.backend.simulate_transaction(&tx).await;

        self.update(|inner| {
            inner.in_flight = false;
            match outcome {
                Ok(()) => {
                    inner.draft.clear();
                    inner.notice = Some(format!("Added transaction: {} ({})", tx.name, tx.amount));
                    Ok(tx)
                }
                Err(e) => {
                    warn!(error = %e, "Simulated transaction rejected");
                    let err = OrchestrationError::remote(e, ADD_FAILED);
                    inner.error.record_failure(&err);
                    Err(err)
                }
            }
        })
        .await
    }

    /// Record a precondition failure decided by the orchestrator.
    pub async fn reject(&self, message: &str) -> OrchestrationError {
        self.update(|inner| {
            if inner.in_flight {
                return OrchestrationError::Busy("Transaction entry");
            }
            let err = OrchestrationError::Validation(message.to_string());
            inner.error.record_failure(&err);
            err
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use crate::remote::testing::ScriptedRemote;
    use crate::remote::{Endpoint, Payload};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready_ok};

    #[tokio::test]
    async fn test_success_clears_inputs() {
        let remote = ScriptedRemote::new();
        remote.ok(Endpoint::SimulateTransaction, json!({}));
        let entry = TransactionEntry::new(Backend::new(remote.clone()), ChangeSignal::new());

        entry.set_name("Coffee").await;
        entry.set_amount("4.50").await;
        let tx = assert_ok!(entry.submit().await);
        assert_eq!(tx.name, "Coffee");

        let view = entry.view().await;
        assert_eq!(view.draft, TransactionDraft::default());
        assert_eq!(view.notice.as_deref(), Some("Added transaction: Coffee (4.50)"));
        assert!(!view.in_flight);

        match remote.last_payload(Endpoint::SimulateTransaction) {
            Some(Payload::Json(body)) => {
                assert_eq!(body["name"], "Coffee");
                assert_eq!(body["amount"].as_f64(), Some(4.5));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_inputs() {
        let remote = ScriptedRemote::new();
        remote.rejected(Endpoint::SimulateTransaction, 500, "");
        let entry = TransactionEntry::new(Backend::new(remote.clone()), ChangeSignal::new());

        entry.set_name("Rent").await;
        entry.set_amount("1200").await;
        assert_err!(entry.submit().await);

        let view = entry.view().await;
        assert_eq!(view.draft.transaction_name, "Rent");
        assert_eq!(view.draft.transaction_amount, "1200");
        assert_eq!(view.error.message(), Some(ADD_FAILED));
        assert_eq!(view.error.kind(), Some(ErrorKind::ServerRejected));
    }

    #[tokio::test]
    async fn test_invalid_draft_makes_no_call() {
        let remote = ScriptedRemote::new();
        let entry = TransactionEntry::new(Backend::new(remote.clone()), ChangeSignal::new());

        entry.set_name("Coffee").await;
        entry.set_amount("a lot").await;
        assert_err!(entry.submit().await);

        let view = entry.view().await;
        assert_eq!(view.error.kind(), Some(ErrorKind::Validation));
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let remote = ScriptedRemote::new();
        let release = remote.hold(Endpoint::SimulateTransaction);
        let entry = TransactionEntry::new(Backend::new(remote.clone()), ChangeSignal::new());
        entry.set_name("Lunch").await;
        entry.set_amount("12.25").await;

        let mut first = tokio_test::task::spawn(entry.submit());
        assert_pending!(first.poll());
        assert!(matches!(
            entry.submit().await,
            Err(OrchestrationError::Busy(_))
        ));

        release.send(Ok(json!({}))).unwrap();
        assert_ready_ok!(first.poll());
        drop(first);
        assert_eq!(remote.calls_to(Endpoint::SimulateTransaction), 1);
    }
}
