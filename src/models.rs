//! Core data models for the finance helper

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::error::{OrchestrationError, Result};

/// Extensions accepted for statement upload (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "txt", "csv"];

//
// ================= Tokens =================
//

/// Short-lived credential authorizing one bank-linking widget session.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkToken(String);

impl LinkToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LinkToken(<redacted>)")
    }
}

/// Token handed back by the widget on a successful link, exchanged
/// server-side for a durable access credential.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicToken(String);

impl PublicToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PublicToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PublicToken(<redacted>)")
    }
}

//
// ================= Analysis =================
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    /// Report text exactly as the server returned it (may contain markdown).
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// A statement picked by the user, held only until the next submit attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    file_name: String,
    bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a statement from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                OrchestrationError::Validation(format!(
                    "Not a file path: {}",
                    path.display()
                ))
            })?
            .to_string();

        let bytes = tokio::fs::read(path).await?;
        Ok(Self { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    pub fn has_allowed_extension(&self) -> bool {
        self.extension()
            .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Short content hash for correlating log lines, never sent anywhere.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedTransaction {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Raw inputs for a synthetic transaction as the user typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionDraft {
    pub transaction_name: String,
    pub transaction_amount: String,
}

impl TransactionDraft {
    pub fn parse(&self) -> Result<SimulatedTransaction> {
        let name = self.transaction_name.trim();
        if name.is_empty() {
            return Err(OrchestrationError::Validation(
                "Please enter a transaction name".to_string(),
            ));
        }

        let amount: Decimal = self
            .transaction_amount
            .trim()
            .parse()
            .map_err(|_| {
                OrchestrationError::Validation("Please enter a valid amount".to_string())
            })?;

        Ok(SimulatedTransaction {
            name: name.to_string(),
            amount,
        })
    }

    pub fn clear(&mut self) {
        self.transaction_name.clear();
        self.transaction_amount.clear();
    }
}

//
// ================= Scheduling =================
//

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateJobState {
    #[default]
    Stopped,
    Running,
}

impl fmt::Display for UpdateJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateJobState::Stopped => "Stopped",
            UpdateJobState::Running => "Running",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Errors =================
//

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local precondition failed, nothing was sent.
    Validation,
    Unreachable,
    ServerRejected,
    Widget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Single error slot owned by one component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorState {
    current: Option<RecordedError>,
}

impl ErrorState {
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn record(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.current = Some(RecordedError {
            kind,
            message: message.into(),
        });
    }

    /// Record a failure; rejected calls (busy, already connected) are skipped.
    pub fn record_failure(&mut self, err: &OrchestrationError) {
        if let Some(kind) = err.kind() {
            self.record(kind, err.to_string());
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.current.as_ref().map(|e| e.message.as_str())
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.current.as_ref().map(|e| e.kind)
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_check_is_case_insensitive() {
        assert!(UploadedFile::new("statement.PDF", b"x".to_vec()).has_allowed_extension());
        assert!(UploadedFile::new("march.csv", b"x".to_vec()).has_allowed_extension());
        assert!(!UploadedFile::new("photo.png", b"x".to_vec()).has_allowed_extension());
        assert!(!UploadedFile::new("README", b"x".to_vec()).has_allowed_extension());
    }

    #[test]
    fn test_tokens_are_redacted_in_debug() {
        let token = LinkToken::new("link-sandbox-secret");
        assert!(!format!("{:?}", token).contains("secret"));
        let public = PublicToken::new("public-sandbox-secret");
        assert!(!format!("{:?}", public).contains("secret"));
    }

    #[test]
    fn test_draft_parses_decimal_amount() {
        let draft = TransactionDraft {
            transaction_name: "  Coffee ".to_string(),
            transaction_amount: "4.50".to_string(),
        };
        let tx = draft.parse().unwrap();
        assert_eq!(tx.name, "Coffee");
        assert_eq!(tx.amount, Decimal::new(450, 2));

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["amount"].as_f64(), Some(4.5));
        assert!(json["amount"].is_number());
    }

    #[test]
    fn test_transaction_amount_is_a_json_number() {
        let tx = SimulatedTransaction {
            name: "Coffee".to_string(),
            amount: Decimal::new(450, 2),
        };
        assert_eq!(
            serde_json::to_string(&tx).unwrap(),
            r#"{"name":"Coffee","amount":4.5}"#
        );

        let parsed: SimulatedTransaction =
            serde_json::from_str(r#"{"name":"Rent","amount":1200.25}"#).unwrap();
        assert_eq!(parsed.amount, Decimal::new(120025, 2));
    }

    #[test]
    fn test_draft_validation_messages() {
        let missing_name = TransactionDraft {
            transaction_name: " ".to_string(),
            transaction_amount: "1".to_string(),
        };
        assert_eq!(
            missing_name.parse().unwrap_err().to_string(),
            "Please enter a transaction name"
        );

        let bad_amount = TransactionDraft {
            transaction_name: "Rent".to_string(),
            transaction_amount: "twelve".to_string(),
        };
        assert_eq!(
            bad_amount.parse().unwrap_err().to_string(),
            "Please enter a valid amount"
        );
    }

    #[test]
    fn test_error_state_slot() {
        let mut slot = ErrorState::default();
        assert!(slot.is_empty());

        slot.record_failure(&OrchestrationError::Busy("Daily updates"));
        assert!(slot.is_empty());

        slot.record_failure(&OrchestrationError::Validation("Please select a file first".into()));
        assert_eq!(slot.kind(), Some(ErrorKind::Validation));
        assert_eq!(slot.message(), Some("Please select a file first"));

        slot.clear();
        assert!(slot.is_empty());
    }
}
