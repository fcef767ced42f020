//! Finance Helper Orchestrator
//!
//! Client-side state orchestration for a personal-finance helper that:
//! - Links a bank account through an external widget (or a sandbox item)
//! - Uploads statements for analysis
//! - Simulates transactions against the linked account
//! - Drives a server-side daily update job
//!
//! Every remote interaction goes through `remote::RemoteClient`; all state
//! lives in `orchestrator::OrchestratorState`.

pub mod analysis;
pub mod backend;
pub mod config;
pub mod error;
pub mod link;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod scheduler;
pub mod signal;
pub mod transactions;

pub use error::{OrchestrationError, RemoteError, Result};

// Re-export common types
pub use config::Config;
pub use models::*;
pub use orchestrator::{OrchestratorState, OrchestratorView};
pub use remote::{HttpRemoteClient, RemoteClient};
