use async_trait::async_trait;
use finance_helper_orchestrator::{
    analysis::JobStatus,
    backend::{serve, BackendState},
    error::UNREACHABLE_MESSAGE,
    link::{LinkPhase, LinkWidget, WidgetError},
    Config, ErrorKind, HttpRemoteClient, LinkToken, OrchestratorState, PublicToken,
    UpdateJobState, UploadedFile,
};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Widget that remembers the token it was opened with.
#[derive(Default)]
struct RecordingWidget {
    token: Mutex<Option<String>>,
}

#[async_trait]
impl LinkWidget for RecordingWidget {
    fn is_ready(&self) -> bool {
        true
    }

    async fn open(&self, token: LinkToken) -> Result<(), WidgetError> {
        *self.token.lock().unwrap() = Some(token.as_str().to_string());
        Ok(())
    }
}

async fn spawn_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, BackendState::new()));
    format!("http://{}/api", addr)
}

fn orchestrator(api_base_url: String) -> OrchestratorState {
    let config = Config {
        api_base_url,
        ..Config::default()
    };
    OrchestratorState::new(Arc::new(HttpRemoteClient::new(&config).unwrap()))
}

#[tokio::test]
async fn test_full_session_against_mock_backend() {
    let state = orchestrator(spawn_backend().await);

    state.initialize().await.unwrap();
    assert!(state.view().await.can_open_widget);

    let widget = RecordingWidget::default();
    state.open_widget(&widget).await.unwrap();
    let token = widget.token.lock().unwrap().clone().unwrap();
    assert!(token.starts_with("link-sandbox-"));

    state
        .on_widget_success(PublicToken::new("public-sandbox-1"), serde_json::Value::Null)
        .await
        .unwrap();
    assert!(state.view().await.link.connected);

    state.set_transaction_name("Coffee").await;
    state.set_transaction_amount("4.50").await;
    state.add_transaction().await.unwrap();

    let report = state.simulate_transactions().await.unwrap();
    assert!(report.text.contains("- Coffee: $4.50"));

    state
        .select_file(UploadedFile::new(
            "statement.csv",
            b"2024-03-01,Groceries,-120.00\n".to_vec(),
        ))
        .await;
    let summary = state.submit_file().await.unwrap();
    assert!(summary.text.contains("Spending $120.00"));

    state.start_updates().await.unwrap();
    state.trigger_update().await.unwrap();
    state.stop_updates().await.unwrap();

    let view = state.view().await;
    assert_eq!(view.schedule.state, UpdateJobState::Stopped);
    assert_eq!(view.schedule.notice.as_deref(), Some("Daily updates stopped"));
    assert_eq!(view.file_status(), JobStatus::Succeeded);
    assert!(view.errors().is_empty());
}

#[tokio::test]
async fn test_server_error_text_is_surfaced() {
    let state = orchestrator(spawn_backend().await);

    state.initialize().await.unwrap();
    state.open_widget(&RecordingWidget::default()).await.unwrap();
    assert!(state
        .on_widget_success(PublicToken::new(""), serde_json::Value::Null)
        .await
        .is_err());

    let view = state.view().await;
    assert!(!view.link.connected);
    assert_eq!(view.link.phase, LinkPhase::TokenFailed);
    assert_eq!(view.link.error.kind(), Some(ErrorKind::ServerRejected));
    assert_eq!(view.link.error.message(), Some("public_token is required"));
}

#[tokio::test]
async fn test_unreachable_backend() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let state = orchestrator(format!("http://{}/api", addr));
    assert!(state.initialize().await.is_err());

    let view = state.view().await;
    assert_eq!(view.link.phase, LinkPhase::TokenFailed);
    assert_eq!(view.link.error.kind(), Some(ErrorKind::Unreachable));
    assert_eq!(view.link.error.message(), Some(UNREACHABLE_MESSAGE));
    assert!(!view.can_open_widget);
}
