//! Mock finance backend
//!
//! In-memory stand-in for the bank-linking / analysis server, used for
//! local runs of the CLI and for end-to-end tests.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::models::SimulatedTransaction;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// =============================
/// State
/// =============================

#[derive(Default)]
struct Ledger {
    link_tokens_issued: usize,
    access_token: Option<String>,
    transactions: Vec<SimulatedTransaction>,
    daily_updates: bool,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct BackendState {
    ledger: Arc<RwLock<Ledger>>,
}

impl BackendState {
    pub fn new() -> Self {
        Self::default()
    }
}

type ApiResult = std::result::Result<Json<Value>, (StatusCode, Json<Value>)>;

fn reject(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    let message = message.into();
    warn!(status = %status, "Rejecting request: {}", message);
    (status, Json(json!({ "error": message })))
}

/// =============================
/// Health Endpoints
/// =============================

async fn home() -> &'static str {
    "Welcome to the Personal Finance AI Helper API"
}

async fn health(State(state): State<BackendState>) -> Json<Value> {
    let ledger = state.ledger.read().await;
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "link_tokens_issued": ledger.link_tokens_issued,
        "connected": ledger.access_token.is_some(),
        "daily_updates": ledger.daily_updates,
        "last_update": ledger.last_update.map(|t| t.to_rfc3339()),
    }))
}

/// =============================
/// Bank Linking
/// =============================

async fn create_link_token(State(state): State<BackendState>) -> Json<Value> {
    let token = format!("link-sandbox-{}", uuid::Uuid::new_v4());
    state.ledger.write().await.link_tokens_issued += 1;
    info!("Issued link token");
    Json(json!({ "link_token": token }))
}

#[derive(Debug, Deserialize)]
struct SetAccessTokenRequest {
    #[serde(default)]
    public_token: String,
}

async fn set_access_token(
    State(state): State<BackendState>,
    Json(req): Json<SetAccessTokenRequest>,
) -> ApiResult {
    if req.public_token.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "public_token is required"));
    }

    let mut ledger = state.ledger.write().await;
    ledger.access_token = Some(format!("access-sandbox-{}", uuid::Uuid::new_v4()));
    info!("Exchanged public token for access token");
    Ok(Json(json!({})))
}

async fn create_sandbox_item(State(state): State<BackendState>) -> Json<Value> {
    let mut ledger = state.ledger.write().await;
    ledger.access_token = Some(format!("access-sandbox-{}", uuid::Uuid::new_v4()));
    info!("Created sandbox item");
    Json(json!({}))
}

/// =============================
/// Analysis
/// =============================

async fn analyze(mut multipart: Multipart) -> ApiResult {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| reject(StatusCode::BAD_REQUEST, e.body_text()))?;

        let Some(field) = field else {
            return Err(reject(StatusCode::BAD_REQUEST, "No file part"));
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(reject(StatusCode::BAD_REQUEST, "No selected file"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| reject(StatusCode::BAD_REQUEST, e.body_text()))?;
        let content = String::from_utf8_lossy(&bytes);

        info!(file_name = %file_name, bytes = bytes.len(), "Analyzing statement");
        return Ok(Json(json!({ "summary": summarize_statement(&file_name, &content) })));
    }
}

/// Totals the last numeric column of each line: negatives are spending,
/// positives income.
pub fn summarize_statement(file_name: &str, content: &str) -> String {
    let mut lines = 0usize;
    let mut spending = Decimal::ZERO;
    let mut income = Decimal::ZERO;

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        lines += 1;
        let amount = line
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter_map(|token| token.trim_start_matches('$').parse::<Decimal>().ok())
            .last();

        match amount {
            Some(a) if a.is_sign_negative() => spending += -a,
            Some(a) => income += a,
            None => {}
        }
    }

    let mut summary = format!(
        "{}: {} lines reviewed. Spending ${:.2}, income ${:.2}.",
        file_name, lines, spending, income
    );
    if spending > income {
        summary.push_str(" Spending exceeds income; review recurring expenses first.");
    }
    summary
}

/// =============================
/// Transaction Simulation
/// =============================

async fn simulate_transaction(
    State(state): State<BackendState>,
    Json(tx): Json<SimulatedTransaction>,
) -> ApiResult {
    let mut ledger = state.ledger.write().await;
    if ledger.access_token.is_none() {
        return Err(reject(StatusCode::BAD_REQUEST, "No bank account connected"));
    }
    if tx.name.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Transaction name is required"));
    }

    info!(name = %tx.name, amount = %tx.amount, "Recorded simulated transaction");
    ledger.transactions.push(tx);
    Ok(Json(json!({})))
}

async fn simulate_transactions(State(state): State<BackendState>) -> ApiResult {
    let ledger = state.ledger.read().await;
    if ledger.access_token.is_none() {
        return Err(reject(StatusCode::BAD_REQUEST, "No bank account connected"));
    }

    Ok(Json(json!({ "analysis": render_transactions(&ledger.transactions) })))
}

fn render_transactions(transactions: &[SimulatedTransaction]) -> String {
    if transactions.is_empty() {
        return "## Transactions\nNo transactions recorded yet.".to_string();
    }

    let mut out = String::from("## Transactions\n");
    for tx in transactions {
        out.push_str(&format!("- {}: ${:.2}\n", tx.name, tx.amount));
    }
    let total: Decimal = transactions.iter().map(|tx| tx.amount).sum();
    out.push_str(&format!("\n**Total:** ${:.2}", total));
    out
}

/// =============================
/// Daily Updates
/// =============================

async fn start_daily_updates(State(state): State<BackendState>) -> Json<Value> {
    let mut ledger = state.ledger.write().await;
    let message = if ledger.daily_updates {
        "Daily updates already running"
    } else {
        ledger.daily_updates = true;
        "Daily updates started"
    };
    info!("{}", message);
    Json(json!({ "message": message }))
}

async fn stop_daily_updates(State(state): State<BackendState>) -> Json<Value> {
    let mut ledger = state.ledger.write().await;
    let message = if ledger.daily_updates {
        ledger.daily_updates = false;
        "Daily updates stopped"
    } else {
        "Daily updates were not running"
    };
    info!("{}", message);
    Json(json!({ "message": message }))
}

async fn trigger_update(State(state): State<BackendState>) -> Json<Value> {
    let now = Utc::now();
    state.ledger.write().await.last_update = Some(now);
    Json(json!({
        "message": format!("Update triggered at {}", now.format("%Y-%m-%d %H:%M:%S UTC")),
        "triggered_at": now.to_rfc3339(),
    }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: BackendState) -> Router {
    let api = Router::new()
        .route("/create_link_token", post(create_link_token))
        .route("/set_access_token", post(set_access_token))
        .route("/create_sandbox_item", post(create_sandbox_item))
        .route("/analyze", post(analyze))
        .route("/simulate_transactions", post(simulate_transactions))
        .route("/simulate_transaction", post(simulate_transaction))
        .route("/start_daily_updates", post(start_daily_updates))
        .route("/stop_daily_updates", post(stop_daily_updates))
        .route("/trigger_update", post(trigger_update));

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener, state: BackendState) -> crate::Result<()> {
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

pub async fn start_server(port: u16) -> crate::Result<()> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Mock backend listening on http://0.0.0.0:{}", port);
    info!("API base: http://127.0.0.1:{}/api", port);

    serve(listener, BackendState::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_empty(path: &str) -> Request<Body> {
        Request::post(path).body(Body::empty()).unwrap()
    }

    fn post_json(path: &str, body: Value) -> Request<Body> {
        Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload(field: &str, file_name: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n--BOUNDARY--\r\n",
            field, file_name, content
        );
        Request::post("/api/analyze")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_link_token_is_issued() {
        let router = create_router(BackendState::new());
        let (status, body) = send(&router, post_empty("/api/create_link_token")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["link_token"].as_str().unwrap().starts_with("link-sandbox-"));
    }

    #[tokio::test]
    async fn test_empty_public_token_rejected() {
        let router = create_router(BackendState::new());
        let (status, body) = send(
            &router,
            post_json("/api/set_access_token", json!({ "public_token": "" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "public_token is required");
    }

    #[tokio::test]
    async fn test_analyze_summarizes_upload() {
        let router = create_router(BackendState::new());
        let content = "2024-03-01,Groceries,-120.00\n2024-03-02,Salary,2500.00";
        let (status, body) = send(&router, upload("file", "statement.csv", content)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["summary"],
            "statement.csv: 2 lines reviewed. Spending $120.00, income $2500.00."
        );
    }

    #[tokio::test]
    async fn test_analyze_rejects_missing_file() {
        let router = create_router(BackendState::new());

        let (status, body) = send(&router, upload("attachment", "statement.csv", "x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file part");

        let (status, body) = send(&router, upload("file", "", "x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No selected file");
    }

    #[tokio::test]
    async fn test_simulation_requires_access_token() {
        let router = create_router(BackendState::new());
        let (status, body) = send(&router, post_empty("/api/simulate_transactions")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No bank account connected");

        let (status, _) = send(&router, post_empty("/api/create_sandbox_item")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &router,
            post_json("/api/simulate_transaction", json!({ "name": "Coffee", "amount": 4.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, post_empty("/api/simulate_transactions")).await;
        assert_eq!(status, StatusCode::OK);
        let analysis = body["analysis"].as_str().unwrap();
        assert!(analysis.contains("- Coffee: $4.50"));
    }

    #[tokio::test]
    async fn test_daily_update_messages() {
        let router = create_router(BackendState::new());

        let (_, body) = send(&router, post_empty("/api/start_daily_updates")).await;
        assert_eq!(body["message"], "Daily updates started");
        let (_, body) = send(&router, post_empty("/api/start_daily_updates")).await;
        assert_eq!(body["message"], "Daily updates already running");

        let (_, body) = send(&router, post_empty("/api/trigger_update")).await;
        assert!(body["message"].as_str().unwrap().starts_with("Update triggered at"));

        let (_, body) = send(&router, post_empty("/api/stop_daily_updates")).await;
        assert_eq!(body["message"], "Daily updates stopped");
    }

    #[tokio::test]
    async fn test_health_reports_ledger() {
        let router = create_router(BackendState::new());
        send(&router, post_empty("/api/create_link_token")).await;
        send(&router, post_empty("/api/create_link_token")).await;

        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["link_tokens_issued"], 2);
        assert_eq!(body["connected"], false);
        assert!(body["last_update"].is_null());
    }

    #[test]
    fn test_summary_flags_overspending() {
        let summary = summarize_statement("march.txt", "rent -1200\ncoffee $-4.50\nrefund 20");
        assert!(summary.contains("Spending $1204.50, income $20.00."));
        assert!(summary.ends_with("review recurring expenses first."));
    }
}
