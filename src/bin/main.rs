use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use finance_helper_orchestrator::{
    link::{LinkWidget, WidgetError},
    Config, HttpRemoteClient, LinkToken, OrchestratorState, OrchestratorView, PublicToken,
    UploadedFile,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "finance-helper", about = "Personal finance helper client")]
struct Cli {
    /// Backend API base URL (overrides FINANCE_API_BASE_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Connect a sandbox bank account before running the command
    #[arg(long, global = true)]
    sandbox: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a bank statement (.pdf, .txt, .csv) for analysis
    Analyze { file: PathBuf },
    /// Link a bank account through the widget flow
    Link,
    /// Analyze the linked account's simulated transactions
    Simulate,
    /// Record one synthetic transaction on the linked account
    AddTransaction {
        #[arg(long)]
        name: String,
        #[arg(long)]
        amount: String,
    },
    /// Control the daily transaction update job
    Updates {
        #[arg(value_enum)]
        action: UpdateAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum UpdateAction {
    Start,
    Stop,
    Trigger,
}

/// Terminal stand-in for the bank-linking widget: shows the link token and
/// leaves the user to complete linking elsewhere.
struct ConsoleWidget;

#[async_trait]
impl LinkWidget for ConsoleWidget {
    fn is_ready(&self) -> bool {
        true
    }

    async fn open(&self, token: LinkToken) -> Result<(), WidgetError> {
        println!("Link token: {}", token.as_str());
        println!("Complete linking with this token, then paste the public token below.");
        Ok(())
    }
}

async fn read_public_token() -> std::io::Result<Option<String>> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let token = line.trim();
    Ok((!token.is_empty()).then(|| token.to_string()))
}

async fn run(state: &OrchestratorState, command: Command) -> finance_helper_orchestrator::Result<()> {
    match command {
        Command::Analyze { file } => {
            let file = UploadedFile::from_path(&file).await?;
            state.select_file(file).await;
            state.submit_file().await?;
        }
        Command::Link => {
            if state.view().await.link.connected {
                info!("Bank account already connected, skipping link");
                return Ok(());
            }
            state.initialize().await?;
            state.open_widget(&ConsoleWidget).await?;
            match read_public_token().await? {
                Some(token) => {
                    state
                        .on_widget_success(PublicToken::new(token), serde_json::Value::Null)
                        .await?
                }
                None => {
                    state
                        .on_widget_error(WidgetError("no public token entered".to_string()))
                        .await?
                }
            }
        }
        Command::Simulate => {
            state.simulate_transactions().await?;
        }
        Command::AddTransaction { name, amount } => {
            state.set_transaction_name(name).await;
            state.set_transaction_amount(amount).await;
            state.add_transaction().await?;
        }
        Command::Updates { action } => match action {
            UpdateAction::Start => {
                state.start_updates().await?;
            }
            UpdateAction::Stop => {
                state.stop_updates().await?;
            }
            UpdateAction::Trigger => {
                state.trigger_update().await?;
            }
        },
    }
    Ok(())
}

fn render(view: &OrchestratorView) {
    let notices = [
        view.link.notice.as_deref(),
        view.transaction_entry.notice.as_deref(),
        view.schedule.notice.as_deref(),
    ];
    for notice in notices.into_iter().flatten() {
        println!("{}", notice);
    }

    if let Some(result) = &view.file_analysis.result {
        println!("\n=== STATEMENT ANALYSIS ===\n{}", result.text);
    }
    if let Some(result) = &view.simulation.result {
        println!("\n=== TRANSACTION ANALYSIS ===\n{}", result.text);
    }

    for (region, error) in view.errors() {
        eprintln!("[{}] {}", region, error.message().unwrap_or_default());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }
    info!(api = %config.api_base_url, "Finance helper starting");

    let client = HttpRemoteClient::new(&config)?;
    let state = OrchestratorState::new(Arc::new(client));

    let mut outcome = Ok(());
    if cli.sandbox {
        outcome = state.create_sandbox_item().await;
    }
    if outcome.is_ok() {
        outcome = run(&state, cli.command).await;
    }

    render(&state.view().await);
    outcome.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finance_helper_orchestrator::backend::{serve, BackendState};
    use tokio::net::TcpListener;

    async fn state_with_backend() -> OrchestratorState {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, BackendState::new()));

        let config = Config {
            api_base_url: format!("http://{}/api", addr),
            ..Config::default()
        };
        OrchestratorState::new(Arc::new(HttpRemoteClient::new(&config).unwrap()))
    }

    #[tokio::test]
    async fn test_link_after_sandbox_is_skipped() {
        let state = state_with_backend().await;
        state.create_sandbox_item().await.unwrap();

        run(&state, Command::Link).await.unwrap();

        let view = state.view().await;
        assert!(view.link.connected);
        assert!(view.errors().is_empty());
        assert!(!view.link.has_token);
    }

    #[tokio::test]
    async fn test_sandbox_then_add_transaction() {
        let state = state_with_backend().await;
        state.create_sandbox_item().await.unwrap();

        let command = Command::AddTransaction {
            name: "Coffee".to_string(),
            amount: "4.50".to_string(),
        };
        run(&state, command).await.unwrap();
        assert_eq!(
            state.view().await.transaction_entry.notice.as_deref(),
            Some("Added transaction: Coffee (4.50)")
        );
    }
}
