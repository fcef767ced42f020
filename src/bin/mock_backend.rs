use finance_helper_orchestrator::{backend::start_server, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = Config::from_env()?;

    info!("Finance helper mock backend");
    info!("Port: {}", config.backend_port);

    start_server(config.backend_port).await?;

    Ok(())
}
