use anthropic_gateway::config::config_search_paths;
use anthropic_gateway::{build_router, AppState, GatewayConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "anthropic-gateway",
    about = "Serve Anthropic Messages API clients from any OpenAI-compatible backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream base URL (overrides config and OPENROUTER_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anthropic_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = GatewayConfig::find_and_load(cli.config.as_deref())?;

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.upstream.base_url = base_url;
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_secs))
        .build()?;

    let state = AppState::new(config.clone(), client);

    info!("anthropic-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:  {}", config.completions_url());
    info!("  Listen:    {}", config.bind_addr());
    if state.default_token.is_some() {
        warn!(
            "  Default bearer token from ${} is set; requests without credentials will use it",
            config.upstream.default_token_env
        );
    }

    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;

    info!("Listening on http://{}", listener.local_addr()?);
    info!("  ANTHROPIC_BASE_URL=http://localhost:{} <client>", config.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
