//! Start an anthropic-gateway server programmatically.
//!
//! Usage:
//!   export DEFAULT_BEARER_TOKEN=sk-or-your-key   # optional fallback credential
//!   cargo run --example basic_gateway

use anthropic_gateway::{build_router, AppState, GatewayConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::find_and_load(None)?;
    println!("Upstream: {}", config.completions_url());

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.upstream.timeout_secs))
        .build()?;

    let addr = config.bind_addr();
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, client));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Listening on http://{}", addr);
    println!();
    println!("  ANTHROPIC_BASE_URL=http://localhost:{} <client>", port);

    axum::serve(listener, app).await?;
    Ok(())
}
