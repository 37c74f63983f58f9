//! Campaign Dialer
//!
//! Outbound voice campaign service: places AI-agent calls for started
//! campaigns during business hours, accounts call usage from provider
//! webhooks and runs the trial lifecycle sweeps.

mod models;
mod server;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_dialer=info,tower_http=info".into()),
        )
        .init();

    let config = server::config::AppConfig::from_env()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            tracing::info!("Starting campaign dialer on port {}", config.port);
            server::run_server(config).await
        })
}
