//! Server-side code for the campaign dialer
//!
//! This module contains all backend functionality:
//! - Database access (PostgreSQL via sqlx)
//! - VAPI integration (outbound call placement and webhooks)
//! - Campaign dispatch, trial sweeps and usage accounting
//! - Cron scheduling of the periodic jobs
//! - HTTP routes

pub mod automation;
pub mod business_hours;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod email;
pub mod locks;
pub mod trials;
pub mod usage;
pub mod vapi;
pub mod webhooks;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use automation::CampaignPoller;
use config::AppConfig;
use db::{PhoneNumberStore, PgStore};
use dispatcher::Dispatcher;
use trials::TrialService;
use usage::{LogNotifier, UsageNotifier, UsageService};

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub numbers: Arc<dyn PhoneNumberStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub usage: Arc<UsageService>,
}

/// Create the Axum router with all API routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/webhooks/vapi", post(webhooks::handle_vapi_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// Health check
async fn health_check() -> &'static str {
    "OK"
}

fn build_notifier(config: &AppConfig) -> Arc<dyn UsageNotifier> {
    let Some(smtp) = config.smtp.as_ref() else {
        tracing::info!("SMTP not configured, usage alerts will only be logged");
        return Arc::new(LogNotifier);
    };

    match email::EmailService::new(smtp) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::warn!("Email service not configured: {}. Usage alerts will only be logged.", e);
            Arc::new(LogNotifier)
        }
    }
}

/// Run the HTTP server and the scheduled jobs until Ctrl-C
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    // Initialize database
    let pool = db::init_pool(&config.database_url).await?;

    // Run migrations (non-fatal if already applied)
    if let Err(e) = db::run_migrations(&pool).await {
        tracing::warn!("Migration warning (may be already applied): {}", e);
    }

    let store = Arc::new(PgStore::new(pool));

    if config.vapi_api_key.is_empty() {
        tracing::warn!("VAPI_API_KEY is not set, call placement will fail");
    }
    let provider = Arc::new(vapi::VapiClient::new(
        config.vapi_api_key.clone(),
        config.vapi_base_url.clone(),
        config.call_timeout,
    )?);

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        provider,
        config.call_timeout,
        config.dispatch_concurrency,
    ));
    let poller = Arc::new(CampaignPoller::new(
        store.clone(),
        dispatcher.clone(),
        config.poll_max_calls,
    ));
    let trials = Arc::new(TrialService::new(
        store.clone(),
        store.clone(),
        config.trial_number_hold_days,
    ));
    let usage = Arc::new(UsageService::new(store.clone(), build_notifier(&config)));

    let mut scheduler = automation::start_scheduler(&config, poller, trials).await?;

    let state = AppState {
        numbers: store,
        dispatcher,
        usage,
    };
    let app = create_router(state);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Server running on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    scheduler.shutdown().await?;
    tracing::info!("Scheduler stopped");

    Ok(())
}
