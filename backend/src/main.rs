//! CalendIO entry point: loads settings, prepares storage and serves pages.

mod server;

use std::sync::Arc;

use actix_web::web;
use mockable::DefaultEnv;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use calendio::config::AppSettings;
use calendio::domain::AccountService;
use calendio::domain::ports::DocumentStore;
use calendio::inbound::http::health::HealthState;
use calendio::inbound::http::session_config::{BuildMode, session_settings_from_env};
use calendio::inbound::http::state::HttpState;
use calendio::outbound::memory::InMemoryDocumentStore;
use calendio::outbound::persistence::{DbPool, PgDocumentStore, run_migrations};
use calendio::outbound::templates::MiniJinjaRenderer;
use server::{ServerConfig, create_server};

fn init_tracing(settings: &AppSettings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));
    if cfg!(debug_assertions) {
        fmt().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).json().try_init()
    }
}

async fn document_store(settings: &AppSettings) -> std::io::Result<Arc<dyn DocumentStore>> {
    let Some(pool_config) = settings.pool_config() else {
        warn!("no database URL configured; accounts live in memory and vanish on restart");
        return Ok(Arc::new(InMemoryDocumentStore::new()));
    };
    run_migrations(pool_config.database_url())
        .await
        .map_err(std::io::Error::other)?;
    let pool = DbPool::new(pool_config)
        .await
        .map_err(std::io::Error::other)?;
    info!("connected to PostgreSQL");
    Ok(Arc::new(PgDocumentStore::new(pool)))
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = AppSettings::load().map_err(|error| std::io::Error::other(error.to_string()))?;
    init_tracing(&settings).map_err(std::io::Error::other)?;

    let session = session_settings_from_env(&DefaultEnv::new(), BuildMode::from_debug_assertions())
        .map_err(std::io::Error::other)?;

    let accounts = AccountService::new(document_store(&settings).await?)
        .with_session_ttl_days(settings.session_ttl_days());
    accounts
        .ensure_indexes()
        .await
        .map_err(|error| std::io::Error::other(error.to_string()))?;

    let renderer = Arc::new(MiniJinjaRenderer::from_directory(settings.template_path()));
    let http_state = HttpState::new(accounts, renderer).with_pages(settings.pages());

    let health_state = web::Data::new(HealthState::new());
    let config = ServerConfig::new(http_state, session, settings.bind_addr())
        .with_session_ttl_days(settings.session_ttl_days());
    create_server(health_state, config)?.await
}
