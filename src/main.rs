pub mod accounts;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lock;
pub mod optout;
pub mod quota;
pub mod store;
pub mod validate;

use std::{path::Path, sync::Arc};

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    accounts::StaticAccountDirectory,
    config::{GatewayConfig, LogConfig},
    handlers::AppState,
    optout::OptOutRegistry,
    quota::QuotaCounter,
};

fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => GatewayConfig::from_file(Path::new(&path))?,
        None => GatewayConfig::development(),
    };

    init_tracing(&config.log);
    info!("Starting sms-gateway v{}", env!("CARGO_PKG_VERSION"));

    let store = store::create_store(&config.store).await?;
    info!(backend = ?config.store.backend, "store ready");

    let state = AppState {
        store: store.clone(),
        accounts: Arc::new(StaticAccountDirectory::new(&config.accounts)),
        opt_out: OptOutRegistry::new(store.clone(), config.opt_out.retention()),
        quota: QuotaCounter::new(
            store,
            config.quota.limit,
            config.quota.window(),
            config.lock.settings(),
            config.lock.scope,
        ),
    };

    let app = handlers::router(Arc::new(state));

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    info!(addr = %config.server.listen_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
