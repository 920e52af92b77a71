use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use vetconsult::api::{start_server, ApiContext};
use vetconsult::config::{default_log_filter, AppConfig};
use vetconsult::db::open_database;
use vetconsult::payment::HostedCheckout;
use vetconsult::storage::LocalFileStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .init();

    let config = AppConfig::from_env();
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(config.files_dir())?;

    // Opening once up front runs pending migrations before traffic arrives.
    open_database(&config.db_path())?;
    tracing::info!(db = %config.db_path().display(), "Database ready");

    let store = Arc::new(LocalFileStore::new(config.files_dir()));
    let gateway = Arc::new(HostedCheckout::from_config(&config));
    let bind_addr = config.bind_addr;
    let ctx = ApiContext::new(config, store, gateway);

    let mut server = start_server(ctx, bind_addr).await?;
    tracing::info!(addr = %server.addr, "vetconsult listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    server.shutdown();
    Ok(())
}
