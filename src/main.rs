use anyhow::{Context, Result};
use axum::Router;
use ehr_store::{
    config::AppConfig,
    routes,
    services::{
        backend::DiskBackend,
        crypto::EncryptionKey,
        file_service::FileService,
        key_provider::{DerivedKeyProvider, KeyProvider, MemoryKeyProvider},
        object_store::EncryptedObjectStore,
        publisher::{ChangePublisher, LogTransport, RetryingPublisher},
    },
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        addr = %cfg.addr(),
        storage_dir = %cfg.storage_dir,
        database_url = %cfg.database_url,
        master_key = cfg.master_key.is_some(),
        "starting ehr-store"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    // SQLx does not create the database file itself.
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(db_path)
        .with_context(|| format!("opening SQLite database at {}", db_path))?;

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );
    let disk = DiskBackend::new(db, cfg.storage_dir.clone());

    // --- Handle migration mode ---
    disk.migrate().await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Wire the engine ---
    let keys: Arc<dyn KeyProvider> = match &cfg.master_key {
        Some(hex_key) => Arc::new(DerivedKeyProvider::new(
            EncryptionKey::from_hex(hex_key).context("parsing master key")?,
        )),
        None => {
            tracing::warn!(
                "no master key configured; bucket keys live in memory and stored payloads will be unreadable after restart"
            );
            Arc::new(MemoryKeyProvider::new())
        }
    };
    let storage = Arc::new(EncryptedObjectStore::new(Arc::new(disk.clone()), keys));
    let publisher = Arc::new(RetryingPublisher::new(
        Arc::new(LogTransport),
        cfg.retry_policy(),
    ));
    let files = Arc::new(FileService::new(storage, publisher.clone()));

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(AppState { disk, files });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Drain outstanding change events ---
    publisher.close().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
