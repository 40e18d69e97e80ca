use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use recipe_offline_server::offline_cache::fetcher::HttpFetcher;
use recipe_offline_server::offline_cache::memory::MemoryCacheStorage;
use recipe_offline_server::offline_cache::sqlite::SqliteCacheStorage;
use recipe_offline_server::offline_cache::BootOutcome;
use recipe_offline_server::{
    CacheError, CacheStorage, CacheWorker, Fetcher, OfflineConfig, OfflineState, StorageBackend,
    server,
};
use std::io;
use std::sync::Arc;
use tower::Service;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,recipe_offline_server=debug".into()),
        )
        .init();

    if let Err(e) = run().await {
        error!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CacheError> {
    let config = Arc::new(OfflineConfig::from_env()?);
    info!(
        "Cache version {} fronting {} ({} manifest entries)",
        config.cache_version,
        config.upstream,
        config.manifest.len()
    );

    let storage: Arc<dyn CacheStorage> = match config.storage {
        StorageBackend::Sqlite => {
            // Ensure storage directory exists before creating database
            std::fs::create_dir_all(&config.storage_dir)?;
            Arc::new(SqliteCacheStorage::new(&config.db_path())?)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; cached entries will not survive a restart");
            Arc::new(MemoryCacheStorage::new())
        }
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::from_config(&config)?);

    let (worker, outcome) = CacheWorker::boot(config.clone(), storage, fetcher.clone()).await?;
    match &outcome {
        BootOutcome::AlreadyActive => info!("Offline cache {} already active", config.cache_version),
        BootOutcome::Upgraded { install, .. } => info!(
            "✅ Offline cache {} installed ({} entries)",
            install.version,
            install.cached.len()
        ),
        BootOutcome::KeptPrevious { version, error } => {
            warn!("Serving previous offline cache {}: {}", version, error)
        }
    }

    let state = Arc::new(OfflineState::new(config.clone(), worker, fetcher));

    // Create and run the server
    let app = server::create_app(state.clone());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(
        "Recipe offline server listening on http://{} (HTTP/1.1 + HTTP/2)",
        config.listen_addr
    );
    if config.storage == StorageBackend::Sqlite {
        info!("Storage database: {}", config.db_path().display());
    }

    // Use hyper's auto-negotiating server to support both HTTP/1.1 and HTTP/2
    let conn_builder = ConnBuilder::new(hyper_util::rt::TokioExecutor::new());

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => break,
        };
        debug!("New connection from: {}", addr);
        let io = TokioIo::new(stream);
        let app_clone = app.clone();
        let conn_builder = conn_builder.clone();

        tokio::spawn(async move {
            if let Err(err) = conn_builder
                .serve_connection(
                    io,
                    hyper::service::service_fn(move |req| app_clone.clone().call(req)),
                )
                .await
            {
                // Check if the error is an io::Error indicating a normal close
                let is_normal_close = err
                    .source()
                    .and_then(|e| e.downcast_ref::<io::Error>())
                    .map(|io_err| {
                        matches!(
                            io_err.kind(),
                            io::ErrorKind::ConnectionReset
                                | io::ErrorKind::BrokenPipe
                                | io::ErrorKind::UnexpectedEof
                        )
                    })
                    .unwrap_or(false);

                if is_normal_close {
                    debug!("Connection from {} closed normally", addr);
                } else {
                    error!("Error serving connection from {}: {}", addr, err);
                }
            }
        });
    }

    info!("Shutting down, waiting for pending cache writes");
    state.worker.interceptor().settle().await;
    Ok(())
}
