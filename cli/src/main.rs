//! consentis — consent ledger indexer and API server.
//!
//! Startup order: environment → tracing → store → contract interface →
//! WebSocket client → event listener + HTTP server. SIGINT/SIGTERM trigger
//! cooperative shutdown with a bounded grace period.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use consentis_abi::ConsentRegistryAbi;
use consentis_api::pinning::PinningClient;
use consentis_api::{create_app, run_server, AppState};
use consentis_core::AppConfig;
use consentis_listener::{EventListener, EvmWsClient};
use consentis_storage::{ConsentStore, MemoryStore, PgStore, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env().context("invalid configuration")?;
    info!(
        rpc = %config.rpc_ws_url,
        contract = %config.contract_address,
        http = %config.http_addr,
        "starting consentis"
    );

    let store = open_store(&config.database_url).await?;
    let abi = Arc::new(ConsentRegistryAbi::bundled().context("contract interface")?);

    let pinning = match &config.pinning {
        Some(cfg) => Some(Arc::new(
            PinningClient::new(cfg).context("pinning client")?,
        )),
        None => {
            warn!("pinning credentials not configured; record uploads disabled");
            None
        }
    };

    let ws = Arc::new(
        EvmWsClient::connect(&config.rpc_ws_url)
            .await
            .context("connecting to Ethereum node")?,
    );
    let listener = EventListener::new(ws, abi, store.clone(), config.contract_address);

    let addr: SocketAddr = config
        .http_addr
        .parse()
        .with_context(|| format!("invalid HTTP_ADDR {}", config.http_addr))?;
    let app = create_app(AppState {
        store: store.clone(),
        pinning,
    });

    let token = CancellationToken::new();
    let listener_token = token.clone();
    let mut listener_task =
        tokio::spawn(async move { listener.run(listener_token).await });
    let mut server_task = tokio::spawn(run_server(app, addr));

    let mut listener_finished = false;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        res = &mut server_task => {
            token.cancel();
            return match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("HTTP server"),
                Err(e) => Err(anyhow::anyhow!("HTTP server task failed: {e}")),
            };
        }
        res = &mut listener_task => {
            listener_finished = true;
            match res {
                Ok(Ok(())) => {
                    // Both subscription streams are gone; the ledger stops
                    // advancing but reads keep working until shutdown.
                    warn!("event listener stopped; HTTP API still serving");
                    shutdown_signal().await;
                    info!("shutdown signal received");
                }
                Ok(Err(e)) => {
                    error!(error = %e, "event listener failed");
                    server_task.abort();
                    return Err(e).context("event listener");
                }
                Err(e) => {
                    server_task.abort();
                    return Err(anyhow::anyhow!("event listener task failed: {e}"));
                }
            }
        }
    }

    token.cancel();
    if !listener_finished {
        let grace = Duration::from_secs(config.shutdown_grace_secs);
        match tokio::time::timeout(grace, &mut listener_task).await {
            Ok(Ok(Ok(()))) => info!("event listener drained"),
            Ok(Ok(Err(e))) => warn!(error = %e, "event listener exited with error during shutdown"),
            Ok(Err(e)) => warn!(error = %e, "event listener task failed during shutdown"),
            Err(_) => warn!(
                grace_secs = config.shutdown_grace_secs,
                "shutdown deadline exceeded; abandoning event listener"
            ),
        }
    }
    server_task.abort();

    info!("consentis stopped");
    Ok(())
}

/// `RUST_LOG` env filter; `LOG_JSON=1` switches to JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Pick the storage backend from the database URL scheme.
async fn open_store(url: &str) -> anyhow::Result<Arc<dyn ConsentStore>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        info!("using PostgreSQL storage");
        Ok(Arc::new(PgStore::connect(url).await?))
    } else if url == "memory" {
        warn!("using in-memory storage; data is lost on exit");
        Ok(Arc::new(MemoryStore::new()))
    } else if url.starts_with("sqlite:") || url.ends_with(".db") {
        info!(url, "using SQLite storage");
        Ok(Arc::new(SqliteStore::open(url).await?))
    } else {
        anyhow::bail!("unsupported database URL: {url}")
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
