mod config;

use std::io::BufRead;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use blewl_core::{codec, MacAddress, Slot};
use blewl_store::{KvStore, MemoryKv, RedbKv, WhitelistStore};
use blewl_sync::{LocalBroker, Publisher, Startable, Synchronizer, TransportError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServiceConfig;

/// Messages buffered between the stdin bridge and the dispatcher.
const BROKER_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,blewl_sync=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("BLE whitelist service starting...");

    let config = ServiceConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;

    let store = WhitelistStore::new(open_kv(&config.database_path), config.namespace.clone());
    provision_slots(&store, &config.slots)?;

    let broker = LocalBroker::start(BROKER_CAPACITY);
    let sync = Synchronizer::new(config.sync_config(), store)
        .with_transport(Arc::new(broker.clone()));

    // Start touches storage, keep it off the runtime threads
    let starter = sync.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || starter.start()).await? {
        tracing::error!("Whitelist updates unavailable: {}", e);
    }

    let publisher = broker.publisher();
    let runtime = tokio::runtime::Handle::current();
    std::thread::Builder::new()
        .name("stdin-bridge".into())
        .spawn(move || stdin_bridge(publisher, runtime))?;

    let housekeeping_handle = tokio::spawn(housekeeping(
        sync.clone(),
        Duration::from_secs(config.housekeeping_secs.max(1)),
    ));

    let http_addr = config.http_addr;
    let http_sync = sync.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = start_http_server(http_addr, http_sync).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!("BLE whitelist service ready");
    tracing::info!("   Topic:       {}", display_topic(&config.topic));
    tracing::info!("   Mode:        {:?}", config.mode);
    tracing::info!("   Database:    {}", config.database_path.display());
    tracing::info!("   Whitelist:   http://{}/whitelist", http_addr);
    tracing::info!("   Diagnostics: http://{}/diagnostics", http_addr);
    tracing::info!("");
    tracing::info!("Publish updates on stdin as \"<topic> <json>\", one per line");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = housekeeping_handle => {
            tracing::warn!("Housekeeping stopped");
        }
    }

    broker.shutdown().await;

    // Last chance to persist an update whose save failed earlier
    let final_sync = sync.clone();
    if !tokio::task::spawn_blocking(move || final_sync.tick()).await? {
        tracing::warn!("Exiting with an unpersisted whitelist");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Open the durable store, falling back to a volatile one.
fn open_kv(path: &Path) -> Arc<dyn KvStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Cannot create {}: {}", parent.display(), e);
        }
    }

    match RedbKv::open(path) {
        Ok(kv) => {
            tracing::info!("Opened database {}", path.display());
            Arc::new(kv)
        }
        Err(e) => {
            tracing::warn!(
                "Cannot open database {} ({}), whitelist will not survive a restart",
                path.display(),
                e
            );
            Arc::new(MemoryKv::new())
        }
    }
}

/// Write the configured MACs into the legacy slot cells.
fn provision_slots(store: &WhitelistStore, macs: &[String]) -> anyhow::Result<()> {
    for (slot, raw) in Slot::ALL.into_iter().zip(macs) {
        let mac = MacAddress::parse(raw)
            .map_err(|e| anyhow::anyhow!("Invalid MAC for {}: {}", slot, e))?;

        match store.save_slot(slot, mac) {
            Ok(()) => tracing::info!("Provisioned {} = {}", slot, mac),
            Err(e) => tracing::warn!("Failed to provision {}: {}", slot, e),
        }
    }
    Ok(())
}

/// Split a bridge line into topic and payload.
fn parse_bridge_line(line: &str) -> Option<(&str, &str)> {
    let (topic, payload) = line.trim().split_once(char::is_whitespace)?;
    let payload = payload.trim_start();
    if payload.is_empty() {
        None
    } else {
        Some((topic, payload))
    }
}

/// Publish every stdin line until EOF or broker shutdown.
///
/// Runs on a plain thread: a pending stdin read must not hold up runtime
/// shutdown.
fn stdin_bridge(publisher: Publisher, runtime: tokio::runtime::Handle) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Stdin read error, bridge stopped: {}", e);
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let Some((topic, payload)) = parse_bridge_line(&line) else {
            tracing::warn!("Expected \"<topic> <json>\", ignoring line");
            continue;
        };

        match runtime.block_on(publisher.publish(topic, payload)) {
            Ok(()) => {}
            Err(TransportError::Closed) => return,
            Err(e) => tracing::warn!("Failed to publish: {}", e),
        }
    }

    tracing::debug!("Stdin closed, bridge stopped");
}

/// Periodically retry an outstanding persist.
async fn housekeeping(sync: Synchronizer, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let sync = sync.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || sync.tick()).await {
            tracing::error!("Housekeeping tick failed: {}", e);
        }
    }
}

fn display_topic(topic: &str) -> &str {
    if topic.is_empty() {
        "(none)"
    } else {
        topic
    }
}

/// Build the inspection router.
fn router(sync: Synchronizer) -> Router {
    Router::new()
        .route("/whitelist", get(whitelist_handler))
        .route("/diagnostics", get(diagnostics_handler))
        .route("/slots", get(slots_handler))
        .with_state(sync)
}

/// Start the HTTP inspection server
async fn start_http_server(addr: SocketAddr, sync: Synchronizer) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, router(sync)).await?;
    Ok(())
}

/// Current whitelist in wire format
async fn whitelist_handler(State(sync): State<Synchronizer>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        codec::encode(&sync.snapshot()),
    )
}

async fn diagnostics_handler(State(sync): State<Synchronizer>) -> String {
    sync.diagnostics().to_string()
}

/// Legacy slot values keyed by their storage name
async fn slots_handler(State(sync): State<Synchronizer>) -> Json<serde_json::Value> {
    let slots: serde_json::Map<String, serde_json::Value> = sync
        .slots()
        .iter()
        .map(|(slot, mac)| (slot.key().to_string(), mac.to_string().into()))
        .collect();
    Json(serde_json::Value::Object(slots))
}
