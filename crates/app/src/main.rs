//! CueCannon - peer-to-peer cue tracking for play readings
//!
//! A director announces a production, actors join it, parts are cast and
//! every peer follows the same cue pointer through the script.

use std::sync::Arc;
use std::time::Duration;

use cuecannon_core::Database;
use cuecannon_net::{MemoryHub, MeshNode, Overlay, OverlayEvents};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod canon;
mod config;
mod console;
mod engine;
mod error;
mod handle;
mod observer;

use canon::Canon;
use config::Config;
use engine::ProductionEngine;
use error::Result;
use handle::EngineHandle;
use observer::{ChannelObserver, ShowEvent};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting CueCannon");

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;

    let db_path = config.data_dir()?.join("cuecannon.db");
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&db_path)?;
    let canon = Arc::new(Canon::from_config(db, &config.canon));

    let delay = config.show.reannounce_delay();
    let (handle, show_events) = if config.network.memory {
        // Solo rehearsal, nobody else on the hub
        let (node, events) = MemoryHub::new().join().await;
        start_engine(node, events, canon.clone(), delay).await?
    } else {
        let (node, events) = MeshNode::start(config.network.mesh()).await?;
        tracing::info!(addr = %node.addr(), "Mesh node listening");
        start_engine(node, events, canon.clone(), delay).await?
    };

    console::run(handle, canon, show_events, &config.show.display_name).await
}

async fn start_engine<O: Overlay>(
    overlay: O,
    events: OverlayEvents,
    canon: Arc<Canon>,
    delay: Duration,
) -> Result<(EngineHandle, UnboundedReceiver<ShowEvent>)> {
    let (observer, show_events) = ChannelObserver::new();
    let mut engine =
        ProductionEngine::new(overlay, canon, observer).with_reannounce_delay(delay);
    engine.init().await?;

    let (handle, _task) = engine.spawn(events);
    Ok((handle, show_events))
}
