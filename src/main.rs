//! Node Disk Agent
//!
//! Per-node agent keeping BlockDevice records in sync with the node's
//! physical block storage. Runs a full registration scan on startup, then
//! folds in udev hardware events and control-plane change notifications.

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, Client};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use node_disk_agent::crd::{BlockDevice, Node};
use node_disk_agent::{
    CascadeDeleter, DeviceEventWatcher, DeviceRegistrar, Error, KubeDeviceStore, MountReconciler,
    Result, SysfsProbe, SystemFilesystemOps, UdevadmMonitor, WatcherConfig, HOSTNAME_LABEL,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Node Disk Agent - per-node block device reconciliation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace the BlockDevice records live in
    #[arg(long, env = "NAMESPACE", default_value = "longhorn-system")]
    namespace: String,

    /// Name of the node this agent runs on
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let node_name = args.node_name.clone().ok_or(Error::NodeNameMissing)?;

    info!("Starting Node Disk Agent");
    info!("  Version: {}", node_disk_agent::VERSION);
    info!("  Node: {}", node_name);
    info!("  Namespace: {}", args.namespace);

    let client = Client::try_default().await?;
    let store = Arc::new(KubeDeviceStore::new(client.clone()));
    let probe = Arc::new(SysfsProbe::default_probe());
    let fs_ops = Arc::new(SystemFilesystemOps::new());

    // Full scan first: every present disk and partition gets a record
    // before the incremental paths start.
    let registrar = Arc::new(DeviceRegistrar::new(
        &args.namespace,
        &node_name,
        store.clone(),
        probe.clone(),
    ));
    registrar.register_node_devices().await?;
    info!("Initial device registration complete");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                cancel.cancel();
            }
        });
    }

    // Incremental hardware discovery from udev events
    let monitor = UdevadmMonitor::new();
    let subscription = monitor.subscribe(cancel.clone())?;
    let event_watcher = Arc::new(DeviceEventWatcher::new(
        &args.namespace,
        &node_name,
        store.clone(),
        probe.clone(),
        registrar.clone(),
        WatcherConfig::default(),
    ));
    let watcher_handle = {
        let event_watcher = event_watcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            event_watcher
                .run(subscription.events, subscription.errors, cancel)
                .await;
        })
    };

    // Change notifications from the control plane
    let reconciler = MountReconciler::new(store.clone(), probe.clone(), fs_ops);
    let deleter = CascadeDeleter::new(&args.namespace, store.clone());

    let devices: Api<BlockDevice> = Api::namespaced(client.clone(), &args.namespace);
    let device_config =
        watcher::Config::default().labels(&format!("{}={}", HOSTNAME_LABEL, node_name));
    let device_stream = watcher(devices, device_config);

    let nodes: Api<Node> = Api::namespaced(client, &args.namespace);
    let node_stream = watcher(nodes, watcher::Config::default());

    tokio::pin!(device_stream, node_stream);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = device_stream.next() => match event {
                Some(Ok(event)) => handle_device_event(event, &reconciler, &deleter).await,
                Some(Err(e)) => warn!("Device watch error: {}", e),
                None => break,
            },
            event = node_stream.next() => match event {
                Some(Ok(event)) => handle_node_event(event, &deleter).await,
                Some(Err(e)) => warn!("Node watch error: {}", e),
                None => break,
            },
        }
    }

    cancel.cancel();
    if let Err(e) = watcher_handle.await {
        error!("Event watcher task failed: {}", e);
    }

    info!("Agent shutdown complete");
    Ok(())
}

async fn handle_device_event(
    event: watcher::Event<BlockDevice>,
    reconciler: &MountReconciler,
    deleter: &CascadeDeleter,
) {
    match event {
        watcher::Event::Applied(device) => {
            if let Err(e) = reconciler.on_device_change(&device).await {
                warn!(
                    device = device.metadata.name.as_deref().unwrap_or(""),
                    "Change evaluation failed: {}", e
                );
            }
        }
        watcher::Event::Deleted(device) => {
            if let Err(e) = deleter.on_device_removed(&device).await {
                warn!(
                    device = device.metadata.name.as_deref().unwrap_or(""),
                    "Cascade deletion failed: {}", e
                );
            }
        }
        watcher::Event::Restarted(devices) => {
            for device in devices {
                if let Err(e) = reconciler.on_device_change(&device).await {
                    warn!(
                        device = device.metadata.name.as_deref().unwrap_or(""),
                        "Change evaluation failed: {}", e
                    );
                }
            }
        }
    }
}

async fn handle_node_event(event: watcher::Event<Node>, deleter: &CascadeDeleter) {
    if let watcher::Event::Deleted(node) = event {
        let name = node.metadata.name.as_deref().unwrap_or("");
        info!(node = name, "Node removed, releasing its device records");
        if let Err(e) = deleter.on_node_removed(name).await {
            warn!(node = name, "Node cascade deletion failed: {}", e);
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
