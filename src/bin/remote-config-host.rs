//! # remote-config-host
//!
//! Serves configuration resources over HTTP and announces their changes.
//!
//! ## Usage
//!
//! ```bash
//! # Serve ./config on 127.0.0.1:5000 without push notifications
//! remote-config-host
//!
//! # Run with a settings file
//! remote-config-host --config host.toml
//!
//! # Run with environment variables
//! REMOTE_CONFIG_ROOT=/etc/app REMOTE_CONFIG_PUBSUB__BACKEND=redis \
//!     REMOTE_CONFIG_PUBSUB__URL=redis://127.0.0.1:6379 remote-config-host
//! ```

use clap::Parser;
use hotswap_remote::host::{
    ConfigurationService, FileStorageProvider, HostSettings, PubSubSettings, ResourceWatcher,
    server,
};
use hotswap_remote::pubsub::{MemoryBroker, MemoryPublisher, Publisher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration host
#[derive(Parser, Debug)]
#[command(name = "remote-config-host")]
#[command(about = "Serve configuration resources and publish change notifications", long_about = None)]
#[command(version)]
struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the resource root directory
    #[arg(long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotswap_remote=info,remote_config_host=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut settings = HostSettings::load(args.config.as_deref())?;
    if let Some(root) = args.root {
        settings.root = root;
    }

    tracing::info!(
        root = %settings.root.display(),
        pattern = %settings.search_pattern,
        "Starting configuration host on {}",
        settings.bind
    );

    let storage = FileStorageProvider::new(&settings.root).with_search_pattern(&settings.search_pattern)?;
    let publisher = connect_publisher(&settings.pubsub).await?;
    let service = Arc::new(ConfigurationService::new(Arc::new(storage.clone()), publisher));

    let summary = service.initialize().await?;
    tracing::info!(
        published = summary.published,
        failed = summary.failed,
        "Initial announcement complete"
    );

    let shutdown = CancellationToken::new();

    // Keep the watcher alive for the lifetime of the process.
    let _watcher = if settings.watch {
        let (watcher, changes) = ResourceWatcher::new(&storage, settings.debounce())?;
        let service = Arc::clone(&service);
        let token = shutdown.clone();
        tokio::spawn(async move { service.watch(changes, token).await });
        Some(watcher)
    } else {
        None
    };

    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        token.cancel();
    });

    let listener = TcpListener::bind(settings.bind).await?;
    server::serve(listener, service, shutdown).await?;

    Ok(())
}

async fn connect_publisher(
    settings: &PubSubSettings,
) -> Result<Option<Arc<dyn Publisher>>, Box<dyn std::error::Error>> {
    let publisher: Option<Arc<dyn Publisher>> = match settings {
        PubSubSettings::None => None,
        PubSubSettings::Memory => Some(Arc::new(MemoryPublisher::new(MemoryBroker::new()))),
        #[cfg(feature = "redis")]
        PubSubSettings::Redis { url } => Some(Arc::new(
            hotswap_remote::pubsub::redis::RedisPublisher::connect(url).await?,
        )),
        #[cfg(feature = "nats")]
        PubSubSettings::Nats { url } => Some(Arc::new(
            hotswap_remote::pubsub::nats::NatsPublisher::connect(url).await?,
        )),
        #[allow(unreachable_patterns)]
        other => {
            return Err(format!("pub/sub backend {:?} is not compiled in", other).into());
        }
    };

    if let Some(publisher) = &publisher {
        tracing::info!(backend = %publisher.name(), "Publishing change notifications");
    }
    Ok(publisher)
}
