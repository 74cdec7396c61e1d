//! # remote-config-watch
//!
//! Loads one remote resource and prints selected keys until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! remote-config-watch http://localhost:5000 test.settings.json --key Config.Text
//!
//! # React to push notifications as well as polling
//! remote-config-watch http://localhost:5000 test.settings.json \
//!     --key Config.Text --pubsub-url redis://127.0.0.1:6379
//! ```

use clap::Parser;
use hotswap_remote::client::{Configuration, RemoteConfigurationProvider, display_periodically};
use hotswap_remote::core::FormatParser;
use hotswap_remote::pubsub::Subscriber;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Remote configuration watcher
#[derive(Parser, Debug)]
#[command(name = "remote-config-watch")]
#[command(about = "Print remote configuration values as they change", long_about = None)]
#[command(version)]
struct Args {
    /// Base URI of the configuration host
    service_uri: String,

    /// Resource name to load
    name: String,

    /// Key to print (dot-separated); repeat for several keys
    #[arg(short, long = "key")]
    keys: Vec<String>,

    /// Seconds between prints
    #[arg(long, default_value = "5")]
    interval: u64,

    /// Seconds between polls of the resource
    #[arg(long, default_value = "60")]
    poll: u64,

    /// Treat the resource as optional
    #[arg(long)]
    optional: bool,

    /// Pub/sub server for push notifications (redis:// or nats://)
    #[arg(long)]
    pubsub_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotswap_remote=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let provider = RemoteConfigurationProvider::builder()
        .with_service_uri(&args.service_uri)
        .with_configuration_name(&args.name)
        .with_parser(FormatParser::for_name(&args.name))
        .optional(args.optional)
        .reload_on_change(true)
        .with_poll_interval(Duration::from_secs(args.poll.max(1)))
        .build()?;

    let mut builder = Configuration::builder().add_remote(provider);
    if let Some(url) = &args.pubsub_url {
        builder = builder.with_subscriber(subscriber_for(url)?);
    }
    let config = builder.build().await?;

    let _changes = config.subscribe(|| tracing::info!("Configuration changed"));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        canceller.cancel();
    });

    display_periodically(
        &config,
        &args.keys,
        Duration::from_secs(args.interval.max(1)),
        token,
        tokio::io::stdout(),
    )
    .await?;

    config.shutdown().await;
    Ok(())
}

fn subscriber_for(url: &str) -> Result<Arc<dyn Subscriber>, Box<dyn std::error::Error>> {
    #[cfg(feature = "redis")]
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(hotswap_remote::pubsub::redis::RedisSubscriber::new(url)?));
    }

    #[cfg(feature = "nats")]
    if url.starts_with("nats://") || url.starts_with("tls://") {
        return Ok(Arc::new(hotswap_remote::pubsub::nats::NatsSubscriber::new(url)));
    }

    Err(format!("no compiled-in pub/sub backend handles '{}'", url).into())
}
