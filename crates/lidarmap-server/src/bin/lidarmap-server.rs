//! Lidarmap Server CLI
//!
//! A thin wrapper around the lidarmap-server library.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lidarmap_pubsub::{ClientError, PubSubClient};
use lidarmap_server::ingest::attach_to_bus;
use lidarmap_server::{LidarmapConfig, ServerCore};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "lidarmap-server")]
#[command(about = "Live lidar point store with frustum queries")]
#[command(after_help = "\
EXAMPLES:
    # Defaults: HTTP on 0.0.0.0:3000, broker at localhost:9000
    lidarmap-server

    # Settings from a file, port overridden on the command line
    lidarmap-server --config lidarmap.toml --port 8080

    # HTTP ingestion only
    lidarmap-server --no-pubsub
")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Drop points older than this many milliseconds
    #[arg(long)]
    max_age_ms: Option<f64>,

    /// Broker host
    #[arg(long)]
    broker_host: Option<String>,

    /// Broker port
    #[arg(long)]
    broker_port: Option<u16>,

    /// Topic carrying point batches
    #[arg(long)]
    topic: Option<String>,

    /// Don't connect to the message bus
    #[arg(long)]
    no_pubsub: bool,
}

impl Args {
    fn apply(self, config: &mut LidarmapConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(max_age_ms) = self.max_age_ms {
            config.store.max_age_ms = max_age_ms;
        }
        if let Some(host) = self.broker_host {
            config.pubsub.host = host;
        }
        if let Some(port) = self.broker_port {
            config.pubsub.port = port;
        }
        if let Some(topic) = self.topic {
            config.pubsub.topic = topic;
        }
        if self.no_pubsub {
            config.pubsub.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            LidarmapConfig::from_file(path)?
        }
        None => LidarmapConfig::default(),
    };
    args.apply(&mut config);

    let core = Arc::new(ServerCore::new(config.store).with_filter(config.filter));
    log::info!(
        "Keeping points for {}ms, cleaning every {}ms",
        config.store.max_age_ms,
        config.store.clean_interval_ms
    );

    let cancel = CancellationToken::new();
    let client = if config.pubsub.enabled {
        let client = Arc::new(PubSubClient::new(config.pubsub.client_config()));
        if let Err(e) = client.begin().await {
            log::warn!("Broker unavailable ({}), will keep retrying", e);
        }
        tokio::spawn({
            let client = client.clone();
            let topic = config.pubsub.topic.clone();
            let core = core.clone();
            let cancel = cancel.clone();
            async move {
                match attach_to_bus(client, topic, core, cancel).await {
                    Ok(()) => {}
                    Err(ClientError::Shutdown) => log::debug!("Stopped before bus was attached"),
                    Err(e) => log::error!("Bus ingestion stopped: {}", e),
                }
            }
        });
        Some(client)
    } else {
        log::info!("Message bus disabled, ingesting over HTTP only");
        None
    };

    let router = lidarmap_server::build_router_with_docs(core);

    let addr = config.server.bind_addr();
    println!("Starting server on {}", addr);
    println!("  POST /query - Points inside a frustum");
    println!("  POST /points - Add points");
    println!("  GET  /stats - Store statistics");
    println!("  GET  /swagger-ui - API documentation");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Shutting down");
                }
                cancel.cancel();
            }
        })
        .await?;

    if let Some(client) = client {
        client.shutdown().await;
    }

    Ok(())
}
