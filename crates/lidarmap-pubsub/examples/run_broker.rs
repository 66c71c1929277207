//! Run a standalone broker until Ctrl+C.
//!
//! Usage: cargo run -p lidarmap-pubsub --example run_broker -- [port]
//!
//! Example:
//!   RUST_LOG=debug cargo run -p lidarmap-pubsub --example run_broker -- 9000

use lidarmap_pubsub::Broker;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(9000);

    let bound = Broker::new().bind(("0.0.0.0", port)).await?;
    println!("Broker on ws://{}", bound.local_addr()?);
    println!("Press Ctrl+C to stop");

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    bound.serve(cancel).await?;
    Ok(())
}
