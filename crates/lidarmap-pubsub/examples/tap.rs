//! Print every message published under a topic prefix.
//!
//! Usage: cargo run -p lidarmap-pubsub --example tap -- <host> <port> [prefix]
//!
//! Example:
//!   cargo run -p lidarmap-pubsub --example tap -- localhost 9000 lidar/

use std::time::Duration;

use lidarmap_pubsub::{Address, ClientConfig, PubSubClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <host> <port> [prefix]", args[0]);
        eprintln!("  prefix  Topic prefix to print (default: everything)");
        std::process::exit(1);
    }

    let port: u16 = args[2].parse()?;
    let prefix = args.get(3).cloned().unwrap_or_default();

    let client = PubSubClient::new(
        ClientConfig::new(Address::new(args[1].as_str(), port))
            .with_reconnect_delay(Duration::from_secs(1)),
    );

    // Wait for the broker; the client retries in the background.
    while client.begin().await.is_err() && !client.is_connected() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    client
        .subscribe(prefix.as_str(), |payload: &[u8]| {
            let preview: Vec<String> = payload
                .iter()
                .take(16)
                .map(|b| format!("{:02x}", b))
                .collect();
            println!("{} bytes: {}", payload.len(), preview.join(" "));
        })
        .await?;
    println!("Listening on '{}' at {}", prefix, client.url());

    tokio::signal::ctrl_c().await?;
    client.shutdown().await;
    Ok(())
}
