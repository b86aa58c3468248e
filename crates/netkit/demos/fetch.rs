//! Fetch a URL and print what the callback receives
//!
//! ```text
//! cargo run --example fetch -- https://httpbin.org/get
//! RUST_LOG=netkit=debug cargo run --example fetch -- https://httpbin.org/get
//! ```

use netkit::{Network, NetworkConfig, Response};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/get".to_string());

    let network = Network::new(NetworkConfig::from_env())?;
    let (tx, rx) = mpsc::channel();

    // Twice: the second request is answered from the response cache
    for attempt in 1..=2 {
        let tx = tx.clone();
        let task = network.request(url.as_str(), move |response: Response<serde_json::Value>| {
            let _ = tx.send((attempt, response));
        });
        info!(attempt, ?task, "request submitted");

        let (attempt, response) = rx.recv_timeout(Duration::from_secs(30))?;
        match response.result() {
            Ok(value) => info!(attempt, cached = response.is_from_cache(), "{value:#}"),
            Err(e) => error!(attempt, kind = ?e.kind(), "request failed: {e}"),
        }
        println!("{}", response.debug_description());
    }

    Ok(())
}
