//! SSE Listen Example
//!
//! Connects to a Server-Sent Events endpoint, prints every event and logs
//! every dispatched notification.
//!
//! Run with: `cargo run -p hpx-eventsource --example sse_listen -- <url>`

use std::time::Duration;

use hpx_eventsource::{
    ConnectionOptions, EventSourceClient, HttpTransport, Listener, Notification,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8080/events".to_string());

    let options = ConnectionOptions::new(url)
        .timeout(Duration::from_secs(10))
        .retry_interval(Duration::from_secs(2))
        .max_retries(5);

    let dispatcher = |notification: Notification| {
        info!(kind = %notification.kind, payload = %notification.payload, "notification");
    };
    let client = EventSourceClient::new(options, HttpTransport::new(), dispatcher)?;

    client.on_message(|event| {
        println!("[{}] {}", event.event_type(), event.payload());
    });
    client.add_event_listener(
        "update",
        Listener::new(|event| match event.json::<serde_json::Value>() {
            Ok(value) => println!("update: {value:#}"),
            Err(err) => println!("update with non-JSON payload: {err}"),
        }),
    );

    client.connect(None)?;

    let mut states = client.subscribe_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!(%state, retry_count = client.retry_count(), "state changed");
                if state.is_closed() {
                    break;
                }
            }
        }
    }

    client.disconnect();
    Ok(())
}
