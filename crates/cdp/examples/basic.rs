//! Basic example - connecting, sending a command, watching events

use std::sync::Arc;

use cdp::{EventHandler, Socket};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Connect to Chrome
    let ws_url = "ws://localhost:9222/devtools/browser";
    println!("Connecting to Chrome at: {}", ws_url);

    let socket = Socket::open(ws_url).await?;
    println!("Connected!");

    // Get browser version
    let version = socket.send("Browser.getVersion", None).await?;
    println!("Browser version: {}", version);

    // Watch for new targets
    socket.add_event_handler(EventHandler::new(
        "Target.targetCreated",
        Arc::new(|event| {
            println!("Target created: {:?}", event.params);
        }),
    ));
    socket
        .send(
            "Target.setDiscoverTargets",
            Some(serde_json::json!({"discover": true})),
        )
        .await?;

    // Keep alive for a bit to see events
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    // Clean shutdown
    socket.disconnect().await?;
    println!("Disconnected");

    Ok(())
}
