//! Example: connect to a WiFi OBD adapter, reset it, and probe for
//! supported PIDs.
//!
//! Adapter address and timeout come from the default configuration
//! (192.168.0.10:35000); pass a host as the first argument to override.

use std::time::Duration;

use obd2_connect::{ConnectionConfig, ConnectionState, ObdConnection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut builder = ConnectionConfig::builder().request_timeout(Duration::from_millis(500));
    if let Some(host) = std::env::args().nth(1) {
        builder = builder.host(host);
    }
    let config = builder.build();

    println!("Connecting to adapter at {}...", config.addr());
    let connection = ObdConnection::new(config);

    let mut states = connection.subscribe();
    tokio::spawn(async move {
        while let Ok(state) = states.recv().await {
            println!("[state] {state}");
        }
    });

    connection.open().await;

    // Wait until the stream pair is open before talking to the adapter.
    let mut attempts = 0;
    loop {
        match connection.state() {
            ConnectionState::Open => break,
            ConnectionState::Error(e) => anyhow::bail!("connection failed: {e}"),
            _ if attempts > 50 => anyhow::bail!("adapter did not answer"),
            _ => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    // ATZ resets the adapter; 0100 asks which PIDs the vehicle supports.
    for command in ["ATZ\r", "ATE0\r", "0100\r"] {
        match connection.send(command).await {
            Ok(response) => println!("> {} -> {:?}", command.trim_end(), response),
            Err(e) => println!("> {} failed: {e}", command.trim_end()),
        }
    }

    connection.close().await;
    Ok(())
}
