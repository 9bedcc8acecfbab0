// MIT License - Copyright (c) 2015-2017 Nikishin Alexander
// Rust translation of OBD2Connect
//
//! # obd2-connect
//!
//! TCP client for ELM327-class OBD-II adapters (typically WiFi-bridged
//! dongles). Opens one persistent connection, sends ASCII AT/OBD
//! commands, and returns the adapter's ASCII response, framed by the
//! trailing prompt character `>` rather than a length prefix.
//!
//! The client does not interpret command semantics; it is a transparent
//! command/response shuttle with one request in flight at a time. No
//! external dependencies beyond tokio, thiserror, and tracing.
//!
//! ## Quick Start
//!
//! ```no_run
//! use obd2_connect::{ConnectionConfig, ConnectionState, ObdConnection};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConnectionConfig::builder()
//!         .host("192.168.0.10")
//!         .port(35000)
//!         .build();
//!
//!     let connection = ObdConnection::new(config);
//!
//!     let mut states = connection.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(state) = states.recv().await {
//!             println!("State: {state}");
//!         }
//!     });
//!
//!     connection.open().await;
//!     let response = connection.send("ATZ\r").await?;
//!     println!("Adapter says: {response:?}");
//!
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod state;

mod request;
mod transport;

// Re-exports for convenience
pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use connection::ObdConnection;
pub use error::{ObdError, Result};
pub use request::TERMINATOR;
pub use state::ConnectionState;
