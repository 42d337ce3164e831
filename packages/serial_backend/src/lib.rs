//! Serial port backend for `port_session`.
//!
//! Each open port gets a worker thread that owns the device. The worker reads
//! with a short timeout, executes commands between reads, keeps its own
//! formatted history and optionally appends received data to a log file.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use port_session::{ConnectionParams, ConnectionRegistry, Dispatcher};
//! use serial_backend::SerialBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (events_tx, events_rx) = tokio::sync::mpsc::channel(256);
//!     let registry = ConnectionRegistry::new();
//!     let dispatcher = Dispatcher::new(registry.clone(), Arc::new(SerialBackend::new(events_tx)));
//!
//!     let id = registry
//!         .add_port(ConnectionParams { name: "/dev/ttyUSB0".to_string(), baud_rate: 115200 })
//!         .await
//!         .unwrap();
//!     dispatcher.open_link(id).await.unwrap();
//!     let events = dispatcher.clone();
//!     tokio::spawn(async move { events.run_events(events_rx).await });
//! }
//! ```

mod backend;
mod format;
mod ports;
mod worker;

pub use backend::SerialBackend;
pub use format::format_bytes;
pub use ports::{PortInfo, PortType, list_ports};
