//! Port Session - state and command protocol for concurrent serial sessions
//!
//! This crate holds the parts of a serial terminal that have real invariants:
//! the registry of connections with their bounded receive buffers, the
//! encoder that turns typed input into outbound bytes, and the dispatcher that
//! talks to a port backend and reacts to its failures. The backend itself is
//! a trait; this crate never touches a physical port.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use port_session::{ConnectionParams, ConnectionRegistry, Dispatcher, PortBackend, SendMode};
//!
//! async fn run<B: PortBackend>(backend: Arc<B>) -> Result<(), port_session::SessionError> {
//!     let registry = ConnectionRegistry::new();
//!     let dispatcher = Dispatcher::new(registry.clone(), backend);
//!
//!     let id = registry
//!         .add_port(ConnectionParams {
//!             name: "/dev/ttyUSB0".to_string(),
//!             baud_rate: 115200,
//!         })
//!         .await?;
//!
//!     dispatcher.open_link(id).await?;
//!     dispatcher.send_input(id, "41 54 0d", SendMode::Hex, false, false).await?;
//!     dispatcher.close_link(id).await
//! }
//! ```

mod backend;
mod command;
mod connection;
mod dispatcher;
pub mod encoder;
mod error;
pub mod options;
mod registry;

pub use backend::{BackendEvent, BackendEventKind, PortBackend};
pub use command::{Command, CommandKind, DisplayConfig, LogSettings, Payload};
pub use connection::{Connection, ConnectionId, ConnectionParams, PortSettings};
pub use dispatcher::{Dispatch, Dispatcher};
pub use encoder::{Frame, encode, encode_single_byte};
pub use error::{BackendError, EncodeError, FailureClass, LINK_LOST_MARKER, SessionError};
pub use options::{
    BaudRate, DataBits, DisplayMode, FlowControl, OptionEntry, Parity, SendMode, StopBits,
};
pub use registry::{ConnectionDefaults, ConnectionRegistry, RegistryEvent};
