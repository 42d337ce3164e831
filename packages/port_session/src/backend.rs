use std::future::Future;

use crate::command::Command;
use crate::connection::{ConnectionId, PortSettings};
use crate::error::BackendError;

/// The physical side of a session: opens ports, carries commands, closes ports.
///
/// Calls for different ids must be independent of each other.
pub trait PortBackend: Send + Sync {
    /// Open the port for `id` with the given line settings
    fn open(
        &self,
        id: ConnectionId,
        settings: &PortSettings,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Deliver one command to the open port for `id`
    fn send(
        &self,
        id: ConnectionId,
        command: Command,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Close the port for `id`. Closing a port that is not open succeeds.
    fn close(&self, id: ConnectionId) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// What the backend reports about a port without being asked
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEventKind {
    /// New data, already formatted for display
    Received(String),
    /// The full formatted history, replacing what the session holds
    Snapshot(String),
    /// A failure message, classified by the dispatcher
    Error(String),
    /// The backend closed the port on its own
    Closed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendEvent {
    pub id: ConnectionId,
    pub kind: BackendEventKind,
}

impl BackendEvent {
    pub fn new(id: ConnectionId, kind: BackendEventKind) -> Self {
        Self { id, kind }
    }
}
