//! Turns session intents into backend commands and routes backend failures
//! back into registry state.
//!
//! Every failed backend call is classified. Link loss closes the port and
//! marks the connection inactive; anything else is only reported. The
//! registry lock is never held across a backend call, so a slow port does not
//! hold up the others.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendEvent, BackendEventKind, PortBackend};
use crate::command::{Command, DisplayConfig, LogSettings};
use crate::connection::{Connection, ConnectionId};
use crate::encoder::{self, Frame};
use crate::error::{BackendError, SessionError};
use crate::options::SendMode;
use crate::registry::ConnectionRegistry;

/// Outcome of a command that is only meaningful for an open port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    SkippedInactive,
}

pub struct Dispatcher<B> {
    registry: ConnectionRegistry,
    backend: Arc<B>,
}

impl<B> Clone for Dispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            backend: self.backend.clone(),
        }
    }
}

impl<B: PortBackend> Dispatcher<B> {
    pub fn new(registry: ConnectionRegistry, backend: Arc<B>) -> Self {
        Self { registry, backend }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Open the port with the connection's settings, mark it active, then
    /// push its display and log settings.
    ///
    /// If the settings cannot be pushed the port is closed again, so an
    /// `Err` always leaves the connection inactive.
    pub async fn open_link(&self, id: ConnectionId) -> Result<(), SessionError> {
        let connection = self.registry.get(id).await?;
        let settings = connection.port_settings();
        info!(
            "Opening {} at {} baud for {}",
            settings.name, settings.baud_rate, id
        );

        if let Err(e) = self.backend.open(id, &settings).await {
            return Err(self.fail(id, e).await);
        }
        if let Err(e) = self.registry.set_is_active(id, true).await {
            self.roll_back_open(id).await;
            return Err(e);
        }

        if let Err(e) = self.push_settings(id, &connection).await {
            warn!("Could not configure {} after opening it: {}", id, e);
            self.roll_back_open(id).await;
            return Err(e);
        }
        Ok(())
    }

    async fn push_settings(
        &self,
        id: ConnectionId,
        connection: &Connection,
    ) -> Result<(), SessionError> {
        self.apply_display_config(id, display_config(connection))
            .await?;
        if connection.is_logging {
            self.apply_log_settings(id, log_settings(connection)).await?;
        }
        Ok(())
    }

    async fn roll_back_open(&self, id: ConnectionId) {
        if let Err(e) = self.close_link(id).await {
            error!("Could not close {} after a failed open: {}", id, e);
        }
    }

    /// Close the port and, once the backend acknowledges, mark it inactive.
    pub async fn close_link(&self, id: ConnectionId) -> Result<(), SessionError> {
        debug!("Closing link {}", id);
        match self.backend.close(id).await {
            Ok(()) => self.deactivate(id).await,
            Err(e) => {
                error!("Failed to close {}: {}", id, e);
                Err(e.into())
            }
        }
    }

    /// Ask the backend to clear its state for the port. The local receive
    /// buffer is left alone.
    pub async fn clear(&self, id: ConnectionId) -> Result<(), SessionError> {
        self.registry.get(id).await?;
        self.send(id, Command::clear()).await
    }

    /// Transmit an already validated frame on an active connection
    pub async fn transmit(&self, id: ConnectionId, frame: Frame) -> Result<(), SessionError> {
        self.require_active(id).await?;
        debug!("Tx {} bytes to {}", frame.len(), id);
        self.send(id, Command::tx(frame)).await
    }

    /// Transmit a single code, rejecting anything above 0xFF
    pub async fn transmit_byte(&self, id: ConnectionId, value: u32) -> Result<(), SessionError> {
        let byte = encoder::encode_single_byte(value)?;
        self.require_active(id).await?;
        self.send(id, Command::tx_byte(byte)).await
    }

    /// Encode typed input and transmit it. Returns the number of bytes sent.
    ///
    /// Invalid input is rejected before anything reaches the backend.
    pub async fn send_input(
        &self,
        id: ConnectionId,
        raw: &str,
        mode: SendMode,
        append_cr: bool,
        append_lf: bool,
    ) -> Result<usize, SessionError> {
        let frame = encoder::encode(raw, mode, append_cr, append_lf)?;
        let len = frame.len();
        self.transmit(id, frame).await?;
        Ok(len)
    }

    pub async fn apply_display_config(
        &self,
        id: ConnectionId,
        config: DisplayConfig,
    ) -> Result<Dispatch, SessionError> {
        if !self.registry.get(id).await?.is_active {
            debug!("Not sending display settings to inactive {}", id);
            return Ok(Dispatch::SkippedInactive);
        }
        self.send(id, Command::settings(config)).await?;
        Ok(Dispatch::Sent)
    }

    pub async fn apply_log_settings(
        &self,
        id: ConnectionId,
        settings: LogSettings,
    ) -> Result<Dispatch, SessionError> {
        if !self.registry.get(id).await?.is_active {
            debug!("Not sending log settings to inactive {}", id);
            return Ok(Dispatch::SkippedInactive);
        }
        self.send(id, Command::logging(settings)).await?;
        Ok(Dispatch::Sent)
    }

    /// Apply one unsolicited backend event to the registry.
    ///
    /// Error events are returned as `Err` after classification so the caller
    /// can show them. Events for removed connections are dropped.
    pub async fn handle_event(&self, event: BackendEvent) -> Result<(), SessionError> {
        let id = event.id;
        let result = match event.kind {
            BackendEventKind::Received(chunk) => self.registry.append_received(id, &chunk).await,
            BackendEventKind::Snapshot(buffer) => {
                self.registry.replace_received(id, &buffer).await
            }
            BackendEventKind::Closed(reason) => {
                info!("Backend closed {}: {}", id, reason);
                self.registry.set_is_active(id, false).await
            }
            BackendEventKind::Error(message) => {
                let err = BackendError::from_message(message);
                if !self.registry.exists(id).await {
                    debug!("Dropping error for removed connection {}: {}", id, err);
                    return Ok(());
                }
                return Err(self.fail(id, err).await);
            }
        };

        match result {
            Err(SessionError::NotFound(_)) => {
                debug!("Dropping event for removed connection {}", id);
                Ok(())
            }
            other => other,
        }
    }

    /// Apply backend events until the channel closes
    pub async fn run_events(&self, mut events: mpsc::Receiver<BackendEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event).await {
                warn!("Backend event: {}", e);
            }
        }
        debug!("Backend event channel closed");
    }

    async fn send(&self, id: ConnectionId, command: Command) -> Result<(), SessionError> {
        match self.backend.send(id, command).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(id, e).await),
        }
    }

    async fn require_active(&self, id: ConnectionId) -> Result<Connection, SessionError> {
        let connection = self.registry.get(id).await?;
        if !connection.is_active {
            return Err(SessionError::NotActive(id));
        }
        Ok(connection)
    }

    /// Report a backend failure, closing the link first if it was lost.
    async fn fail(&self, id: ConnectionId, err: BackendError) -> SessionError {
        error!("Backend call for {} failed: {}", id, err);
        if err.is_link_lost() {
            warn!("Lost the serial link for {}, closing it", id);
            if let Err(close_err) = self.close_link(id).await {
                error!("Could not close {} after link loss: {}", id, close_err);
            }
        }
        err.into()
    }

    async fn deactivate(&self, id: ConnectionId) -> Result<(), SessionError> {
        match self.registry.set_is_active(id, false).await {
            Err(SessionError::NotFound(_)) => {
                debug!("Connection {} was removed before close completed", id);
                Ok(())
            }
            other => other,
        }
    }
}

fn display_config(connection: &Connection) -> DisplayConfig {
    DisplayConfig {
        max_bytes: connection.max_bytes,
        display_mode: connection.display_mode,
    }
}

fn log_settings(connection: &Connection) -> LogSettings {
    LogSettings {
        enabled: connection.is_logging,
        path: connection.log_path.clone(),
    }
}
