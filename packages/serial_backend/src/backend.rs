use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use port_session::{
    BackendError, BackendEvent, Command, ConnectionId, DataBits, FlowControl, Parity,
    PortBackend, PortSettings, StopBits,
};

use crate::worker::{PortWorker, WorkerHandle, WorkerMessage};

/// How long a read waits before the worker checks for commands again
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Backend that drives real serial ports, one worker thread per open port
pub struct SerialBackend {
    workers: Mutex<HashMap<ConnectionId, WorkerHandle>>,
    events: mpsc::Sender<BackendEvent>,
}

impl SerialBackend {
    /// Create a backend whose workers report on `events`
    pub fn new(events: mpsc::Sender<BackendEvent>) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Ids of the ports that currently have a worker
    pub fn open_ports(&self) -> Vec<ConnectionId> {
        self.lock_workers().keys().copied().collect()
    }

    /// Stop every worker and wait for all of them
    pub async fn close_all(&self) {
        let handles: Vec<_> = self.lock_workers().drain().collect();
        for (id, handle) in handles {
            stop_worker(id, handle).await;
        }
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, WorkerHandle>> {
        // A poisoned map is still consistent: entries are only inserted or removed whole
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_worker(&self, id: ConnectionId) -> Option<WorkerHandle> {
        self.lock_workers().remove(&id)
    }
}

async fn stop_worker(id: ConnectionId, handle: WorkerHandle) {
    handle.stop();
    match tokio::task::spawn_blocking(move || handle.wait_until_stopped()).await {
        Ok(Ok(())) => debug!("Worker for {} stopped", id),
        Ok(Err(e)) => warn!("{}", e),
        Err(e) => warn!("Failed to join worker for {}: {}", id, e),
    }
}

impl PortBackend for SerialBackend {
    async fn open(&self, id: ConnectionId, settings: &PortSettings) -> Result<(), BackendError> {
        if let Some(existing) = self.take_worker(id) {
            debug!("Replacing open worker for {}", id);
            stop_worker(id, existing).await;
        }

        let settings = settings.clone();
        info!(
            "Opening {} at {} baud for {}",
            settings.name, settings.baud_rate, id
        );
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(settings.name.as_str(), settings.baud_rate.value())
                .data_bits(data_bits(settings.data_bits))
                .flow_control(flow_control(settings.flow_control))
                .parity(parity(settings.parity))
                .stop_bits(stop_bits(settings.stop_bits))
                .timeout(READ_TIMEOUT)
                .open()
        })
        .await
        .map_err(|e| BackendError::Other(format!("Unable to open serial port. {}", e)))?
        .map_err(|e| BackendError::Other(format!("Unable to open serial port. {}", e)))?;

        let worker = PortWorker::new(id, self.events.clone());
        let handle = WorkerHandle::spawn(port, worker)
            .map_err(|e| BackendError::Other(format!("Unable to start serial worker. {}", e)))?;
        self.lock_workers().insert(id, handle);
        Ok(())
    }

    async fn send(&self, id: ConnectionId, command: Command) -> Result<(), BackendError> {
        let sender = self
            .lock_workers()
            .get(&id)
            .map(|handle| handle.sender.clone())
            .ok_or(BackendError::NotConnected)?;

        let (respond_to, response) = oneshot::channel();
        let channel_closed = || BackendError::LinkLost {
            detail: "worker channel closed".to_string(),
        };
        sender
            .send(WorkerMessage {
                command,
                respond_to,
            })
            .map_err(|_| channel_closed())?;

        response
            .await
            .map_err(|_| channel_closed())?
            .map_err(BackendError::from_message)
    }

    async fn close(&self, id: ConnectionId) -> Result<(), BackendError> {
        match self.take_worker(id) {
            Some(handle) => {
                info!("Closing serial port for {}", id);
                stop_worker(id, handle).await;
            }
            None => debug!("Close for {} with no open port", id),
        }
        Ok(())
    }
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Software => serialport::FlowControl::Software,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::tests::MockPort;
    use port_session::{BackendEventKind, Frame};

    fn backend() -> (SerialBackend, mpsc::Receiver<BackendEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (SerialBackend::new(tx), rx)
    }

    fn attach(backend: &SerialBackend, id: ConnectionId, port: MockPort) {
        let worker = PortWorker::new(id, backend.events.clone());
        let handle = WorkerHandle::spawn(port, worker).unwrap();
        backend.lock_workers().insert(id, handle);
    }

    #[tokio::test]
    async fn send_without_open_port_is_not_connected() {
        let (backend, _rx) = backend();
        let err = backend
            .send(ConnectionId::new(), Command::tx_byte(1))
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::NotConnected);
    }

    #[tokio::test]
    async fn close_without_open_port_succeeds() {
        let (backend, _rx) = backend();
        backend.close(ConnectionId::new()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commands_reach_the_worker() {
        let (backend, mut rx) = backend();
        let id = ConnectionId::new();
        let port = MockPort::default();
        attach(&backend, id, port.clone());

        backend
            .send(id, Command::tx(Frame::from(b"AT\r".to_vec())))
            .await
            .unwrap();
        assert_eq!(*port.output.lock().unwrap(), b"AT\r".to_vec());

        backend.send(id, Command::clear()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.kind, BackendEventKind::Snapshot(String::new()));

        backend.close(id).await.unwrap();
        assert!(backend.open_ports().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dead_worker_reports_link_loss() {
        let (backend, mut rx) = backend();
        let id = ConnectionId::new();
        let port = MockPort::default();
        port.input.lock().unwrap().push_back(Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "unplugged",
        )));
        attach(&backend, id, port);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, BackendEventKind::Error(_)));

        let err = backend.send(id, Command::tx_byte(1)).await.unwrap_err();
        assert!(err.is_link_lost());
        backend.close_all().await;
    }

    #[test]
    fn settings_map_onto_serialport() {
        assert_eq!(data_bits(DataBits::Seven), serialport::DataBits::Seven);
        assert_eq!(
            flow_control(FlowControl::Hardware),
            serialport::FlowControl::Hardware
        );
        assert_eq!(parity(Parity::Even), serialport::Parity::Even);
        assert_eq!(stop_bits(StopBits::Two), serialport::StopBits::Two);
    }
}
