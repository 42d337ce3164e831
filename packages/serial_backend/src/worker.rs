use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use port_session::{
    BackendEvent, BackendEventKind, Command, CommandKind, ConnectionId, DisplayMode,
    LINK_LOST_MARKER, LogSettings, Payload,
};

use crate::format::format_bytes;

/// History kept by a worker until the session pushes its own size
pub(crate) const DEFAULT_HISTORY_BYTES: usize = 20_000;

const READ_BUFFER_SIZE: usize = 2000;

/// A command for the worker plus the channel its result goes back on
pub(crate) struct WorkerMessage {
    pub command: Command,
    pub respond_to: oneshot::Sender<Result<(), String>>,
}

/// Thread control for the worker running one port
pub(crate) struct WorkerHandle {
    pub sender: std_mpsc::Sender<WorkerMessage>,
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

impl WorkerHandle {
    /// Start a worker thread that owns `port` until stopped or the link fails
    pub fn spawn<P>(port: P, worker: PortWorker) -> std::io::Result<Self>
    where
        P: Read + Write + Send + 'static,
    {
        let (sender, receiver) = std_mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = thread::Builder::new()
            .name(format!("serial-{}", worker.id))
            .spawn(move || run(port, worker, receiver, stop_flag))?;
        Ok(Self {
            sender,
            stop,
            thread,
        })
    }

    /// Ask the worker thread to shut down
    pub fn stop(&self) {
        debug!("Stopping serial worker");
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the worker thread to terminate
    pub fn wait_until_stopped(self) -> Result<(), String> {
        self.thread
            .join()
            .map_err(|e| format!("Serial worker thread panicked: {:?}", e))
    }
}

/// Per-port state owned by the worker thread
pub(crate) struct PortWorker {
    id: ConnectionId,
    display_mode: DisplayMode,
    max_bytes: usize,
    history: Vec<u8>,
    log: LogSettings,
    events: mpsc::Sender<BackendEvent>,
}

impl PortWorker {
    pub fn new(id: ConnectionId, events: mpsc::Sender<BackendEvent>) -> Self {
        Self {
            id,
            display_mode: DisplayMode::default(),
            max_bytes: DEFAULT_HISTORY_BYTES,
            history: Vec::new(),
            log: LogSettings::default(),
            events,
        }
    }

    fn emit(&self, kind: BackendEventKind) {
        if self
            .events
            .blocking_send(BackendEvent::new(self.id, kind))
            .is_err()
        {
            debug!("No listener for events from {}", self.id);
        }
    }

    fn snapshot(&self) {
        self.emit(BackendEventKind::Snapshot(format_bytes(
            &self.history,
            self.display_mode,
        )));
    }

    fn trim_history(&mut self) {
        if self.history.len() > self.max_bytes {
            let excess = self.history.len() - self.max_bytes;
            self.history.drain(..excess);
        }
    }

    pub fn handle_command(&mut self, port: &mut impl Write, command: Command) -> Result<(), String> {
        match (command.kind, command.payload) {
            (CommandKind::Tx, payload) => {
                let bytes = match payload {
                    Payload::Byte(b) => vec![b],
                    Payload::Text(text) => text.into_bytes(),
                    Payload::Bytes(bytes) => bytes,
                    other => return Err(format!("Data format unknown for Tx: {:?}", other)),
                };
                debug!("Tx {} bytes on {}", bytes.len(), self.id);
                port.write_all(&bytes)
                    .and_then(|_| port.flush())
                    .map_err(|e| format!("Unable to send command to serial port. {}", e))
            }
            (CommandKind::Settings, Payload::Display(config)) => {
                self.max_bytes = config.max_bytes.max(1);
                self.display_mode = config.display_mode;
                self.trim_history();
                self.snapshot();
                Ok(())
            }
            (CommandKind::Clear, _) => {
                self.history.clear();
                self.snapshot();
                Ok(())
            }
            (CommandKind::Logging, Payload::Log(settings)) => {
                info!(
                    "Logging for {} {} ({})",
                    self.id,
                    if settings.enabled { "enabled" } else { "disabled" },
                    settings.path
                );
                self.log = settings;
                Ok(())
            }
            (kind, payload) => Err(format!("Data format unknown for {:?}: {:?}", kind, payload)),
        }
    }

    pub fn handle_received(&mut self, bytes: &[u8]) {
        self.history.extend_from_slice(bytes);
        self.trim_history();

        let text = format_bytes(bytes, self.display_mode);
        if self.log.enabled {
            if let Err(e) = self.append_log(&text) {
                warn!("Unable to write log file {}: {}", self.log.path, e);
                self.emit(BackendEventKind::Error(format!(
                    "Unable to write log file. {}",
                    e
                )));
            }
        }
        self.emit(BackendEventKind::Received(text));
    }

    fn append_log(&self, text: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.log.path)?;
        file.write_all(text.as_bytes())
    }
}

/// Worker loop: drain pending commands, read what the port has, repeat.
///
/// The port's read timeout paces the loop. A read failure other than a
/// timeout means the device is gone.
pub(crate) fn run<P: Read + Write>(
    mut port: P,
    mut worker: PortWorker,
    commands: std_mpsc::Receiver<WorkerMessage>,
    stop: Arc<AtomicBool>,
) {
    info!("Serial worker started for {}", worker.id);
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    while !stop.load(Ordering::SeqCst) {
        loop {
            match commands.try_recv() {
                Ok(message) => {
                    let result = worker.handle_command(&mut port, message.command);
                    let _ = message.respond_to.send(result);
                }
                Err(std_mpsc::TryRecvError::Empty) => break,
                Err(std_mpsc::TryRecvError::Disconnected) => {
                    debug!("Command channel for {} dropped", worker.id);
                    return;
                }
            }
        }

        match port.read(&mut buffer) {
            Ok(0) => {}
            Ok(count) => worker.handle_received(&buffer[..count]),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                error!("Read failed on {}: {}", worker.id, e);
                worker.emit(BackendEventKind::Error(format!("{} {}", LINK_LOST_MARKER, e)));
                break;
            }
        }
    }

    info!("Serial worker for {} exiting", worker.id);
}
