use anyhow::{Context, Result, anyhow, bail};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use port_session::{
    BackendEvent, BackendEventKind, ConnectionId, ConnectionParams, ConnectionRegistry,
    Dispatcher, DisplayConfig, DisplayMode, LogSettings, PortSettings, SendMode, SessionError,
};
use serial_backend::SerialBackend;

/// Everything needed to open and drive one port from the terminal
#[derive(Clone, Debug)]
pub struct MonitorOptions {
    pub port: PortSettings,
    pub send_mode: SendMode,
    pub append_cr: bool,
    pub append_lf: bool,
    pub log_path: Option<String>,
}

/// One line typed at the prompt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Clear,
    SendMode(SendMode),
    Display(DisplayMode),
    Size(usize),
    Log(String),
    NoLog,
    Byte(u32),
    Quit,
}

impl Input {
    /// Lines starting with `:` are terminal commands, anything else is data
    pub fn parse(line: &str) -> Result<Self> {
        let Some(command) = line.strip_prefix(':') else {
            return Ok(Input::Send(line.to_string()));
        };
        let (name, arg) = match command.trim().split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command.trim(), ""),
        };
        let require_arg = || {
            if arg.is_empty() {
                Err(anyhow!(":{} needs an argument", name))
            } else {
                Ok(arg)
            }
        };

        Ok(match name {
            "clear" => Input::Clear,
            "mode" => Input::SendMode(require_arg()?.parse()?),
            "display" => Input::Display(require_arg()?.parse()?),
            "size" => Input::Size(
                require_arg()?
                    .parse()
                    .with_context(|| format!("Invalid size: {}", arg))?,
            ),
            "log" => Input::Log(require_arg()?.to_string()),
            "nolog" => Input::NoLog,
            "byte" => Input::Byte(parse_code(require_arg()?)?),
            "quit" | "q" => Input::Quit,
            other => bail!("Unknown command :{}", other),
        })
    }
}

/// Decimal, or hex with a `0x` prefix
fn parse_code(arg: &str) -> Result<u32> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.with_context(|| format!("Invalid byte value: {}", arg))
}

/// Print received data and keep the registry in sync with the backend.
///
/// Signals `lost` once the link to the port is gone.
async fn forward_events(
    dispatcher: Dispatcher<SerialBackend>,
    mut events: mpsc::Receiver<BackendEvent>,
    lost: watch::Sender<bool>,
) {
    while let Some(event) = events.recv().await {
        if let BackendEventKind::Received(chunk) = &event.kind {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        }
        let closed = matches!(event.kind, BackendEventKind::Closed(_));
        match dispatcher.handle_event(event).await {
            Err(e) => {
                eprintln!("error: {}", e);
                if e.is_link_lost() {
                    let _ = lost.send(true);
                }
            }
            Ok(()) if closed => {
                let _ = lost.send(true);
            }
            Ok(()) => {}
        }
    }
}

struct Session {
    id: ConnectionId,
    dispatcher: Dispatcher<SerialBackend>,
    send_mode: SendMode,
    append_cr: bool,
    append_lf: bool,
}

impl Session {
    fn registry(&self) -> &ConnectionRegistry {
        self.dispatcher.registry()
    }

    async fn display_config(&self) -> Result<DisplayConfig, SessionError> {
        let c = self.registry().get(self.id).await?;
        Ok(DisplayConfig {
            max_bytes: c.max_bytes,
            display_mode: c.display_mode,
        })
    }

    /// Returns false when the session should end
    async fn handle(&mut self, input: Input) -> Result<bool, SessionError> {
        let id = self.id;
        match input {
            Input::Send(text) => {
                let sent = self
                    .dispatcher
                    .send_input(id, &text, self.send_mode, self.append_cr, self.append_lf)
                    .await?;
                debug!("Sent {} bytes", sent);
            }
            Input::Clear => self.dispatcher.clear(id).await?,
            Input::SendMode(mode) => {
                info!("Send mode {}", mode);
                self.send_mode = mode;
            }
            Input::Display(mode) => {
                self.registry().set_display_mode(id, mode).await?;
                let config = self.display_config().await?;
                self.dispatcher.apply_display_config(id, config).await?;
            }
            Input::Size(max_bytes) => {
                self.registry().set_display_size(id, max_bytes).await?;
                let config = self.display_config().await?;
                self.dispatcher.apply_display_config(id, config).await?;
            }
            Input::Log(path) => {
                self.registry().set_log_file(id, path.clone()).await?;
                self.registry().set_log_enabled(id, true).await?;
                self.dispatcher
                    .apply_log_settings(id, LogSettings { enabled: true, path })
                    .await?;
            }
            Input::NoLog => {
                self.registry().set_log_enabled(id, false).await?;
                let path = self.registry().get(id).await?.log_path;
                self.dispatcher
                    .apply_log_settings(id, LogSettings { enabled: false, path })
                    .await?;
            }
            Input::Byte(value) => self.dispatcher.transmit_byte(id, value).await?,
            Input::Quit => return Ok(false),
        }
        Ok(true)
    }
}

/// Open one port and bridge it to stdin/stdout until `:quit`, EOF or link loss
pub async fn run(options: MonitorOptions, registry: ConnectionRegistry) -> Result<()> {
    let (events_tx, events_rx) = mpsc::channel(256);
    let dispatcher = Dispatcher::new(registry.clone(), Arc::new(SerialBackend::new(events_tx)));

    let id = registry
        .add_port(ConnectionParams {
            name: options.port.name.clone(),
            baud_rate: options.port.baud_rate.value(),
        })
        .await?;
    registry.set_port_settings(id, options.port.clone()).await?;
    if let Some(path) = &options.log_path {
        registry.set_log_file(id, path.clone()).await?;
        registry.set_log_enabled(id, true).await?;
    }

    let (lost_tx, mut lost_rx) = watch::channel(false);
    let events_task = tokio::spawn(forward_events(dispatcher.clone(), events_rx, lost_tx));

    dispatcher
        .open_link(id)
        .await
        .with_context(|| format!("Failed to open {}", options.port.name))?;
    eprintln!(
        "Connected to {} at {} baud. Type :quit to exit.",
        options.port.name, options.port.baud_rate
    );

    let mut session = Session {
        id,
        dispatcher: dispatcher.clone(),
        send_mode: options.send_mode,
        append_cr: options.append_cr,
        append_lf: options.append_lf,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                let input = match Input::parse(&line) {
                    Ok(input) => input,
                    Err(e) => {
                        eprintln!("error: {:#}", e);
                        continue;
                    }
                };
                match session.handle(input).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) if e.is_link_lost() => {
                        eprintln!("error: {}", e);
                        break;
                    }
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            changed = lost_rx.changed() => {
                if changed.is_err() || *lost_rx.borrow() {
                    warn!("Link to {} lost", options.port.name);
                    break;
                }
            }
        }
    }

    if let Err(e) = dispatcher.close_link(id).await {
        warn!("Close failed: {}", e);
    }
    registry.remove_port(id).await;
    events_task.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_data() {
        assert_eq!(Input::parse("AT+GMR").unwrap(), Input::Send("AT+GMR".to_string()));
        assert_eq!(Input::parse("").unwrap(), Input::Send(String::new()));
    }

    #[test]
    fn commands_are_parsed() {
        assert_eq!(Input::parse(":clear").unwrap(), Input::Clear);
        assert_eq!(Input::parse(":mode hex").unwrap(), Input::SendMode(SendMode::Hex));
        assert_eq!(
            Input::parse(":display Decimal").unwrap(),
            Input::Display(DisplayMode::Decimal)
        );
        assert_eq!(Input::parse(":size 4096").unwrap(), Input::Size(4096));
        assert_eq!(
            Input::parse(":log /tmp/rx.log").unwrap(),
            Input::Log("/tmp/rx.log".to_string())
        );
        assert_eq!(Input::parse(":nolog").unwrap(), Input::NoLog);
        assert_eq!(Input::parse(":byte 0x1b").unwrap(), Input::Byte(0x1b));
        assert_eq!(Input::parse(":byte 300").unwrap(), Input::Byte(300));
        assert_eq!(Input::parse(":quit").unwrap(), Input::Quit);
    }

    #[test]
    fn bad_commands_are_rejected() {
        assert!(Input::parse(":mode").is_err());
        assert!(Input::parse(":mode ansi").is_err());
        assert!(Input::parse(":size big").is_err());
        assert!(Input::parse(":byte zz").is_err());
        assert!(Input::parse(":bogus").is_err());
    }
}
