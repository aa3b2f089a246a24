//! Startup shared by both binaries

use color_eyre::Result;
use std::io::BufRead;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::AppConfig;
use crate::mqtt::{ConnectionState, MqttConfig, MqttError, MqttHandle, MqttHandler, MqttMessage};

/// Upper bound for finishing outstanding publishes on quit
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

/// Filter from `RUST_LOG`, `info` when unset or unparsable
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

// stdout is the console surface, logs go to stderr
fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Console line announcing a connection state change
pub fn connection_banner(state: ConnectionState, broker: &str) -> Option<String> {
    match state {
        ConnectionState::Connected => Some(format!("Connected to broker {}", broker)),
        ConnectionState::Failed => Some(format!("Connection to broker {} failed", broker)),
        ConnectionState::Disconnected => None,
    }
}

/// Prints a banner on every connection state change until the event loop
/// goes away
pub fn spawn_connection_banner(
    mut state: watch::Receiver<ConnectionState>,
    broker: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            if let Some(banner) = connection_banner(current, &broker) {
                println!("{}", banner);
            }
        }
    })
}

/// A running broker session
pub struct Session {
    pub handle: MqttHandle,
    pub messages: mpsc::Receiver<MqttMessage>,
    pub event_loop: JoinHandle<Result<(), MqttError>>,
}

impl Session {
    /// Spawns the event loop and subscribes to the sensor topics
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let mqtt_config = MqttConfig::from_app_config(config);
        let (handle, handler) = MqttHandler::new(&mqtt_config);
        let (msg_tx, messages) = mpsc::channel(mqtt_config.channel_capacity);

        let event_loop = tokio::spawn(handler.run(msg_tx));
        spawn_connection_banner(
            handle.state(),
            format!("{}:{}", mqtt_config.host, mqtt_config.port),
        );

        if let Err(e) = handle.subscribe_all().await {
            // requests only fail once the event loop is gone; its error is
            // the actual cause
            debug!("Subscribe failed: {}", e);
            event_loop.await??;
            return Err(e.into());
        }

        Ok(Self {
            handle,
            messages,
            event_loop,
        })
    }

    /// Waits for the event loop and surfaces its connection error, if any
    pub async fn finish(self) -> Result<()> {
        drop(self.messages);
        self.event_loop.await??;
        Ok(())
    }

    /// Lets the event loop complete queued publishes, disconnect and stop.
    /// Messages arriving meanwhile are discarded.
    pub async fn shutdown(self) -> Result<()> {
        let Session {
            handle,
            mut messages,
            mut event_loop,
        } = self;
        handle.request_shutdown();

        let drain = async {
            loop {
                tokio::select! {
                    res = &mut event_loop => return res,
                    Some(msg) = messages.recv() => {
                        debug!("Discarding message on {} during shutdown", msg.topic);
                    }
                }
            }
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await {
            Ok(res) => {
                res??;
                Ok(())
            }
            Err(_) => {
                warn!("Event loop did not stop within {:?}", SHUTDOWN_TIMEOUT);
                Ok(())
            }
        }
    }
}

/// Reads stdin lines on a dedicated thread. Blocking stdin must not sit on
/// the runtime, and the thread is simply abandoned on exit.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        debug!("Input receiver dropped");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
        info!("Stdin reader finished");
    });
    rx
}
