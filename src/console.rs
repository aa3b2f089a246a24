//! Console surface of both programs
//!
//! Received messages are written to the output sink as
//! `Message received: <payload>`. In the interactive program every line read
//! from stdin is turned into an [`InputCommand`]:
//!
//! | input            | action                                   |
//! |------------------|------------------------------------------|
//! | space + Enter    | toggle the LED and publish `ON` / `OFF`  |
//! | Enter            | prompt for a cycle time and publish it   |
//! | `q` + Enter      | quit                                     |

use std::io::Write;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TopicConfig;
use crate::control::{CycleTime, LedState};
use crate::mqtt::mqtt_handler::Publisher;
use crate::mqtt::{MqttError, MqttMessage};

pub const BANNER: &str = "Hello MQTT World! Now listening to messages.";
pub const CYCLE_TIME_PROMPT: &str = "Enter cycle time in ms (2000 < t < 60000):";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Console output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Mqtt(#[from] MqttError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    ToggleLed,
    PromptCycleTime,
    Quit,
    Unknown(String),
}

impl InputCommand {
    pub fn from_line(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return InputCommand::PromptCycleTime;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return InputCommand::ToggleLed;
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "led" => InputCommand::ToggleLed,
            "q" | "quit" => InputCommand::Quit,
            _ => InputCommand::Unknown(trimmed.to_string()),
        }
    }
}

/// Why the interactive console returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    InputClosed,
    /// The event loop ended; its result carries the reason
    StreamClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop(StopReason),
}

pub fn print_message<W: Write>(out: &mut W, msg: &MqttMessage) -> std::io::Result<()> {
    writeln!(out, "{}", msg.render())?;
    out.flush()
}

/// Prints every received message until the stream ends
pub async fn run_subscriber<W: Write>(
    messages: &mut mpsc::Receiver<MqttMessage>,
    out: &mut W,
) -> Result<(), ConsoleError> {
    while let Some(msg) = messages.recv().await {
        print_message(out, &msg)?;
    }
    info!("Message stream closed");
    Ok(())
}

/// Interactive console. Owns the publisher, the LED state and the output
/// sink; nothing here is global.
pub struct Console<P, W> {
    publisher: P,
    led: LedState,
    topics: TopicConfig,
    out: W,
}

impl<P: Publisher, W: Write> Console<P, W> {
    pub fn new(publisher: P, led: LedState, topics: TopicConfig, out: W) -> Self {
        Self {
            publisher,
            led,
            topics,
            out,
        }
    }

    pub fn led(&self) -> &LedState {
        &self.led
    }

    pub fn print_help(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "Press <Space> then <Enter> to toggle the LED.")?;
        writeln!(self.out, "Press <Enter> to set the cycle time.")?;
        writeln!(self.out, "Type 'q' then <Enter> to quit.")?;
        self.out.flush()
    }

    /// Runs until input ends, the operator quits or the message stream
    /// closes (which happens when the connection fails).
    pub async fn run(
        &mut self,
        input: &mut mpsc::Receiver<String>,
        messages: &mut mpsc::Receiver<MqttMessage>,
    ) -> Result<StopReason, ConsoleError> {
        loop {
            tokio::select! {
                msg = messages.recv() => match msg {
                    Some(msg) => print_message(&mut self.out, &msg)?,
                    None => {
                        info!("Message stream closed");
                        return Ok(StopReason::StreamClosed);
                    }
                },
                line = input.recv() => match line {
                    Some(line) => {
                        let command = InputCommand::from_line(&line);
                        if let Flow::Stop(reason) =
                            self.handle_command(command, input, messages).await?
                        {
                            return Ok(reason);
                        }
                    }
                    None => {
                        info!("Input closed");
                        return Ok(StopReason::InputClosed);
                    }
                },
            }
        }
    }

    /// Executes one command. The cycle time prompt consumes the next line
    /// from `input` and keeps printing `messages` while it waits.
    pub async fn handle_command(
        &mut self,
        command: InputCommand,
        input: &mut mpsc::Receiver<String>,
        messages: &mut mpsc::Receiver<MqttMessage>,
    ) -> Result<Flow, ConsoleError> {
        debug!("Handling {:?}", command);
        match command {
            InputCommand::ToggleLed => {
                self.toggle_led().await?;
            }
            InputCommand::PromptCycleTime => {
                writeln!(self.out, "{}", CYCLE_TIME_PROMPT)?;
                self.out.flush()?;
                return self.read_cycle_time(input, messages).await;
            }
            InputCommand::Quit => return Ok(Flow::Stop(StopReason::Quit)),
            InputCommand::Unknown(text) => {
                writeln!(self.out, "Unknown command '{}'", text)?;
                self.print_help()?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn read_cycle_time(
        &mut self,
        input: &mut mpsc::Receiver<String>,
        messages: &mut mpsc::Receiver<MqttMessage>,
    ) -> Result<Flow, ConsoleError> {
        loop {
            tokio::select! {
                line = input.recv() => match line {
                    Some(line) => {
                        self.submit_cycle_time(&line).await?;
                        return Ok(Flow::Continue);
                    }
                    None => return Ok(Flow::Stop(StopReason::InputClosed)),
                },
                msg = messages.recv() => match msg {
                    Some(msg) => print_message(&mut self.out, &msg)?,
                    None => return Ok(Flow::Stop(StopReason::StreamClosed)),
                },
            }
        }
    }

    pub async fn toggle_led(&mut self) -> Result<(), ConsoleError> {
        self.led.toggle();
        let payload = self.led.payload();
        writeln!(
            self.out,
            "Sending \"{}\" to topic '{}'",
            payload, self.topics.led_state
        )?;
        self.out.flush()?;
        self.publisher
            .publish_text(&self.topics.led_state, payload)
            .await?;
        Ok(())
    }

    /// Validates the operator's text and publishes it when accepted.
    /// Rejected input is reported on the console and publishes nothing.
    pub async fn submit_cycle_time(&mut self, text: &str) -> Result<Option<CycleTime>, ConsoleError> {
        let cycle = match CycleTime::parse(text) {
            Ok(cycle) => cycle,
            Err(e) => {
                warn!("Cycle time input rejected: {}", e);
                writeln!(self.out, "{}", e)?;
                self.out.flush()?;
                return Ok(None);
            }
        };

        writeln!(
            self.out,
            "Sending \"{}\" to topic '{}'",
            cycle.payload(),
            self.topics.cycle_time
        )?;
        self.out.flush()?;
        self.publisher
            .publish_text(&self.topics.cycle_time, &cycle.payload())
            .await?;
        Ok(Some(cycle))
    }
}
