use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use log::{info, warn};

use crate::drivers::TransportError;

/// Outbound channel for predicted labels.
pub trait Communicator: Send {
    fn is_active(&self) -> bool;

    fn open(&mut self) -> Result<(), TransportError>;

    fn close(&mut self);

    /// Queues one message; silently dropped (with a single warning) while closed.
    fn send(&mut self, message: &str) -> Result<(), TransportError>;
}

/// Maps messages and groups them into newline-terminated chunks.
#[derive(Clone, Debug, Default)]
pub struct MessageFramer {
    chunk_size: usize,
    mapping: HashMap<String, String>,
    pending: Vec<String>,
}

impl MessageFramer {
    pub fn new(chunk_size: usize, mapping: HashMap<String, String>) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            mapping,
            pending: Vec::new(),
        }
    }

    /// Returns the bytes to write once `chunk_size` messages are queued.
    pub fn push(&mut self, message: &str) -> Option<Vec<u8>> {
        let mapped = self
            .mapping
            .get(message)
            .cloned()
            .unwrap_or_else(|| message.to_owned());
        self.pending.push(mapped);
        if self.pending.len() < self.chunk_size {
            return None;
        }
        let mut out = self.pending.join("\n");
        out.push('\n');
        self.pending.clear();
        Some(out.into_bytes())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Writes predictions to a serial port.
pub struct SerialCommunicator {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    framer: MessageFramer,
    connection: Option<Box<dyn serialport::SerialPort>>,
    connection_warned: bool,
}

impl SerialCommunicator {
    pub fn new(
        port_name: impl Into<String>,
        baud_rate: u32,
        chunk_size: usize,
        message_mapping: HashMap<String, String>,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_secs(1),
            framer: MessageFramer::new(chunk_size, message_mapping),
            connection: None,
            connection_warned: false,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Communicator for SerialCommunicator {
    fn is_active(&self) -> bool {
        self.connection.is_some()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()?;
        self.connection = Some(port);
        info!(
            "Opened serial connection to {} at {} baud.",
            self.port_name, self.baud_rate
        );
        Ok(())
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            self.framer.clear();
            info!("Serial connection closed.");
        }
    }

    fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let Some(port) = self.connection.as_mut() else {
            if !self.connection_warned {
                warn!("Serial connection not open.");
                self.connection_warned = true;
            }
            return Ok(());
        };
        if self.connection_warned {
            info!("Serial connection restored.");
            self.connection_warned = false;
        }
        if let Some(bytes) = self.framer.push(message) {
            port.write_all(&bytes)?;
        }
        Ok(())
    }
}
