use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::UdpSocket;
use std::time::Duration;

use log::info;

use crate::drivers::TransportError;

const MAX_DATAGRAM: usize = 65535;
const SERIAL_CHUNK: usize = 4096;

/// Something that yields raw sample packets on demand.
///
/// `Ok(None)` means nothing arrived before the source's own timeout; callers poll again.
pub trait PacketSource: Send {
    fn next_packet(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<Vec<u8>>,
}

impl ManualSource {
    pub fn new(packets: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            queue: packets.into_iter().collect(),
        }
    }
}

impl PacketSource for ManualSource {
    fn next_packet(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.queue.pop_front())
    }
}

/// One datagram per packet.
pub struct UdpSource {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl UdpSource {
    pub fn bind(ip: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((ip, port))?;
        socket.set_read_timeout(Some(timeout))?;
        info!("Listening for UDP packets on {ip}:{port}");
        Ok(Self {
            socket,
            buffer: vec![0; MAX_DATAGRAM],
        })
    }
}

impl PacketSource for UdpSource {
    fn next_packet(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((len, _)) => Ok(Some(self.buffer[..len].to_vec())),
            Err(err) if is_timeout(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Serial byte stream cut into packets of whole frames.
///
/// Bytes of a partially received frame are held back until the rest arrives.
pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
    frame_bytes: usize,
    pending: Vec<u8>,
}

impl SerialSource {
    pub fn open(path: &str, baud_rate: u32, frame_bytes: usize, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
        info!("Opened serial source {path} at {baud_rate} baud");
        Ok(Self {
            port,
            frame_bytes: frame_bytes.max(1),
            pending: Vec::with_capacity(SERIAL_CHUNK),
        })
    }
}

impl PacketSource for SerialSource {
    fn next_packet(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut chunk = [0u8; SERIAL_CHUNK];
        let read = match self.port.read(&mut chunk) {
            Ok(read) => read,
            Err(err) if is_timeout(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        self.pending.extend_from_slice(&chunk[..read]);
        let whole = self.pending.len() - self.pending.len() % self.frame_bytes;
        if whole == 0 {
            return Ok(None);
        }
        let rest = self.pending.split_off(whole);
        Ok(Some(std::mem::replace(&mut self.pending, rest)))
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_source_drains_in_order() {
        let mut source = ManualSource::new(vec![vec![1u8], vec![2, 3]]);
        assert_eq!(source.next_packet().unwrap(), Some(vec![1]));
        assert_eq!(source.next_packet().unwrap(), Some(vec![2, 3]));
        assert_eq!(source.next_packet().unwrap(), None);
    }

    #[test]
    fn udp_source_receives_datagrams_and_times_out() {
        let mut source = UdpSource::bind("127.0.0.1", 0, Duration::from_millis(50)).unwrap();
        let addr = source.socket.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[9, 8, 7], addr).unwrap();
        assert_eq!(source.next_packet().unwrap(), Some(vec![9, 8, 7]));
        assert_eq!(source.next_packet().unwrap(), None);
    }
}
