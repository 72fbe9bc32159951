use log::warn;
use ndarray::Array2;

use crate::drivers::TransportError;

const VALUE_BYTES: usize = 8;

/// Decodes packets of little-endian `f64` values into `[rows, n_channels]` rows.
///
/// `n_channels` counts every column, timestamp included. Trailing bytes that do
/// not fill a whole row are dropped with a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketDecoder {
    n_channels: usize,
}

impl PacketDecoder {
    pub fn new(n_channels: usize) -> Result<Self, TransportError> {
        if n_channels == 0 {
            return Err(TransportError::NoChannels);
        }
        Ok(Self { n_channels })
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn decode(&self, packet: &[u8]) -> Result<Array2<f64>, TransportError> {
        let row_bytes = VALUE_BYTES * self.n_channels;
        let excess = packet.len() % row_bytes;
        if excess != 0 {
            warn!(
                "{} bytes (excess {excess}); truncating.",
                packet.len()
            );
        }
        let usable = &packet[..packet.len() - excess];
        let values: Vec<f64> = usable
            .chunks_exact(VALUE_BYTES)
            .map(|chunk| {
                let mut bytes = [0u8; VALUE_BYTES];
                bytes.copy_from_slice(chunk);
                f64::from_le_bytes(bytes)
            })
            .collect();
        let rows = values.len() / self.n_channels;
        Ok(Array2::from_shape_vec((rows, self.n_channels), values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn encode(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_rows_in_order() {
        let decoder = PacketDecoder::new(3).unwrap();
        let rows = decoder
            .decode(&encode(&[1.0, 2.0, 0.5, 3.0, 4.0, 1.5]))
            .unwrap();
        assert_eq!(rows, array![[1.0, 2.0, 0.5], [3.0, 4.0, 1.5]]);
    }

    #[test]
    fn truncates_partial_rows() {
        let decoder = PacketDecoder::new(2).unwrap();
        let mut packet = encode(&[1.0, 0.1, 2.0]);
        packet.extend([0xAA, 0xBB, 0xCC]);
        let rows = decoder.decode(&packet).unwrap();
        assert_eq!(rows, array![[1.0, 0.1]]);
    }

    #[test]
    fn short_packets_yield_no_rows() {
        let decoder = PacketDecoder::new(5).unwrap();
        assert_eq!(decoder.decode(&[1, 2, 3]).unwrap().dim(), (0, 5));
        assert_eq!(decoder.decode(&[]).unwrap().dim(), (0, 5));
        assert!(matches!(PacketDecoder::new(0), Err(TransportError::NoChannels)));
    }
}
