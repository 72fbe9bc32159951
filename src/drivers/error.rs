use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("packet decoder needs at least one channel")]
    NoChannels,
    #[error("decoded packet has inconsistent shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
