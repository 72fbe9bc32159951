// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod buffer;
pub mod codec;
pub mod communicator;
pub mod error;
pub mod receiver;
pub mod source;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::SampleRing;
pub use codec::PacketDecoder;
pub use communicator::{Communicator, MessageFramer, SerialCommunicator};
pub use error::TransportError;
pub use receiver::spawn_receiver;
pub use source::{ManualSource, PacketSource, SerialSource, UdpSource};
