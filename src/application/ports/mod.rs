//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod stream_transport;

pub use stream_transport::{StreamHandle, StreamItem, StreamTransportPort, TransportError};
