//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（StreamTransport）
//! - generation: 章节生成状态机、Facade 与派生视图

pub mod generation;
pub mod ports;

// Re-exports
pub use generation::{
    generation_stats, Delivery, GenerationFacade, GenerationFacadeConfig, GenerationSnapshot,
    GenerationStateMachine, GenerationView,
};

pub use ports::{StreamHandle, StreamItem, StreamTransportPort, TransportError};
