//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod scripted;
pub mod sse;

pub use scripted::*;
pub use sse::*;
