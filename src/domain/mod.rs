//! Domain Layer - 领域层
//!
//! 包含一个限界上下文:
//! - Generation Context: 章节生成会话、事件与进度

pub mod generation;
