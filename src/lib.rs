//! InkFlow - 互动小说章节生成客户端
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Generation Context: 生成请求、流事件、会话状态、进度策略
//!
//! 应用层 (application/):
//! - Ports: 端口定义（StreamTransport）
//! - Generation: 状态机、Facade、派生视图
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: SSE 传输（reqwest + eventsource-stream）、脚本化传输

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
