//! Stream Transport Port - 章节生成流抽象
//!
//! 定义服务端推送流的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::generation::{GenerationEvent, GenerationFailure, GenerationRequest};

/// 传输层错误
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<TransportError> for GenerationFailure {
    fn from(err: TransportError) -> Self {
        let message = match err {
            TransportError::NetworkError(e) => format!("连接服务器失败: {}", e),
            TransportError::Timeout => "连接服务器超时".to_string(),
            TransportError::ServiceError(e) => format!("服务器错误: {}", e),
            TransportError::InvalidPayload(e) => format!("解析服务器响应失败: {}", e),
        };
        GenerationFailure::connection(message)
    }
}

/// 流中的单个条目
pub type StreamItem = Result<GenerationEvent, TransportError>;

/// 一次打开的生成流
///
/// 事件按传输顺序到达；`None` 表示对端关闭了流。
/// 句柄被丢弃时会关闭底层连接。
pub struct StreamHandle {
    events: mpsc::Receiver<StreamItem>,
    closer: CancellationToken,
}

impl StreamHandle {
    pub fn new(events: mpsc::Receiver<StreamItem>, closer: CancellationToken) -> Self {
        Self { events, closer }
    }

    /// 接收下一个事件
    pub async fn next_event(&mut self) -> Option<StreamItem> {
        self.events.recv().await
    }

    /// 关闭连接
    pub fn close(&self) {
        self.closer.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// 关闭令牌（可在其它任务中取消此流）
    pub fn closer(&self) -> CancellationToken {
        self.closer.clone()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.closer.cancel();
    }
}

/// Stream Transport Port
///
/// 章节生成后端的抽象接口
#[async_trait]
pub trait StreamTransportPort: Send + Sync {
    /// 为请求打开一个生成流
    async fn open(&self, request: &GenerationRequest) -> Result<StreamHandle, TransportError>;

    /// 检查后端是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
