//! Generation Context - Errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 章节生成错误
///
/// `InvalidArgument` 与 `AlreadyGenerating` 由调用方直接收到；
/// 其余三类不会从 `start()` 返回，而是以 [`GenerationFailure`] 的形式
/// 落在会话快照上，需要时通过 `From<&GenerationFailure>` 转换。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    #[error("章节生成已在进行中")]
    AlreadyGenerating,

    #[error("连接错误: {0}")]
    Connection(String),

    #[error("生成失败: {0}")]
    Generation(String),

    #[error("{0}")]
    Timeout(String),
}

impl GenerationError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// 会话失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 传输层连接失败或中途断开
    Connection,
    /// 后端通过 error 事件报告失败
    Generation,
    /// 超过调用方设定的最长生成时间
    Timeout,
}

/// 记录在 `Failed` 会话上的失败信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl GenerationFailure {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Connection,
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Generation,
            message: message.into(),
        }
    }

    pub fn timeout(limit_secs: u64) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("生成超时（{}秒），请重试", limit_secs),
        }
    }
}

impl std::fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<&GenerationFailure> for GenerationError {
    fn from(failure: &GenerationFailure) -> Self {
        match failure.kind {
            FailureKind::Connection => Self::Connection(failure.message.clone()),
            FailureKind::Generation => Self::Generation(failure.message.clone()),
            FailureKind::Timeout => Self::Timeout(failure.message.clone()),
        }
    }
}
