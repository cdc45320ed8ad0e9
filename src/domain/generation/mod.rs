//! Generation Context - 章节生成限界上下文
//!
//! 职责:
//! - 生成请求（第一章 / 根据选择续写）
//! - 流式事件模型
//! - 生成会话聚合与状态转换
//! - 进度调度与剩余时间估算

mod errors;
mod events;
mod progress;
mod request;
mod session;
mod value_objects;

pub use errors::{FailureKind, GenerationError, GenerationFailure};
pub use events::{ChapterPayload, Choice, GenerationEvent};
pub use progress::{
    estimate_remaining, format_duration_zh, GenerationStats, ProgressPolicy, PROGRESS_COMPLETE,
};
pub use request::{Continuation, GenerationKind, GenerationRequest};
pub use session::{EventOutcome, GenerationSession, GenerationStatus, Stage};
pub use value_objects::{ChapterId, GenerationId, StoryId};
pub(crate) use value_objects::string_or_number;
