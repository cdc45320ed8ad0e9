//! 派生视图状态
//!
//! 展示层读取的只读标志，全部由 [`GenerationSession`] 纯函数计算。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::domain::generation::{
    estimate_remaining, format_duration_zh, GenerationSession, GenerationStats, GenerationStatus,
    Stage,
};

/// 生成过程的派生视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationView {
    pub progress_percentage: u8,
    pub stage: Stage,
    pub message: String,
    pub error: Option<String>,
    pub has_error: bool,
    pub is_idle: bool,
    pub is_starting: bool,
    pub is_generating_title: bool,
    pub is_generating_content: bool,
    pub is_generating: bool,
    pub is_complete: bool,
    pub can_generate: bool,
    pub has_content: bool,
    pub has_title: bool,
    pub has_choices: bool,
}

impl GenerationView {
    pub fn from_session(session: &GenerationSession) -> Self {
        let stage = session.stage();
        let is_generating = session.status().is_active();
        let has_error = session.error().is_some();

        Self {
            progress_percentage: session.progress_percent(),
            stage,
            message: session.message().to_string(),
            error: session.error().map(|e| e.message.clone()),
            has_error,
            is_idle: stage == Stage::Idle,
            is_starting: stage == Stage::Starting,
            is_generating_title: stage == Stage::Title,
            is_generating_content: stage == Stage::Content,
            is_generating,
            is_complete: session.status() == GenerationStatus::Complete,
            can_generate: !is_generating && !has_error,
            has_content: !session.content().is_empty(),
            has_title: !session.title().is_empty(),
            has_choices: !session.choices().is_empty(),
        }
    }
}

impl From<&GenerationSession> for GenerationView {
    fn from(session: &GenerationSession) -> Self {
        Self::from_session(session)
    }
}

/// 计算生成统计
///
/// 未在生成时剩余时间为 0。
pub fn generation_stats(
    session: &GenerationSession,
    estimated_total: Duration,
    now: DateTime<Utc>,
) -> GenerationStats {
    let is_generating = session.status().is_active();
    let elapsed_secs = session
        .started_at()
        .map(|started| (now - started).num_seconds().max(0) as u64)
        .unwrap_or(0);
    let remaining_secs = if is_generating {
        estimate_remaining(estimated_total, session.progress_percent()).as_secs()
    } else {
        0
    };

    GenerationStats {
        progress: session.progress_percent(),
        is_generating,
        elapsed_secs,
        remaining_secs,
        formatted_remaining: format_duration_zh(remaining_secs),
    }
}
