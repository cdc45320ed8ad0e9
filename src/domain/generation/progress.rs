//! Generation Context - 进度与时间估算
//!
//! 进度百分比是给界面看的启发式信号，不是真实的完成比例。
//! 各检查点可以配置，但任何调度都必须单调不减。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 完成时的进度
pub const PROGRESS_COMPLETE: u8 = 100;

/// 进度调度策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPolicy {
    /// 收到 start 事件后的进度
    pub started: u8,
    /// 收到标题后的进度
    pub title: u8,
    /// 每个正文片段的增量
    pub content_step: u8,
    /// 正文阶段的进度上限
    pub content_ceiling: u8,
}

impl Default for ProgressPolicy {
    fn default() -> Self {
        Self {
            started: 10,
            title: 30,
            content_step: 5,
            content_ceiling: 70,
        }
    }
}

impl ProgressPolicy {
    /// 检查各检查点是否有序
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.started > self.title {
            return Err("started 进度不能大于 title 进度");
        }
        if self.title > self.content_ceiling {
            return Err("title 进度不能大于正文上限");
        }
        if self.content_ceiling >= PROGRESS_COMPLETE {
            return Err("正文上限必须小于 100");
        }
        if self.content_step == 0 {
            return Err("正文增量不能为 0");
        }
        Ok(())
    }

    pub fn on_start(&self, current: u8) -> u8 {
        current.max(self.started)
    }

    pub fn on_title(&self, current: u8) -> u8 {
        current.max(self.title)
    }

    pub fn on_content(&self, current: u8) -> u8 {
        let proposed = current
            .max(self.title)
            .saturating_add(self.content_step)
            .min(self.content_ceiling);
        current.max(proposed)
    }

    pub fn on_complete(&self, _current: u8) -> u8 {
        PROGRESS_COMPLETE
    }
}

/// 剩余时间估算
///
/// 进度为 0 时返回完整估算，否则按剩余比例缩放。
pub fn estimate_remaining(estimated_total: Duration, progress_percent: u8) -> Duration {
    let progress = progress_percent.min(PROGRESS_COMPLETE) as f64 / 100.0;
    if progress == 0.0 {
        return estimated_total;
    }
    let remaining = estimated_total.as_secs_f64() * (1.0 - progress);
    Duration::from_secs(remaining.max(0.0).round() as u64)
}

/// 格式化秒数: `45秒`、`2分5秒`
pub fn format_duration_zh(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{}秒", seconds);
    }
    format!("{}分{}秒", seconds / 60, seconds % 60)
}

/// 生成统计（展示用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub progress: u8,
    pub is_generating: bool,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub formatted_remaining: String,
}
