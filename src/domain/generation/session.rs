//! Generation Context - Session Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ChapterId, ChapterPayload, Choice, GenerationEvent, GenerationFailure, GenerationRequest,
    ProgressPolicy,
};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Starting,
    Title,
    Content,
    Complete,
    Failed,
}

impl GenerationStatus {
    /// 是否有正在进行的生成
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Title | Self::Content)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Idle => Stage::Idle,
            Self::Starting => Stage::Starting,
            Self::Title => Stage::Title,
            Self::Content => Stage::Content,
            Self::Complete => Stage::Complete,
            Self::Failed => Stage::Error,
        }
    }
}

/// 界面显示用的粗粒度阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Starting,
    Title,
    Content,
    Complete,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Title => "title",
            Self::Content => "content",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 应用一个事件后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// 会话已结束或尚未开始，事件被忽略
    Ignored,
    /// 会话已更新，仍在进行中
    Updated,
    /// 会话进入终态（Complete / Failed）
    Finished,
}

/// 生成会话聚合
///
/// 不变量:
/// - `error` 存在当且仅当 `status = Failed`
/// - 在进入 `Failed` 之前 `progress_percent` 单调不减，失败后冻结
/// - `choices` 只在 `Complete` 时填充
/// - 终态之后的事件一律忽略
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationSession {
    status: GenerationStatus,
    request: Option<GenerationRequest>,
    chapter_id: Option<ChapterId>,
    title: String,
    content: String,
    chapter: Option<ChapterPayload>,
    choices: Vec<Choice>,
    progress_percent: u8,
    message: String,
    started_at: Option<DateTime<Utc>>,
    error: Option<GenerationFailure>,
}

impl GenerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新的一次尝试，清空上一次的所有结果
    pub(crate) fn begin(&mut self, request: GenerationRequest, now: DateTime<Utc>) {
        *self = Self {
            status: GenerationStatus::Starting,
            request: Some(request),
            message: "准备生成章节...".to_string(),
            started_at: Some(now),
            ..Self::default()
        };
    }

    /// 应用一个传输事件
    pub(crate) fn apply(&mut self, event: GenerationEvent, policy: &ProgressPolicy) -> EventOutcome {
        if !self.status.is_active() {
            return EventOutcome::Ignored;
        }

        match event {
            GenerationEvent::Start { chapter_id } => {
                self.remember_chapter(chapter_id);
                self.progress_percent = policy.on_start(self.progress_percent);
                self.message = "开始生成章节...".to_string();
                EventOutcome::Updated
            }
            GenerationEvent::Title { chapter_id, title } => {
                self.remember_chapter(chapter_id);
                self.title = title;
                if self.status != GenerationStatus::Content {
                    self.status = GenerationStatus::Title;
                }
                self.progress_percent = policy.on_title(self.progress_percent);
                self.message = "标题生成完成，开始生成内容...".to_string();
                EventOutcome::Updated
            }
            GenerationEvent::Content {
                chapter_id,
                text,
                is_final,
            } => {
                self.remember_chapter(chapter_id);
                if is_final {
                    self.content = text;
                } else {
                    self.content.push_str(&text);
                }
                self.status = GenerationStatus::Content;
                self.progress_percent = policy.on_content(self.progress_percent);
                self.message = "正在生成内容...".to_string();
                EventOutcome::Updated
            }
            GenerationEvent::Complete { chapter, choices } => {
                if self.title.is_empty() {
                    if let Some(title) = &chapter.title {
                        self.title = title.clone();
                    }
                }
                if self.content.is_empty() {
                    if let Some(content) = &chapter.content {
                        self.content = content.clone();
                    }
                }
                if self.chapter_id.is_none() {
                    self.chapter_id = chapter.id.clone();
                }
                self.chapter = Some(chapter);
                self.choices = choices;
                self.status = GenerationStatus::Complete;
                self.progress_percent = policy.on_complete(self.progress_percent);
                self.message = "章节生成完成".to_string();
                EventOutcome::Finished
            }
            GenerationEvent::Error { message } => {
                self.fail(GenerationFailure::generation(message))
            }
        }
    }

    /// 以失败结束会话；进度保持不变
    pub(crate) fn fail(&mut self, failure: GenerationFailure) -> EventOutcome {
        if !self.status.is_active() {
            return EventOutcome::Ignored;
        }
        self.status = GenerationStatus::Failed;
        self.message = failure.message.clone();
        self.error = Some(failure);
        EventOutcome::Finished
    }

    /// 停止：回到 Idle，保留已收到的标题与正文
    pub(crate) fn halt(&mut self) {
        self.status = GenerationStatus::Idle;
        self.error = None;
        self.progress_percent = 0;
        self.message = "生成已停止".to_string();
    }

    /// 清除错误，Failed 会话回到 Idle
    pub(crate) fn clear_error(&mut self) {
        self.error = None;
        if self.status == GenerationStatus::Failed {
            self.status = GenerationStatus::Idle;
            self.progress_percent = 0;
            self.message.clear();
        }
    }

    /// 恢复为初始值
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    fn remember_chapter(&mut self, chapter_id: Option<ChapterId>) {
        if chapter_id.is_some() {
            self.chapter_id = chapter_id;
        }
    }

    // Getters
    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.status.stage()
    }

    pub fn request(&self) -> Option<&GenerationRequest> {
        self.request.as_ref()
    }

    pub fn chapter_id(&self) -> Option<&ChapterId> {
        self.chapter_id.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn chapter(&self) -> Option<&ChapterPayload> {
        self.chapter.as_ref()
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn error(&self) -> Option<&GenerationFailure> {
        self.error.as_ref()
    }
}
