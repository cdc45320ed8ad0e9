//! Generation Context - Stream Events

use serde::{Deserialize, Serialize};

use super::{string_or_number, ChapterId};

/// 章节结尾提供给读者的选项
///
/// `id` 由后端分配，可能是整数或字符串（如 UUID），统一保存为字符串。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "content")]
    pub text: String,
}

impl Choice {
    pub fn new(id: impl ToString, text: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            text: text.into(),
        }
    }
}

/// 后端在 complete 事件中返回的最终章节
///
/// 字段全部可选，未知字段原样保存在 `extra` 中。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ChapterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// 传输层投递给状态机的单个事件
///
/// 事件是瞬时的：状态机消费后不会保留事件本身。
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// 后端开始生成
    Start { chapter_id: Option<ChapterId> },
    /// 章节标题
    Title {
        chapter_id: Option<ChapterId>,
        title: String,
    },
    /// 正文片段；`is_final` 为真时该文本即为完整正文
    Content {
        chapter_id: Option<ChapterId>,
        text: String,
        is_final: bool,
    },
    /// 生成完成
    Complete {
        chapter: ChapterPayload,
        choices: Vec<Choice>,
    },
    /// 后端报告的生成失败
    Error { message: String },
}

impl GenerationEvent {
    pub fn start() -> Self {
        Self::Start { chapter_id: None }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self::Title {
            chapter_id: None,
            title: title.into(),
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            chapter_id: None,
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_content(text: impl Into<String>) -> Self {
        Self::Content {
            chapter_id: None,
            text: text.into(),
            is_final: true,
        }
    }

    pub fn complete(chapter: ChapterPayload, choices: Vec<Choice>) -> Self {
        Self::Complete { chapter, choices }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// 事件类型名（日志用）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Title { .. } => "title",
            Self::Content { .. } => "content",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_payload_keeps_unknown_fields() {
        let payload: ChapterPayload = serde_json::from_str(
            r#"{"id":"c9","title":"夜色","chapter_number":3,"word_count":1200}"#,
        )
        .unwrap();

        assert_eq!(payload.id.as_ref().map(|id| id.as_str()), Some("c9"));
        assert_eq!(payload.title.as_deref(), Some("夜色"));
        assert!(payload.content.is_none());
        assert_eq!(payload.extra.get("chapter_number"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_choice_accepts_content_alias() {
        let choice: Choice = serde_json::from_str(r#"{"id":2,"content":"战斗"}"#).unwrap();
        assert_eq!(choice, Choice::new(2, "战斗"));
    }

    #[test]
    fn test_choice_accepts_string_ids() {
        let choices: Vec<Choice> = serde_json::from_str(
            r#"[{"id":"7f3c2a9e-1b4d-4e8a-9c6f-2d5e8b1a0c3f","text":"逃跑"},{"text":"战斗"}]"#,
        )
        .unwrap();

        assert_eq!(choices[0].id, "7f3c2a9e-1b4d-4e8a-9c6f-2d5e8b1a0c3f");
        assert_eq!(choices[1], Choice::new("", "战斗"));
    }
}
