//! InkFlow 后端的 SSE 线格式
//!
//! 请求体:
//! `{"type":"first"}` 或
//! `{"type":"continue","previous_chapter_id":"..","choice_index":0,"choice_text":".."}`
//!
//! 每个 `data:` 行是带 `type` 判别字段的 JSON 对象。
//!
//! 非流式接口返回整章 JSON，可能包在 `{"data": ...}` 中，
//! 章节字段可以位于 `chapter` 下，也可以直接位于顶层。

use serde::{Deserialize, Serialize};

use crate::application::ports::TransportError;
use crate::domain::generation::{
    ChapterId, ChapterPayload, Choice, GenerationEvent, GenerationKind, GenerationRequest,
};

/// 后端在 error 事件缺少消息时的默认文案
const DEFAULT_ERROR_MESSAGE: &str = "生成章节时发生错误";

/// 生成请求体 (JSON)
#[derive(Debug, Serialize)]
pub struct GenerateChapterBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_chapter_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    choice_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    choice_text: Option<&'a str>,
}

impl<'a> From<&'a GenerationRequest> for GenerateChapterBody<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        match request.kind() {
            GenerationKind::First => Self {
                kind: "first",
                previous_chapter_id: None,
                choice_index: None,
                choice_text: None,
            },
            GenerationKind::Continue(continuation) => Self {
                kind: "continue",
                previous_chapter_id: Some(continuation.previous_chapter_id().as_str()),
                choice_index: Some(continuation.choice_index()),
                choice_text: Some(continuation.choice_text()),
            },
        }
    }
}

/// 生成流端点路径
pub fn stream_path(request: &GenerationRequest) -> String {
    format!("/stories/{}/chapters/generate/stream", request.story_id())
}

/// 非流式生成端点路径
pub fn generation_path(request: &GenerationRequest) -> String {
    format!("/stories/{}/chapters/generate", request.story_id())
}

/// 非流式生成的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedChapter {
    pub chapter: ChapterPayload,
    pub choices: Vec<Choice>,
}

/// SSE data 负载
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamPayload {
    Start {
        #[serde(default)]
        chapter_id: Option<ChapterId>,
    },
    Title {
        #[serde(default)]
        chapter_id: Option<ChapterId>,
        #[serde(default)]
        title: String,
    },
    Content {
        #[serde(default)]
        chapter_id: Option<ChapterId>,
        #[serde(default)]
        content: String,
        #[serde(default)]
        is_complete: bool,
    },
    Complete {
        #[serde(default)]
        chapter_id: Option<ChapterId>,
        #[serde(default)]
        chapter: Option<ChapterPayload>,
        #[serde(default)]
        choices: Option<Vec<Choice>>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl StreamPayload {
    fn into_event(self) -> Option<GenerationEvent> {
        let event = match self {
            Self::Start { chapter_id } => GenerationEvent::Start { chapter_id },
            Self::Title { chapter_id, title } => GenerationEvent::Title { chapter_id, title },
            Self::Content {
                chapter_id,
                content,
                is_complete,
            } => GenerationEvent::Content {
                chapter_id,
                text: content,
                is_final: is_complete,
            },
            Self::Complete {
                chapter_id,
                chapter,
                choices,
            } => {
                let mut chapter = chapter.unwrap_or_default();
                if chapter.id.is_none() {
                    chapter.id = chapter_id;
                }
                GenerationEvent::Complete {
                    chapter,
                    choices: choices.unwrap_or_default(),
                }
            }
            Self::Error { error } => GenerationEvent::Error {
                message: error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
            },
            Self::Unknown => return None,
        };
        Some(event)
    }
}

/// 解码一个 SSE 事件
///
/// `event_name` 是 SSE 的 `event:` 字段；当 JSON 没有 `type` 字段时用它补齐。
/// 返回 `Ok(None)` 表示该事件应被跳过（空数据、`[DONE]`、未知类型）。
pub fn decode_event(event_name: &str, data: &str) -> Result<Option<GenerationEvent>, TransportError> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let mut value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| TransportError::InvalidPayload(format!("{}: {}", e, data)))?;

    if let Some(object) = value.as_object_mut() {
        if !object.contains_key("type") && !event_name.is_empty() && event_name != "message" {
            object.insert(
                "type".to_string(),
                serde_json::Value::String(event_name.to_string()),
            );
        }
    }

    let payload: StreamPayload = serde_json::from_value(value)
        .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;

    let event = payload.into_event();
    if event.is_none() {
        tracing::warn!(event = %event_name, data = %data, "Unknown SSE event type, skipping");
    }
    Ok(event)
}

fn invalid_payload(error: serde_json::Error, body: &str) -> TransportError {
    TransportError::InvalidPayload(format!("{}: {}", error, body))
}

/// 解码非流式生成接口的响应体
pub fn decode_generated_chapter(body: &str) -> Result<GeneratedChapter, TransportError> {
    let mut value: serde_json::Value =
        serde_json::from_str(body.trim()).map_err(|e| invalid_payload(e, body))?;

    let data = value
        .get_mut("data")
        .filter(|data| data.is_object())
        .map(serde_json::Value::take);
    let mut value = data.unwrap_or(value);

    let Some(object) = value.as_object_mut() else {
        return Err(TransportError::InvalidPayload(format!(
            "expected a chapter object: {}",
            body
        )));
    };

    let chapter_id = object.remove("chapter_id");
    let choices = object.remove("choices");
    let nested = object.remove("chapter").filter(|chapter| !chapter.is_null());

    let mut chapter: ChapterPayload = serde_json::from_value(nested.unwrap_or(value))
        .map_err(|e| invalid_payload(e, body))?;
    if chapter.id.is_none() {
        chapter.id = match chapter_id {
            Some(id) if !id.is_null() => {
                Some(serde_json::from_value(id).map_err(|e| invalid_payload(e, body))?)
            }
            _ => None,
        };
    }

    let choices = match choices {
        Some(choices) if !choices.is_null() => {
            serde_json::from_value(choices).map_err(|e| invalid_payload(e, body))?
        }
        _ => Vec::new(),
    };

    Ok(GeneratedChapter { chapter, choices })
}
