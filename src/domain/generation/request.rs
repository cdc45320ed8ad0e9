//! Generation Context - Request

use serde::{Deserialize, Serialize};

use super::{ChapterId, GenerationError, StoryId};

/// 续写所需的上下文：上一章与读者的选择
///
/// 不变量:
/// - 三个字段都必须非空（`choice_index = 0` 是合法值）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    previous_chapter_id: ChapterId,
    choice_index: u32,
    choice_text: String,
}

impl Continuation {
    pub fn new(
        previous_chapter_id: &str,
        choice_index: Option<u32>,
        choice_text: &str,
    ) -> Result<Self, GenerationError> {
        let previous_chapter_id = ChapterId::new(previous_chapter_id)
            .map_err(|_| GenerationError::invalid_argument("上一章节ID不能为空"))?;
        let choice_index =
            choice_index.ok_or_else(|| GenerationError::invalid_argument("选择索引不能为空"))?;
        if choice_text.trim().is_empty() {
            return Err(GenerationError::invalid_argument("选择文本不能为空"));
        }

        Ok(Self {
            previous_chapter_id,
            choice_index,
            choice_text: choice_text.to_string(),
        })
    }

    pub fn previous_chapter_id(&self) -> &ChapterId {
        &self.previous_chapter_id
    }

    pub fn choice_index(&self) -> u32 {
        self.choice_index
    }

    pub fn choice_text(&self) -> &str {
        &self.choice_text
    }
}

/// 生成类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationKind {
    /// 生成第一章
    First,
    /// 根据选择续写下一章
    Continue(Continuation),
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Continue(_) => "continue",
        }
    }
}

/// 一次生成尝试的输入（不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    story_id: StoryId,
    kind: GenerationKind,
}

impl GenerationRequest {
    /// 生成第一章
    pub fn first(story_id: &str) -> Result<Self, GenerationError> {
        Ok(Self {
            story_id: parse_story_id(story_id)?,
            kind: GenerationKind::First,
        })
    }

    /// 根据选择续写
    ///
    /// `choice_index` 为 `None` 表示调用方没有提供索引，`Some(0)` 是合法的第一个选项。
    pub fn continuation(
        story_id: &str,
        previous_chapter_id: &str,
        choice_index: Option<u32>,
        choice_text: &str,
    ) -> Result<Self, GenerationError> {
        let story_id = parse_story_id(story_id)?;
        let continuation = Continuation::new(previous_chapter_id, choice_index, choice_text)?;
        Ok(Self {
            story_id,
            kind: GenerationKind::Continue(continuation),
        })
    }

    pub fn story_id(&self) -> &StoryId {
        &self.story_id
    }

    pub fn kind(&self) -> &GenerationKind {
        &self.kind
    }

    pub fn continuation_context(&self) -> Option<&Continuation> {
        match &self.kind {
            GenerationKind::First => None,
            GenerationKind::Continue(continuation) => Some(continuation),
        }
    }
}

fn parse_story_id(story_id: &str) -> Result<StoryId, GenerationError> {
    StoryId::new(story_id).map_err(GenerationError::invalid_argument)
}
