//! Generation Context - Value Objects

use serde::{Deserialize, Deserializer, Serialize};

/// 故事唯一标识（由后端分配，客户端视为不透明字符串）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(String);

impl StoryId {
    pub fn new(id: impl Into<String>) -> Result<Self, &'static str> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("故事ID不能为空");
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 章节唯一标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChapterId(String);

impl<'de> Deserialize<'de> for ChapterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        string_or_number(deserializer).map(Self)
    }
}

/// 后端可能以字符串或整数返回 ID，统一读取为字符串
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

impl ChapterId {
    pub fn new(id: impl Into<String>) -> Result<Self, &'static str> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("章节ID不能为空");
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 生成会话标识
///
/// 每次成功的 `start()` 分配一个新的、单调递增的值。
/// 事件按其所属会话的标识投递，标识不匹配的事件会被丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenerationId(u64);

impl GenerationId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for GenerationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_id_rejects_blank() {
        assert!(StoryId::new("").is_err());
        assert!(StoryId::new("   ").is_err());
        assert_eq!(StoryId::new("s1").unwrap().as_str(), "s1");
    }

    #[test]
    fn test_chapter_id_accepts_numbers() {
        let id: ChapterId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");
        let id: ChapterId = serde_json::from_str(r#""c-1""#).unwrap();
        assert_eq!(id.as_str(), "c-1");
    }

    #[test]
    fn test_generation_id_is_monotonic() {
        let first = GenerationId::from_raw(1);
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.to_string(), "gen-2");
    }
}
