//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

use crate::application::generation::GenerationFacadeConfig;
use crate::domain::generation::ProgressPolicy;
use crate::infrastructure::adapters::SseTransportConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 后端 API 配置
    #[serde(default)]
    pub api: ApiConfig,

    /// 章节生成配置
    #[serde(default)]
    pub generation: GenerationConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 后端 API 配置
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API 基础 URL（包含 `/api` 前缀）
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// 建立连接的超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// 流中两个事件之间的最长间隔（秒）
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// 非流式生成请求的超时时间（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// 访问令牌
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:20001/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    120
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            request_timeout_secs: default_request_timeout(),
            auth_token: None,
        }
    }
}

impl ApiConfig {
    /// 转换为 SSE 传输配置
    pub fn transport_config(&self) -> SseTransportConfig {
        SseTransportConfig {
            base_url: self.base_url.clone(),
            connect_timeout_secs: self.timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
            request_timeout_secs: self.request_timeout_secs,
            auth_token: self.auth_token.clone(),
        }
    }
}

/// 章节生成配置
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// 单次生成的最长时间（秒）
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,

    /// 单章预计耗时（秒），用于剩余时间估算
    #[serde(default = "default_estimated")]
    pub estimated_secs: u64,

    /// 进度检查点
    #[serde(default)]
    pub progress: ProgressConfig,
}

fn default_max_duration() -> u64 {
    300 // 5 分钟
}

fn default_estimated() -> u64 {
    30
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: default_max_duration(),
            estimated_secs: default_estimated(),
            progress: ProgressConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// 转换为 Facade 配置
    pub fn facade_config(&self) -> GenerationFacadeConfig {
        GenerationFacadeConfig {
            progress: self.progress.policy(),
            max_duration: Duration::from_secs(self.max_duration_secs),
            estimated_duration: Duration::from_secs(self.estimated_secs),
        }
    }
}

/// 进度检查点配置（百分比）
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_started")]
    pub started: u8,

    #[serde(default = "default_title")]
    pub title: u8,

    #[serde(default = "default_content_step")]
    pub content_step: u8,

    #[serde(default = "default_content_ceiling")]
    pub content_ceiling: u8,
}

fn default_started() -> u8 {
    10
}

fn default_title() -> u8 {
    30
}

fn default_content_step() -> u8 {
    5
}

fn default_content_ceiling() -> u8 {
    70
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            started: default_started(),
            title: default_title(),
            content_step: default_content_step(),
            content_ceiling: default_content_ceiling(),
        }
    }
}

impl ProgressConfig {
    pub fn policy(&self) -> ProgressPolicy {
        ProgressPolicy {
            started: self.started,
            title: self.title,
            content_step: self.content_step,
            content_ceiling: self.content_ceiling,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
