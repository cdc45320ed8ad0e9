//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（inkflow.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["inkflow", "inkflow.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "INKFLOW";

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `INKFLOW_`，层级分隔符 `__`）
/// 2. 配置文件（inkflow.toml 或 inkflow.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `INKFLOW_API__BASE_URL=http://story-server:20001/api`
/// - `INKFLOW_API__AUTH_TOKEN=...`
/// - `INKFLOW_GENERATION__MAX_DURATION_SECS=600`
/// - `INKFLOW_LOG__LEVEL=debug`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("api.base_url", "http://localhost:20001/api")?
        .set_default("api.timeout_secs", 30)?
        .set_default("api.idle_timeout_secs", 120)?
        .set_default("api.request_timeout_secs", 300)?
        .set_default("generation.max_duration_secs", 300)?
        .set_default("generation.estimated_secs", 30)?
        .set_default("generation.progress.started", 10)?
        .set_default("generation.progress.title", 30)?
        .set_default("generation.progress.content_step", 5)?
        .set_default("generation.progress.content_ceiling", 70)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 例如: INKFLOW_API__BASE_URL=http://story-server:20001/api
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let base_url = config.api.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "API base URL cannot be empty".to_string(),
        ));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "API base URL must start with http:// or https://, got {}",
            base_url
        )));
    }

    if config.api.timeout_secs == 0
        || config.api.idle_timeout_secs == 0
        || config.api.request_timeout_secs == 0
    {
        return Err(ConfigError::ValidationError(
            "API timeouts cannot be 0".to_string(),
        ));
    }

    if config.generation.max_duration_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Generation max duration cannot be 0".to_string(),
        ));
    }

    config
        .generation
        .progress
        .policy()
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("Invalid progress schedule: {}", e)))?;

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("API Base URL: {}", config.api.base_url);
    tracing::info!("API Timeout: {}s", config.api.timeout_secs);
    tracing::info!("Stream Idle Timeout: {}s", config.api.idle_timeout_secs);
    tracing::info!("Request Timeout: {}s", config.api.request_timeout_secs);
    tracing::info!(
        "Auth Token: {}",
        if config.api.auth_token.is_some() { "<redacted>" } else { "<none>" }
    );
    tracing::info!("Max Generation Duration: {}s", config.generation.max_duration_secs);
    tracing::info!("Estimated Duration: {}s", config.generation.estimated_secs);
    tracing::info!(
        "Progress Schedule: start={} title={} step={} ceiling={}",
        config.generation.progress.started,
        config.generation.progress.title,
        config.generation.progress.content_step,
        config.generation.progress.content_ceiling
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
