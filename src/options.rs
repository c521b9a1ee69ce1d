//! 运行选项
//!
//! 从 YAML 文件加载配置通道和日志选项，文件不存在时使用默认值

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 选项加载错误
#[derive(Debug, Error)]
pub enum OptionsError {
    /// 文件读取错误
    #[error("选项读取错误: {0}")]
    Read(String),

    /// YAML 解析错误
    #[error("YAML 解析错误: {0}")]
    Parse(String),

    /// YAML 序列化错误
    #[error("YAML 序列化错误: {0}")]
    Serialize(String),

    /// 选项验证错误
    #[error("选项验证错误: {0}")]
    Validation(String),
}

/// 全部选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// 配置通道选项
    #[serde(default)]
    pub channel: ChannelOptions,
    /// 日志选项
    #[serde(default)]
    pub logging: LoggingOptions,
}

impl Options {
    /// 从文件加载，文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        if !path.exists() {
            tracing::debug!("[Options] {} 不存在，使用默认选项", path.display());
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| OptionsError::Read(e.to_string()))?;
        let options = Self::parse_yaml(&content)?;
        options.validate()?;
        Ok(options)
    }

    /// 从 YAML 字符串解析
    pub fn parse_yaml(yaml: &str) -> Result<Self, OptionsError> {
        serde_yaml::from_str(yaml).map_err(|e| OptionsError::Parse(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, OptionsError> {
        serde_yaml::to_string(self).map_err(|e| OptionsError::Serialize(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.channel.event_buffer == 0 {
            return Err(OptionsError::Validation(
                "channel.event_buffer 必须大于 0".to_string(),
            ));
        }
        if self.channel.host_queue == 0 {
            return Err(OptionsError::Validation(
                "channel.host_queue 必须大于 0".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(OptionsError::Validation(format!(
                "未知的日志级别: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 配置通道选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// 等待宿主确认更新的超时（毫秒），0 表示不限
    #[serde(default = "default_update_timeout_ms")]
    pub update_timeout_ms: u64,
    /// 事件广播通道容量
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// 发往宿主的请求队列长度
    #[serde(default = "default_host_queue")]
    pub host_queue: usize,
}

impl ChannelOptions {
    pub fn update_timeout(&self) -> Option<Duration> {
        (self.update_timeout_ms > 0).then(|| Duration::from_millis(self.update_timeout_ms))
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            update_timeout_ms: default_update_timeout_ms(),
            event_buffer: default_event_buffer(),
            host_queue: default_host_queue(),
        }
    }
}

fn default_update_timeout_ms() -> u64 {
    5000
}

fn default_event_buffer() -> usize {
    64
}

fn default_host_queue() -> usize {
    32
}

/// 日志选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingOptions {
    /// 是否启用日志
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            level: default_log_level(),
        }
    }
}

fn default_logging_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.channel.update_timeout_ms, 5000);
        assert_eq!(
            options.channel.update_timeout(),
            Some(Duration::from_millis(5000))
        );
        assert_eq!(options.channel.event_buffer, 64);
        assert_eq!(options.logging.level, "info");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let options = ChannelOptions {
            update_timeout_ms: 0,
            ..ChannelOptions::default()
        };
        assert_eq!(options.update_timeout(), None);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let options = Options::parse_yaml("channel:\n  update_timeout_ms: 250\n").unwrap();
        assert_eq!(options.channel.update_timeout_ms, 250);
        assert_eq!(options.channel.host_queue, 32);
        assert_eq!(options.logging, LoggingOptions::default());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = Options::parse_yaml("channel: [").unwrap_err();
        assert!(matches!(err, OptionsError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut options = Options::default();
        options.channel.event_buffer = 0;
        assert!(matches!(options.validate(), Err(OptionsError::Validation(_))));

        let mut options = Options::default();
        options.logging.level = "verbose".to_string();
        let err = options.validate().unwrap_err();
        assert_eq!(err.to_string(), "选项验证错误: 未知的日志级别: verbose");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options::load(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: debug\nchannel:\n  event_buffer: 8").unwrap();

        let options = Options::load(file.path()).unwrap();
        assert_eq!(options.logging.level, "debug");
        assert_eq!(options.channel.event_buffer, 8);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let options = Options::default();
        let yaml = options.to_yaml().unwrap();
        assert_eq!(Options::parse_yaml(&yaml).unwrap(), options);
    }
}
