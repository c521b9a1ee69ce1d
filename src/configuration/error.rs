//! 配置通道错误类型
//!
//! ## 功能
//! - 读取时机错误（配置尚未就绪）
//! - 与宿主通信错误
//! - 类型化读取错误
//! - 序列化支持

use thiserror::Error;

/// 宿主通信错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// 与宿主的连接已断开
    #[error("宿主连接已断开")]
    Disconnected,

    /// 等待宿主确认超时
    #[error("等待宿主确认超时 ({0} ms)")]
    Timeout(u64),

    /// 宿主拒绝了更新请求
    #[error("宿主拒绝更新: {0}")]
    Rejected(String),
}

/// 配置通道错误类型
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// 尚未收到第一份配置快照
    #[error(
        "配置尚不可用：在宿主推送第一份配置快照之前无法读取配置。\
         请推迟调用 `get`（例如先等待 `ready()` 或通过 `subscribe` 在配置到达后再读取）"
    )]
    NotInitialized,

    /// 与宿主通信失败
    #[error("宿主通信失败: {0}")]
    HostCommunication(#[from] HostError),

    /// 配置值类型不匹配
    #[error("配置项 {key} 的值无效: {message}")]
    InvalidValue { key: String, message: String },
}

impl From<ConfigurationError> for String {
    fn from(err: ConfigurationError) -> Self {
        err.to_string()
    }
}

impl serde::Serialize for ConfigurationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
