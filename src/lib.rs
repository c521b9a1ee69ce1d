//! extconfig - 扩展配置桥接
//!
//! 宿主进程持有并推送配置快照，扩展侧同步读取、提交更新意图并订阅变更。

pub mod configuration;
pub mod logger;
pub mod options;

pub use configuration::{
    ConfigurationChannel, ConfigurationError, ConfigurationSection, MemoryHost, Subscription,
};
pub use options::{ChannelOptions, LoggingOptions, Options, OptionsError};
