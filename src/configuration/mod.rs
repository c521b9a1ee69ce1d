//! 扩展配置桥接模块
//!
//! 宿主持有真实配置并推送完整快照，扩展侧通过 `ConfigurationChannel`
//! 同步读取、提交更新意图和订阅变更。
//!
//! ## 模块结构
//! - `channel` - 配置通道
//! - `section` - 只读配置视图
//! - `snapshot` - 配置快照
//! - `observer` - 订阅者与订阅句柄
//! - `events` - 变更事件
//! - `host` - 宿主边界
//! - `error` - 错误类型
//!
//! ## 使用示例
//! ```ignore
//! use extconfig_lib::configuration::{ConfigurationChannel, MemoryHost};
//!
//! let (channel, requests) = ConfigurationChannel::connect(options.channel.clone());
//! let section = channel.ready().await;
//! let _subscription = channel.subscribe(|event| println!("配置已更新: {}", event.revision));
//! channel.update("theme", Some(json!("dark"))).await?;
//! ```

mod channel;
mod error;
mod events;
mod host;
mod observer;
mod section;
mod snapshot;

#[cfg(test)]
mod tests;

pub use channel::{AcceptReceipt, ConfigurationChannel};
pub use error::{ConfigurationError, HostError};
pub use events::ConfigurationChangeEvent;
pub use host::{
    ConfigurationHost, ConfigurationUpdate, ExtConfigurationApi, HostConnection, HostRequest,
    KeyPathSegment, MemoryHost,
};
pub use observer::{ConfigurationObserver, FnObserver, Subscription, SubscriptionGuard};
pub use section::ConfigurationSection;
pub use snapshot::{ConfigurationCascade, ConfigurationMap, ConfigurationSnapshot};
