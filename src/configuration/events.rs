//! 配置变更事件
//!
//! 每接受一份快照产生一个事件，同时用于同步订阅者回调和异步广播流

use serde::{Deserialize, Serialize};

/// 配置变更事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationChangeEvent {
    /// 新快照的版本号
    pub revision: u64,
    /// 接收时间戳（毫秒）
    pub timestamp_ms: i64,
    /// 与上一份快照相比发生变化的键
    pub changed_keys: Vec<String>,
    /// 是否为第一份快照
    pub initial: bool,
}

impl ConfigurationChangeEvent {
    /// 指定键是否在本次变更中
    pub fn is_changed(&self, key: &str) -> bool {
        self.changed_keys.iter().any(|k| k == key)
    }

    /// 快照内容与上一份完全相同（宿主重复推送）
    pub fn is_unchanged(&self) -> bool {
        !self.initial && self.changed_keys.is_empty()
    }
}
