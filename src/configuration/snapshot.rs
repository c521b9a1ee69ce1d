//! 配置快照类型
//!
//! 宿主推送的是完整的配置层叠（cascade），扩展侧可见的是其中的 `merged` 部分。
//! 快照一经构建即冻结，只通过 `Arc` 共享只读引用。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// 合并后的配置映射（保留宿主给出的键顺序）
pub type ConfigurationMap = IndexMap<String, Value>;

/// 宿主推送的配置层叠
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationCascade {
    /// 合并后的最终配置
    #[serde(default)]
    pub merged: ConfigurationMap,
}

impl ConfigurationCascade {
    pub fn new(merged: ConfigurationMap) -> Self {
        Self { merged }
    }

    /// 从 JSON 对象构建；非对象值视为空配置
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                merged: map.into_iter().collect(),
            },
            _ => Self::default(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ConfigurationCascade {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            merged: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// 冻结的配置快照
#[derive(Debug)]
pub struct ConfigurationSnapshot {
    revision: u64,
    received_at_ms: i64,
    merged: ConfigurationMap,
}

impl ConfigurationSnapshot {
    pub(crate) fn freeze(
        cascade: ConfigurationCascade,
        revision: u64,
        received_at_ms: i64,
    ) -> Arc<Self> {
        Arc::new(Self {
            revision,
            received_at_ms,
            merged: cascade.merged,
        })
    }

    /// 快照版本号（第一份快照为 1）
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 接收时间戳（毫秒）
    pub fn received_at_ms(&self) -> i64 {
        self.received_at_ms
    }

    pub fn merged(&self) -> &ConfigurationMap {
        &self.merged
    }

    /// 与上一份快照相比发生变化的键（新增、删除或值变化）
    pub fn changed_keys(&self, previous: Option<&ConfigurationSnapshot>) -> Vec<String> {
        let Some(previous) = previous else {
            return self.merged.keys().cloned().collect();
        };

        let mut changed: Vec<String> = self
            .merged
            .iter()
            .filter(|(key, value)| previous.merged.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(
            previous
                .merged
                .keys()
                .filter(|key| !self.merged.contains_key(*key))
                .cloned(),
        );
        changed
    }
}
