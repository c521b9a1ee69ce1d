//! 宿主边界
//!
//! 配置的真实状态由宿主持有：
//! - 宿主 → 扩展：`ExtConfigurationApi::accept_configuration_data` 推送完整快照
//! - 扩展 → 宿主：`ConfigurationHost::accept_configuration_update` 提交单个键的变更意图
//!
//! `HostConnection` 基于 mpsc + oneshot 实现请求/确认，`MemoryHost` 是进程内的宿主实现。

use super::error::HostError;
use super::snapshot::{ConfigurationCascade, ConfigurationMap};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// 配置路径段（字符串键或数组下标）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for KeyPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPathSegment::Key(key) => write!(f, "{}", key),
            KeyPathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl From<&str> for KeyPathSegment {
    fn from(key: &str) -> Self {
        KeyPathSegment::Key(key.to_string())
    }
}

impl From<String> for KeyPathSegment {
    fn from(key: String) -> Self {
        KeyPathSegment::Key(key)
    }
}

impl From<usize> for KeyPathSegment {
    fn from(index: usize) -> Self {
        KeyPathSegment::Index(index)
    }
}

/// 配置更新意图
///
/// `value` 为 `None` 表示删除该路径上的键（JSON 中缺省或为 null）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationUpdate {
    pub path: Vec<KeyPathSegment>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl ConfigurationUpdate {
    /// 单个顶层键的更新
    pub fn key(key: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            path: vec![KeyPathSegment::Key(key.into())],
            value,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.value.is_none()
    }

    /// 以点号拼接的路径，用于日志
    pub fn path_display(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// 扩展 → 宿主：提交配置变更意图
///
/// 返回 `Ok(())` 仅表示宿主已收到意图，新的快照随后经 `accept_configuration_data` 推送
#[async_trait]
pub trait ConfigurationHost: Send + Sync {
    async fn accept_configuration_update(&self, update: ConfigurationUpdate)
        -> Result<(), HostError>;
}

/// 宿主 → 扩展：推送完整配置
#[async_trait]
pub trait ExtConfigurationApi: Send + Sync {
    async fn accept_configuration_data(&self, data: ConfigurationCascade);
}

/// 发往宿主的请求
#[derive(Debug)]
pub struct HostRequest {
    pub update: ConfigurationUpdate,
    ack: oneshot::Sender<Result<(), String>>,
}

impl HostRequest {
    /// 回复确认（`Err` 表示宿主拒绝）
    pub fn acknowledge(self, result: Result<(), String>) {
        // 请求方可能已超时放弃
        let _ = self.ack.send(result);
    }
}

/// 基于通道的宿主连接
#[derive(Debug, Clone)]
pub struct HostConnection {
    tx: mpsc::Sender<HostRequest>,
}

impl HostConnection {
    /// 创建连接，返回宿主侧需要消费的请求队列
    pub fn new(queue: usize) -> (Self, mpsc::Receiver<HostRequest>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        (Self { tx }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl ConfigurationHost for HostConnection {
    async fn accept_configuration_update(
        &self,
        update: ConfigurationUpdate,
    ) -> Result<(), HostError> {
        let (ack, ack_rx) = oneshot::channel();
        self.tx
            .send(HostRequest { update, ack })
            .await
            .map_err(|_| HostError::Disconnected)?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => {
                tracing::warn!("[HostConnection] 宿主拒绝更新: {}", reason);
                Err(HostError::Rejected(reason))
            }
            Err(_) => Err(HostError::Disconnected),
        }
    }
}

/// 进程内宿主
///
/// 持有合并后的配置，应用更新意图后向已连接的扩展推送完整快照
pub struct MemoryHost {
    merged: RwLock<ConfigurationMap>,
    target: RwLock<Option<Arc<dyn ExtConfigurationApi>>>,
}

impl MemoryHost {
    pub fn new(initial: ConfigurationMap) -> Self {
        Self {
            merged: RwLock::new(initial),
            target: RwLock::new(None),
        }
    }

    /// 连接接收快照的扩展端
    pub fn attach(&self, target: Arc<dyn ExtConfigurationApi>) {
        *self.target.write() = Some(target);
        tracing::debug!("[MemoryHost] 已连接扩展端");
    }

    /// 当前合并配置的副本
    pub fn merged(&self) -> ConfigurationMap {
        self.merged.read().clone()
    }

    pub fn cascade(&self) -> ConfigurationCascade {
        ConfigurationCascade::new(self.merged())
    }

    /// 推送当前配置；未连接扩展端时返回 false
    pub async fn push(&self) -> bool {
        let target = self.target.read().clone();
        let Some(target) = target else {
            return false;
        };
        target.accept_configuration_data(self.cascade()).await;
        true
    }

    /// 整体替换配置并推送
    pub async fn set_merged(&self, merged: ConfigurationMap) -> bool {
        *self.merged.write() = merged;
        self.push().await
    }

    /// 应用一条更新意图（不推送）
    pub fn apply(&self, update: &ConfigurationUpdate) -> Result<(), String> {
        let mut merged = self.merged.write();
        apply_update(&mut merged, update)
    }

    /// 处理单个请求：应用、确认，成功时推送新快照
    pub async fn handle(&self, request: HostRequest) {
        let result = self.apply(&request.update);
        let applied = result.is_ok();
        if let Err(reason) = &result {
            tracing::warn!(
                "[MemoryHost] 拒绝更新 {}: {}",
                request.update.path_display(),
                reason
            );
        }
        request.acknowledge(result);
        if applied {
            self.push().await;
        }
    }

    /// 持续处理请求队列，直到所有连接关闭
    pub async fn serve(self: Arc<Self>, mut requests: mpsc::Receiver<HostRequest>) {
        tracing::debug!("[MemoryHost] 开始处理配置更新请求");
        while let Some(request) = requests.recv().await {
            self.handle(request).await;
        }
        tracing::debug!("[MemoryHost] 请求队列已关闭");
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(ConfigurationMap::new())
    }
}

#[async_trait]
impl ConfigurationHost for MemoryHost {
    async fn accept_configuration_update(
        &self,
        update: ConfigurationUpdate,
    ) -> Result<(), HostError> {
        self.apply(&update).map_err(|reason| {
            tracing::warn!(
                "[MemoryHost] 拒绝更新 {}: {}",
                update.path_display(),
                reason
            );
            HostError::Rejected(reason)
        })?;
        self.push().await;
        Ok(())
    }
}

/// 在合并配置上应用更新意图
///
/// 在副本上应用，失败时 `root` 保持不变
pub(crate) fn apply_update(
    root: &mut ConfigurationMap,
    update: &ConfigurationUpdate,
) -> Result<(), String> {
    let mut next = root.clone();
    apply_in_place(&mut next, update)?;
    *root = next;
    Ok(())
}

fn apply_in_place(root: &mut ConfigurationMap, update: &ConfigurationUpdate) -> Result<(), String> {
    let Some((head, rest)) = update.path.split_first() else {
        return Err("更新路径为空".to_string());
    };
    let KeyPathSegment::Key(key) = head else {
        return Err(format!("顶层路径必须是字符串键: {}", head));
    };
    let value = update.value.as_ref();

    if rest.is_empty() {
        match value {
            Some(value) => {
                root.insert(key.clone(), value.clone());
            }
            None => {
                root.shift_remove(key);
            }
        }
        return Ok(());
    }

    if value.is_none() && !root.contains_key(key) {
        return Ok(());
    }
    let child = root
        .entry(key.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    apply_nested(child, rest, value)
}

fn apply_nested(
    target: &mut Value,
    path: &[KeyPathSegment],
    value: Option<&Value>,
) -> Result<(), String> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(());
    };

    match head {
        KeyPathSegment::Key(key) => {
            let Some(map) = target.as_object_mut() else {
                return Err(format!("路径段 {} 指向的不是对象", key));
            };
            if rest.is_empty() {
                match value {
                    Some(value) => {
                        map.insert(key.clone(), value.clone());
                    }
                    None => {
                        map.remove(key);
                    }
                }
                return Ok(());
            }
            if value.is_none() && !map.contains_key(key) {
                return Ok(());
            }
            let child = map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            apply_nested(child, rest, value)
        }
        KeyPathSegment::Index(index) => {
            let index = *index;
            let Some(items) = target.as_array_mut() else {
                return Err(format!("路径段 [{}] 指向的不是数组", index));
            };
            let len = items.len();
            if rest.is_empty() {
                match value {
                    Some(value) if index < len => items[index] = value.clone(),
                    Some(value) if index == len => items.push(value.clone()),
                    None if index < len => {
                        items.remove(index);
                    }
                    _ => return Err(format!("数组下标越界: {} (长度 {})", index, len)),
                }
                return Ok(());
            }
            let child = items
                .get_mut(index)
                .ok_or_else(|| format!("数组下标越界: {} (长度 {})", index, len))?;
            apply_nested(child, rest, value)
        }
    }
}
