//! 配置视图
//!
//! `ConfigurationSection` 是对某一份快照的只读视图，按键读取；
//! 更新请求会转发给宿主，视图本身永远不会改变。

use super::error::{ConfigurationError, HostError};
use super::host::{ConfigurationHost, ConfigurationUpdate};
use super::snapshot::{ConfigurationMap, ConfigurationSnapshot};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// 只读配置视图
#[derive(Clone)]
pub struct ConfigurationSection {
    snapshot: Arc<ConfigurationSnapshot>,
    host: Arc<dyn ConfigurationHost>,
    update_timeout: Option<Duration>,
}

impl ConfigurationSection {
    pub(crate) fn new(
        snapshot: Arc<ConfigurationSnapshot>,
        host: Arc<dyn ConfigurationHost>,
        update_timeout: Option<Duration>,
    ) -> Self {
        Self {
            snapshot,
            host,
            update_timeout,
        }
    }

    /// 读取单个键，不存在时返回 `None`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.snapshot.merged().get(key)
    }

    /// 读取并反序列化单个键
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigurationError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ConfigurationError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    /// 整份配置（只读）
    pub fn value(&self) -> &ConfigurationMap {
        self.snapshot.merged()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.snapshot
                .merged()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.snapshot.merged().keys().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.snapshot.merged().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.snapshot.merged().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.merged().is_empty()
    }

    /// 视图所基于的快照版本
    pub fn revision(&self) -> u64 {
        self.snapshot.revision()
    }

    pub fn snapshot(&self) -> &Arc<ConfigurationSnapshot> {
        &self.snapshot
    }

    /// 请求宿主更新单个键（`None` 表示删除）
    ///
    /// 宿主确认后即返回，本视图不会变化；新配置通过下一份快照到达。
    pub async fn update(
        &self,
        key: impl Into<String>,
        value: Option<Value>,
    ) -> Result<(), ConfigurationError> {
        dispatch_update(
            self.host.as_ref(),
            self.update_timeout,
            ConfigurationUpdate::key(key, value),
        )
        .await
    }

    pub async fn remove(&self, key: impl Into<String>) -> Result<(), ConfigurationError> {
        self.update(key, None).await
    }
}

impl std::fmt::Debug for ConfigurationSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationSection")
            .field("revision", &self.snapshot.revision())
            .field("merged", self.snapshot.merged())
            .finish()
    }
}

impl serde::Serialize for ConfigurationSection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(self.snapshot.merged(), serializer)
    }
}

/// 将更新意图发送给宿主，超时视为通信失败
pub(crate) async fn dispatch_update(
    host: &dyn ConfigurationHost,
    timeout: Option<Duration>,
    update: ConfigurationUpdate,
) -> Result<(), ConfigurationError> {
    let path = update.path_display();
    tracing::debug!("[ConfigurationChannel] 请求宿主更新: {}", path);

    let sent = host.accept_configuration_update(update);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, sent).await {
            Ok(result) => result,
            Err(_) => Err(HostError::Timeout(timeout_millis(limit))),
        },
        None => sent.await,
    };

    result.map_err(ConfigurationError::from)
}

/// 超时时长（毫秒），超出 u64 时取上限
fn timeout_millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::snapshot::ConfigurationCascade;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHost {
        updates: Mutex<Vec<ConfigurationUpdate>>,
    }

    #[async_trait]
    impl ConfigurationHost for RecordingHost {
        async fn accept_configuration_update(
            &self,
            update: ConfigurationUpdate,
        ) -> Result<(), HostError> {
            self.updates.lock().push(update);
            Ok(())
        }
    }

    struct StalledHost;

    #[async_trait]
    impl ConfigurationHost for StalledHost {
        async fn accept_configuration_update(
            &self,
            _update: ConfigurationUpdate,
        ) -> Result<(), HostError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn section(host: Arc<dyn ConfigurationHost>, timeout: Option<Duration>) -> ConfigurationSection {
        let cascade = ConfigurationCascade::from_json(json!({"port": 8080, "name": "demo"}));
        ConfigurationSection::new(ConfigurationSnapshot::freeze(cascade, 1, 0), host, timeout)
    }

    #[tokio::test]
    async fn test_timeout_reports_configured_millis() {
        let err = dispatch_update(
            &StalledHost,
            Some(Duration::from_millis(20)),
            ConfigurationUpdate::key("a", None),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::HostCommunication(HostError::Timeout(20))
        );
    }

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(timeout_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), u64::MAX);
    }

    #[test]
    fn test_get_present_and_absent() {
        let section = section(Arc::new(RecordingHost::default()), None);
        assert_eq!(section.get("port"), Some(&json!(8080)));
        assert_eq!(section.get("missing"), None);
        assert!(section.contains_key("name"));
        assert_eq!(section.len(), 2);
        assert_eq!(section.keys().collect::<Vec<_>>(), vec!["port", "name"]);
    }

    #[test]
    fn test_get_as_typed() {
        let section = section(Arc::new(RecordingHost::default()), None);
        assert_eq!(section.get_as::<u16>("port").unwrap(), Some(8080));
        assert_eq!(section.get_as::<u16>("missing").unwrap(), None);
        let err = section.get_as::<u16>("name").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { ref key, .. } if key == "name"));
    }

    #[test]
    fn test_to_json_and_serialize() {
        let section = section(Arc::new(RecordingHost::default()), None);
        assert_eq!(section.to_json(), json!({"port": 8080, "name": "demo"}));
        assert_eq!(
            serde_json::to_string(&section).unwrap(),
            r#"{"port":8080,"name":"demo"}"#
        );
    }

    #[tokio::test]
    async fn test_update_forwards_to_host_without_local_change() {
        let host = Arc::new(RecordingHost::default());
        let section = section(host.clone(), None);

        section.update("port", Some(json!(9090))).await.unwrap();
        section.remove("name").await.unwrap();

        assert_eq!(section.get("port"), Some(&json!(8080)));
        let updates = host.updates.lock();
        assert_eq!(updates[0], ConfigurationUpdate::key("port", Some(json!(9090))));
        assert!(updates[1].is_removal());
    }

    #[tokio::test]
    async fn test_update_times_out() {
        let section = section(Arc::new(StalledHost), Some(Duration::from_millis(50)));
        let err = section.update("port", None).await.unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::HostCommunication(HostError::Timeout(50))
        );
    }
}
