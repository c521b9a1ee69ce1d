//! 配置通道
//!
//! 扩展侧配置的唯一来源：保存宿主最近推送的快照，提供同步读取、
//! 向宿主提交更新意图，以及向订阅者多播变更通知。
//!
//! 状态机：`Uninitialized --accept--> Ready`，`Ready --accept--> Ready`，不会回到未初始化。

use super::error::ConfigurationError;
use super::events::ConfigurationChangeEvent;
use super::host::{
    ConfigurationHost, ConfigurationUpdate, ExtConfigurationApi, HostConnection, HostRequest,
    KeyPathSegment,
};
use super::observer::{ConfigurationObserver, FnObserver, SubscriberRegistry, Subscription};
use super::section::{dispatch_update, ConfigurationSection};
use super::snapshot::{ConfigurationCascade, ConfigurationSnapshot};
use crate::options::ChannelOptions;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};

/// 接受快照的回执
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptReceipt {
    /// 新快照的版本号
    pub revision: u64,
    /// 本次回调的订阅者数量
    pub notified: usize,
    /// 在订阅者回调中接受的快照会排队，等当前通知结束后再投递
    pub deferred: bool,
}

/// 待投递的快照通知
#[derive(Default)]
struct DeliveryQueue {
    running: bool,
    pending: VecDeque<(ConfigurationChangeEvent, Arc<ConfigurationSnapshot>)>,
}

/// 投递结束（包括回调 panic）时清除运行标记
struct DeliveryRun<'a>(&'a RefCell<DeliveryQueue>);

impl Drop for DeliveryRun<'_> {
    fn drop(&mut self) {
        let mut queue = self.0.borrow_mut();
        queue.running = false;
        queue.pending.clear();
    }
}

/// 配置通道
pub struct ConfigurationChannel {
    /// 当前快照（`None` 表示尚未初始化）
    state: RwLock<Option<Arc<ConfigurationSnapshot>>>,
    /// 订阅者
    subscribers: Arc<SubscriberRegistry>,
    /// 宿主
    host: Arc<dyn ConfigurationHost>,
    options: ChannelOptions,
    /// 串行化快照的发布与通知；回调内重入的快照进入队列按顺序投递
    delivery: ReentrantMutex<RefCell<DeliveryQueue>>,
    /// 事件广播通道
    event_tx: broadcast::Sender<ConfigurationChangeEvent>,
    /// 第一份快照到达的通知
    first_snapshot: Notify,
}

impl ConfigurationChannel {
    pub fn new(host: Arc<dyn ConfigurationHost>) -> Self {
        Self::with_options(host, ChannelOptions::default())
    }

    pub fn with_options(host: Arc<dyn ConfigurationHost>, options: ChannelOptions) -> Self {
        let (event_tx, _) = broadcast::channel(options.event_buffer.max(1));

        Self {
            state: RwLock::new(None),
            subscribers: Arc::new(SubscriberRegistry::default()),
            host,
            options,
            delivery: ReentrantMutex::new(RefCell::new(DeliveryQueue::default())),
            event_tx,
            first_snapshot: Notify::new(),
        }
    }

    /// 通过 `HostConnection` 连接宿主，返回宿主侧需要处理的请求队列
    pub fn connect(options: ChannelOptions) -> (Self, mpsc::Receiver<HostRequest>) {
        let (connection, requests) = HostConnection::new(options.host_queue);
        (Self::with_options(Arc::new(connection), options), requests)
    }

    /// 接受宿主推送的完整快照
    ///
    /// 替换当前状态后按推送顺序同步回调订阅者；从不失败，也不等待宿主。
    /// 在订阅者回调中调用时，新快照立即生效，但通知排在当前这一轮之后。
    pub fn accept_snapshot(&self, cascade: ConfigurationCascade) -> AcceptReceipt {
        let delivery = self.delivery.lock();

        let (snapshot, event) = {
            let mut state = self.state.write();
            let previous = state.as_deref();
            let revision = previous.map_or(1, |s| s.revision() + 1);
            let now = Utc::now().timestamp_millis();
            let snapshot = ConfigurationSnapshot::freeze(cascade, revision, now);
            let event = ConfigurationChangeEvent {
                revision,
                timestamp_ms: now,
                changed_keys: snapshot.changed_keys(previous),
                initial: previous.is_none(),
            };
            *state = Some(snapshot.clone());
            (snapshot, event)
        };
        let revision = event.revision;

        tracing::debug!(
            "[ConfigurationChannel] 接受配置快照: 版本 {}，{} 个键变更",
            revision,
            event.changed_keys.len()
        );

        if event.initial {
            self.first_snapshot.notify_waiters();
        }

        // 没有接收者时发送失败，忽略即可
        let _ = self.event_tx.send(event.clone());

        {
            let mut queue = delivery.borrow_mut();
            queue.pending.push_back((event, snapshot));
            if queue.running {
                tracing::debug!(
                    "[ConfigurationChannel] 通知进行中，版本 {} 排队等待投递",
                    revision
                );
                return AcceptReceipt {
                    revision,
                    notified: 0,
                    deferred: true,
                };
            }
            queue.running = true;
        }

        let _run = DeliveryRun(&*delivery);
        let mut notified = 0;
        loop {
            let next = delivery.borrow_mut().pending.pop_front();
            let Some((event, snapshot)) = next else {
                break;
            };
            let section = self.section(snapshot);
            let count = self.notify_subscribers(&event, &section);
            if event.revision == revision {
                notified = count;
            }
        }

        AcceptReceipt {
            revision,
            notified,
            deferred: false,
        }
    }

    /// 获取当前配置视图
    ///
    /// 第一份快照到达之前返回 `ConfigurationError::NotInitialized`
    pub fn get(&self) -> Result<ConfigurationSection, ConfigurationError> {
        let snapshot = self.state.read().clone();
        snapshot
            .map(|snapshot| self.section(snapshot))
            .ok_or(ConfigurationError::NotInitialized)
    }

    /// 等待第一份快照到达
    pub async fn ready(&self) -> ConfigurationSection {
        loop {
            let notified = self.first_snapshot.notified();
            if let Ok(section) = self.get() {
                return section;
            }
            notified.await;
        }
    }

    /// 请求宿主更新单个键（`None` 表示删除）
    ///
    /// 宿主确认收到后返回；本地状态直到宿主推送新快照才会变化。
    pub async fn update(
        &self,
        key: impl Into<String>,
        value: Option<Value>,
    ) -> Result<(), ConfigurationError> {
        self.send_update(ConfigurationUpdate::key(key, value)).await
    }

    pub async fn remove(&self, key: impl Into<String>) -> Result<(), ConfigurationError> {
        self.update(key, None).await
    }

    /// 按多段路径请求更新
    pub async fn update_path(
        &self,
        path: Vec<KeyPathSegment>,
        value: Option<Value>,
    ) -> Result<(), ConfigurationError> {
        self.send_update(ConfigurationUpdate { path, value }).await
    }

    async fn send_update(&self, update: ConfigurationUpdate) -> Result<(), ConfigurationError> {
        dispatch_update(self.host.as_ref(), self.options.update_timeout(), update).await
    }

    /// 订阅配置变更
    ///
    /// 只接收订阅之后到达的快照，不会重放，未初始化状态也不会触发回调
    pub fn subscribe<F>(&self, next: F) -> Subscription
    where
        F: Fn(&ConfigurationChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe_observer(Arc::new(FnObserver::new(
            "subscriber",
            move |event, _section| {
                next(event);
                Ok(())
            },
        )))
    }

    /// 注册订阅者对象
    pub fn subscribe_observer(&self, observer: Arc<dyn ConfigurationObserver>) -> Subscription {
        self.subscribers.register(observer)
    }

    /// 订阅异步事件流（处理过慢时会跳过旧事件）
    pub fn changes(&self) -> broadcast::Receiver<ConfigurationChangeEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().is_some()
    }

    /// 当前快照版本，未初始化时为 `None`
    pub fn revision(&self) -> Option<u64> {
        self.state.read().as_ref().map(|s| s.revision())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscriber_names(&self) -> Vec<String> {
        self.subscribers.names()
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    fn section(&self, snapshot: Arc<ConfigurationSnapshot>) -> ConfigurationSection {
        ConfigurationSection::new(snapshot, self.host.clone(), self.options.update_timeout())
    }

    /// 依次回调订阅者；回调期间不持有任何状态锁
    fn notify_subscribers(
        &self,
        event: &ConfigurationChangeEvent,
        section: &ConfigurationSection,
    ) -> usize {
        let deliveries = self.subscribers.deliveries(event);
        let mut notified = 0;

        for delivery in deliveries {
            if !delivery.is_active() {
                continue;
            }
            notified += 1;
            if let Err(e) = delivery.observer.on_configuration_changed(event, section) {
                tracing::error!(
                    "[ConfigurationChannel] 订阅者 {} 处理失败: {}",
                    delivery.observer.name(),
                    e
                );
            }
        }

        notified
    }
}

#[async_trait]
impl ExtConfigurationApi for ConfigurationChannel {
    async fn accept_configuration_data(&self, data: ConfigurationCascade) {
        self.accept_snapshot(data);
    }
}

impl std::fmt::Debug for ConfigurationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationChannel")
            .field("revision", &self.revision())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
