//! 配置订阅者
//!
//! 定义订阅者接口、函数式订阅者和可取消的订阅句柄

use super::events::ConfigurationChangeEvent;
use super::section::ConfigurationSection;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// 配置订阅者 Trait
///
/// 回调在接受快照的线程上同步执行。返回 `Err` 只会被记录，不影响其他订阅者。
pub trait ConfigurationObserver: Send + Sync {
    /// 订阅者名称（用于日志和调试）
    fn name(&self) -> &str;

    /// 处理配置变更
    ///
    /// # Arguments
    /// * `event` - 变更事件
    /// * `section` - 变更后的配置视图
    fn on_configuration_changed(
        &self,
        event: &ConfigurationChangeEvent,
        section: &ConfigurationSection,
    ) -> Result<(), String>;

    /// 是否对该事件感兴趣，默认全部接收
    fn is_interested_in(&self, _event: &ConfigurationChangeEvent) -> bool {
        true
    }

    /// 优先级（数字越小越先通知），默认 100
    fn priority(&self) -> i32 {
        100
    }
}

/// 函数式订阅者
pub struct FnObserver<F>
where
    F: Fn(&ConfigurationChangeEvent, &ConfigurationSection) -> Result<(), String> + Send + Sync,
{
    name: String,
    priority: i32,
    handler: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&ConfigurationChangeEvent, &ConfigurationSection) -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            priority: 100,
            handler,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<F> ConfigurationObserver for FnObserver<F>
where
    F: Fn(&ConfigurationChangeEvent, &ConfigurationSection) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_configuration_changed(
        &self,
        event: &ConfigurationChangeEvent,
        section: &ConfigurationSection,
    ) -> Result<(), String> {
        (self.handler)(event, section)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

struct SubscriberEntry {
    observer: Arc<dyn ConfigurationObserver>,
    active: Arc<AtomicBool>,
}

/// 一次通知中待回调的订阅者
pub(crate) struct Delivery {
    pub(crate) observer: Arc<dyn ConfigurationObserver>,
    active: Arc<AtomicBool>,
}

impl Delivery {
    /// 通知过程中可能已被其他回调取消
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// 订阅者注册表（按优先级、注册顺序排列）
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<(i32, u64), SubscriberEntry>>,
}

impl SubscriberRegistry {
    pub(crate) fn register(
        self: &Arc<Self>,
        observer: Arc<dyn ConfigurationObserver>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let priority = observer.priority();
        let active = Arc::new(AtomicBool::new(true));

        tracing::debug!(
            "[ConfigurationChannel] 注册订阅者: {} (id: {}, 优先级: {})",
            observer.name(),
            id,
            priority
        );

        self.entries.write().insert(
            (priority, id),
            SubscriberEntry {
                observer,
                active: active.clone(),
            },
        );

        Subscription {
            id,
            active,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        let mut entries = self.entries.write();
        entries.retain(|(_, entry_id), _| *entry_id != id);
        tracing::debug!("[ConfigurationChannel] 注销订阅者: id {}", id);
    }

    /// 收集当前感兴趣的订阅者；回调期间不持有锁
    pub(crate) fn deliveries(&self, event: &ConfigurationChangeEvent) -> Vec<Delivery> {
        let entries = self.entries.read();
        entries
            .values()
            .filter(|e| e.active.load(Ordering::SeqCst))
            .filter(|e| e.observer.is_interested_in(event))
            .map(|e| Delivery {
                observer: e.observer.clone(),
                active: e.active.clone(),
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .values()
            .map(|e| e.observer.name().to_string())
            .collect()
    }
}

/// 订阅句柄
///
/// 丢弃句柄不会取消订阅，需显式调用 `cancel`，或转换为 `SubscriptionGuard`
#[must_use = "丢弃句柄后将无法取消订阅"]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 取消订阅，可重复调用，也可在自身回调中调用
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        !self.active.load(Ordering::SeqCst)
    }

    /// 转换为离开作用域时自动取消的守卫
    pub fn cancel_on_drop(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// 自动取消订阅的守卫
#[derive(Debug)]
pub struct SubscriptionGuard(Subscription);

impl SubscriptionGuard {
    pub fn subscription(&self) -> &Subscription {
        &self.0
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
