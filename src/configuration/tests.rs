//! 配置通道属性测试
//!
//! 使用 proptest 进行属性测试

use crate::configuration::{
    ConfigurationCascade, ConfigurationChannel, ConfigurationError, ConfigurationMap,
    ConfigurationUpdate, MemoryHost,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 生成随机的配置键
fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,11}".prop_map(|s| s)
}

/// 生成随机的标量配置值
fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        proptest::collection::vec(any::<u8>(), 0..4).prop_map(|v| json!(v)),
    ]
}

/// 生成随机的合并配置
fn arb_merged() -> impl Strategy<Value = ConfigurationMap> {
    proptest::collection::vec((arb_key(), arb_value()), 0..12)
        .prop_map(|entries| entries.into_iter().collect::<ConfigurationMap>())
}

fn channel() -> ConfigurationChannel {
    ConfigurationChannel::new(Arc::new(MemoryHost::default()))
}

proptest! {
    #[test]
    fn prop_uninitialized_get_fails(_seed in any::<u8>()) {
        let channel = channel();
        prop_assert_eq!(channel.get().unwrap_err(), ConfigurationError::NotInitialized);
    }

    #[test]
    fn prop_get_reflects_accepted_snapshot(merged in arb_merged()) {
        let channel = channel();
        channel.accept_snapshot(ConfigurationCascade::new(merged.clone()));

        let section = channel.get().unwrap();
        prop_assert_eq!(section.len(), merged.len());
        for (key, value) in &merged {
            prop_assert_eq!(section.get(key), Some(value));
        }
    }

    #[test]
    fn prop_no_replay_for_late_subscribers(
        before in proptest::collection::vec(arb_merged(), 0..5),
        after in proptest::collection::vec(arb_merged(), 0..5),
    ) {
        let channel = channel();
        for merged in before {
            channel.accept_snapshot(ConfigurationCascade::new(merged));
        }

        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let _subscription = channel.subscribe(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        prop_assert_eq!(count.load(Ordering::SeqCst), 0);

        let expected = after.len();
        for merged in after {
            channel.accept_snapshot(ConfigurationCascade::new(merged));
        }
        prop_assert_eq!(count.load(Ordering::SeqCst), expected);
    }

    #[test]
    fn prop_cancel_stops_callbacks(
        subscribed in 0usize..4,
        after_cancel in 1usize..4,
    ) {
        let channel = channel();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let subscription = channel.subscribe(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        for n in 0..subscribed {
            channel.accept_snapshot(ConfigurationCascade::from_json(json!({ "n": n })));
        }
        subscription.cancel();
        for n in 0..after_cancel {
            channel.accept_snapshot(ConfigurationCascade::from_json(json!({ "n": n })));
        }

        prop_assert_eq!(count.load(Ordering::SeqCst), subscribed);
        prop_assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn prop_revisions_are_monotonic(snapshots in proptest::collection::vec(arb_merged(), 1..8)) {
        let channel = channel();
        for (index, merged) in snapshots.into_iter().enumerate() {
            let receipt = channel.accept_snapshot(ConfigurationCascade::new(merged));
            prop_assert_eq!(receipt.revision, index as u64 + 1);
        }
    }

    #[test]
    fn prop_update_then_push_is_visible(
        initial in arb_merged(),
        key in arb_key(),
        value in proptest::option::of(arb_value()),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let host = Arc::new(MemoryHost::new(initial));
        let channel = Arc::new(ConfigurationChannel::new(host.clone()));
        host.attach(channel.clone());

        runtime.block_on(async {
            host.push().await;
            channel.update(key.clone(), value.clone()).await.unwrap();
        });

        let section = channel.get().unwrap();
        prop_assert_eq!(section.get(&key), value.as_ref());
        prop_assert_eq!(section.value(), &host.merged());
    }

    #[test]
    fn prop_update_serialization_roundtrip(key in arb_key(), value in arb_value()) {
        let update = ConfigurationUpdate::key(key, Some(value));
        let json = serde_json::to_string(&update).unwrap();
        let parsed: ConfigurationUpdate = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, update);
    }
}
