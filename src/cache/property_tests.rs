//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key, expiry, capacity and filter properties over
//! generated inputs.

use proptest::prelude::*;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheKey, CacheStore, KEY_HEX_LENGTH};
use crate::models::{ResourceKinds, Tag, TagFilter};
use crate::scan::UnitScope;

// == Strategies ==
fn region_strategy() -> impl Strategy<Value = String> {
    "[a-z]{2}-[a-z]{4,9}-[1-3]"
}

fn scope_strategy() -> impl Strategy<Value = UnitScope> {
    prop_oneof![
        Just(UnitScope::AllServices),
        "[a-z0-9-]{0,12}".prop_map(UnitScope::Service),
    ]
}

/// Optional tag field; `Some("")` is generated on purpose.
fn tag_field_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Za-z0-9:|=~]{0,8}")
}

type KeyTuple = (String, UnitScope, Option<String>, Option<String>);

fn tuple_strategy() -> impl Strategy<Value = KeyTuple> {
    (
        region_strategy(),
        scope_strategy(),
        tag_field_strategy(),
        tag_field_strategy(),
    )
}

fn key_of((region, scope, tag_key, tag_value): &KeyTuple) -> CacheKey {
    CacheKey::new(region, scope, tag_key.as_deref(), tag_value.as_deref())
}

fn tag_strategy() -> impl Strategy<Value = Tag> {
    ("[A-C]{1,2}", "[x-z]{0,2}").prop_map(|(k, v)| Tag::new(k, v))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Same tuple, same key.
    #[test]
    fn prop_key_deterministic(tuple in tuple_strategy()) {
        let a = key_of(&tuple);
        let b = key_of(&tuple);
        prop_assert_eq!(a.as_str().len(), KEY_HEX_LENGTH);
        prop_assert_eq!(a, b);
    }

    // Distinct tuples never share a canonical string, and so never a key
    // short of an MD5 collision.
    #[test]
    fn prop_distinct_tuples_distinct_keys(a in tuple_strategy(), b in tuple_strategy()) {
        prop_assume!(a != b);
        let canonical_a = CacheKey::canonical(&a.0, &a.1, a.2.as_deref(), a.3.as_deref());
        let canonical_b = CacheKey::canonical(&b.0, &b.1, b.2.as_deref(), b.3.as_deref());
        prop_assert_ne!(canonical_a, canonical_b);
        prop_assert_ne!(key_of(&a), key_of(&b));
    }

    // Dropping a tag field always changes the key, even when it was empty.
    #[test]
    fn prop_absent_tag_never_equals_present(
        region in region_strategy(),
        scope in scope_strategy(),
        value in "[a-z]{0,6}"
    ) {
        let absent = CacheKey::new(&region, &scope, None, None);
        let present_key = CacheKey::new(&region, &scope, Some(&value), None);
        let present_value = CacheKey::new(&region, &scope, None, Some(&value));
        prop_assert_ne!(&absent, &present_key);
        prop_assert_ne!(&absent, &present_value);
        prop_assert_ne!(&present_key, &present_value);
    }

    // Entry stored at t0 is alive before t0 + ttl and dead from t0 + ttl on.
    #[test]
    fn prop_ttl_boundary(
        t0 in 0i64..4_000_000_000_000,
        ttl_ms in 1u64..86_400_000,
        epsilon in 1i64..10_000
    ) {
        let ttl = Duration::from_millis(ttl_ms);
        let key = CacheKey::new("us-east-1", &UnitScope::AllServices, None, None);
        let entry = CacheEntry::with_timestamp(key, serde_json::json!({}), t0);
        let boundary = t0 + ttl_ms as i64;

        prop_assert!(!entry.is_expired_at(boundary - epsilon.min(ttl_ms as i64), ttl));
        prop_assert!(entry.is_expired_at(boundary, ttl));
        prop_assert!(entry.is_expired_at(boundary + epsilon, ttl));
    }

    // Filter semantics against a direct reading of the three-way rule.
    #[test]
    fn prop_tag_filter_semantics(
        tags in prop::collection::vec(tag_strategy(), 0..5),
        key in prop::option::of("[A-C]{1,2}"),
        value in prop::option::of("[x-z]{0,2}")
    ) {
        let filter = TagFilter::new(key.clone(), value.clone());
        let expected = match (&key, &value) {
            (Some(k), Some(v)) => tags.iter().any(|t| &t.key == k && &t.value == v),
            (Some(k), None) => tags.iter().any(|t| &t.key == k),
            (None, Some(v)) => tags.iter().any(|t| &t.value == v),
            (None, None) => true,
        };
        prop_assert_eq!(filter.matches(&tags), expected);
    }
}

// Async properties run on a current-thread runtime per case
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    // Whatever was put last under a key is what a fresh get returns.
    #[test]
    fn prop_put_get_last_write_wins(
        writes in prop::collection::vec(prop::collection::vec("[a-z]{1,6}", 0..4), 1..6)
    ) {
        let store = CacheStore::in_memory(16, Duration::from_secs(600));
        let key = CacheKey::new("us-east-1", &UnitScope::Service("ec2".into()), None, None);

        let last = tokio_test::block_on(async {
            let mut last = ResourceKinds::new();
            for ids in &writes {
                let mut payload = ResourceKinds::new();
                payload.insert(
                    "instances".into(),
                    ids.iter().map(|id| serde_json::json!({ "InstanceId": id })).collect(),
                );
                store.put(&key, &payload).await;
                last = payload;
            }
            last
        });

        let cached = tokio_test::block_on(store.get::<ResourceKinds>(&key));
        prop_assert_eq!(cached, Some(last));
    }

    // The in-memory backend never holds more than its capacity.
    #[test]
    fn prop_capacity_enforcement(
        services in prop::collection::vec("[a-z]{1,8}", 1..60),
        capacity in 1usize..10
    ) {
        let backend = std::sync::Arc::new(crate::cache::MemoryBackend::new(capacity));
        let store = CacheStore::new(backend.clone(), Duration::from_secs(600));

        tokio_test::block_on(async {
            for service in &services {
                let key = CacheKey::new("us-east-1", &UnitScope::Service(service.clone()), None, None);
                store.put(&key, &ResourceKinds::new()).await;
            }
        });

        let len = tokio_test::block_on(backend.len());
        prop_assert!(len <= capacity, "{} entries exceed capacity {}", len, capacity);
    }
}
