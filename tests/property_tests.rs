use std::sync::Arc;

use condense_miner::limiters::{counter_key, RateLimiter};
use condense_miner::network::{CallerRecord, QuotaPolicy};
use condense_miner::processor::{Compressor, WordRankCompressor};
use condense_miner::settings::RateLimitSettings;
use condense_miner::store::MemoryCounterStore;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn test_stake_weighted_quota_bounds_property(
        stake in 0.0f64..1e9,
        extra in 0.0f64..1e9,
        requests_per_epoch in 0u32..100_000,
        min_quota in 0u32..50,
        cap in proptest::option::of(50u32..10_000),
    ) {
        let policy = QuotaPolicy::StakeWeighted { requests_per_epoch, min_quota, max_quota: cap };
        let quota = policy.quota_for(stake, stake + extra);
        match cap {
            Some(cap) => prop_assert!(quota <= cap),
            None => prop_assert!(quota <= requests_per_epoch.max(min_quota)),
        }
        prop_assert!(quota >= min_quota);
    }

    #[test]
    fn test_quota_monotonic_in_stake_property(
        low in 0.0f64..1e6,
        delta in 0.0f64..1e6,
        others in 1.0f64..1e7,
        requests_per_epoch in 1u32..10_000,
    ) {
        let policy = QuotaPolicy::StakeWeighted { requests_per_epoch, min_quota: 1, max_quota: None };
        let high = low + delta;
        // Same total for both so only the share differs
        let total = high + others;
        prop_assert!(policy.quota_for(low, total) <= policy.quota_for(high, total));
    }

    #[test]
    fn test_counter_key_deterministic_property(
        uid in any::<u16>(),
        qualifier in "[a-zA-Z0-9]{0,48}",
    ) {
        let first = counter_key("serving_counter:{uid}", uid, &qualifier);
        let second = counter_key("serving_counter:{uid}", uid, &qualifier);
        prop_assert_eq!(&first, &second);
        let uid_prefix = format!("serving_counter:{}", uid);
        prop_assert!(first.starts_with(&uid_prefix));
        if qualifier.is_empty() {
            prop_assert_eq!(first, uid_prefix);
        } else {
            prop_assert_eq!(first, format!("{}:{}", uid_prefix, qualifier));
        }
    }

    #[test]
    fn test_distinct_uids_get_distinct_keys_property(a in any::<u16>(), b in any::<u16>()) {
        prop_assume!(a != b);
        prop_assert_ne!(counter_key("c:{uid}", a, "q"), counter_key("c:{uid}", b, "q"));
    }

    #[test]
    fn test_allowed_count_equals_min_of_requests_and_quota_property(
        quota in 0u32..40,
        requests in 0usize..80,
    ) {
        let allowed = runtime().block_on(async {
            let limiter = RateLimiter::new(
                Arc::new(MemoryCounterStore::default()),
                RateLimitSettings::default(),
            );
            let caller = CallerRecord {
                hotkey: "caller".to_string(),
                uid: 3,
                stake: 1.0,
                quota,
                incentive: 0.0,
            };
            let mut allowed = 0usize;
            for _ in 0..requests {
                if limiter.check_and_record(&caller).await.is_allowed() {
                    allowed += 1;
                }
            }
            allowed
        });
        prop_assert_eq!(allowed, requests.min(quota as usize));
    }

    #[test]
    fn test_compressor_never_grows_text_property(
        words in proptest::collection::vec("[a-z]{1,12}", 0..60),
        rate in 0.0f32..=1.0,
    ) {
        let text = words.join(" ");
        let out = WordRankCompressor.compress(&text, rate, &[]).unwrap();
        prop_assert!(out.len() <= text.len());
        let kept = out.split_whitespace().count();
        let budget = ((words.len() as f64) * f64::from(rate)).ceil() as usize;
        prop_assert_eq!(kept, budget.min(words.len()));
    }
}
