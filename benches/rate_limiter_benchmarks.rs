use std::hint::black_box;
use std::sync::Arc;

use condense_miner::limiters::{counter_key, RateLimiter};
use condense_miner::network::CallerRecord;
use condense_miner::processor::{Compressor, WordRankCompressor};
use condense_miner::settings::RateLimitSettings;
use condense_miner::store::MemoryCounterStore;
use criterion::{criterion_group, criterion_main, Criterion};

fn caller(uid: u16) -> CallerRecord {
    CallerRecord {
        hotkey: format!("benchmark_caller_{}", uid),
        uid,
        stake: 50_000.0,
        quota: u32::MAX, // High quota to avoid denials
        incentive: 0.0,
    }
}

fn benchmark_check_and_record(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::default()),
        RateLimitSettings {
            counter_key_qualifier: "5BenchMiner".to_string(),
            ..RateLimitSettings::default()
        },
    );
    let callers: Vec<CallerRecord> = (0..256).map(caller).collect();

    c.bench_function("serving_counter_check_and_record", |b| {
        let mut counter = 0usize;
        b.to_async(&runtime).iter(|| {
            counter += 1;
            let record = &callers[counter % callers.len()];
            let limiter = &limiter;
            async move { black_box(limiter.check_and_record(record).await) }
        })
    });
}

fn benchmark_current_count(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::default()),
        RateLimitSettings::default(),
    );
    let record = caller(1);
    runtime.block_on(limiter.check_and_record(&record));

    c.bench_function("serving_counter_current_count", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(limiter.current_count(&record).await.unwrap()) })
    });
}

fn benchmark_counter_key(c: &mut Criterion) {
    c.bench_function("counter_key", |b| {
        let mut uid = 0u16;
        b.iter(|| {
            uid = uid.wrapping_add(1);
            black_box(counter_key("serving_counter:{uid}", uid, "5BenchMiner"))
        })
    });
}

fn benchmark_word_rank_compressor(c: &mut Criterion) {
    let context = "Summarize the following passage and keep the important words? ".repeat(200);
    let forced = vec!["\n".to_string(), "?".to_string()];

    c.bench_function("word_rank_compress_2k_words", |b| {
        b.iter(|| black_box(WordRankCompressor.compress(&context, 0.5, &forced).unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_check_and_record,
    benchmark_current_count,
    benchmark_counter_key,
    benchmark_word_rank_compressor
);
criterion_main!(benches);
