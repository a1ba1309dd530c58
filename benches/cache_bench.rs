//! Benchmarks for the resolution cache.
//!
//! Run with: cargo bench

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::net::{IpAddr, Ipv4Addr};

use shroud::cache::ResolveCache;

fn sample_addrs() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
        IpAddr::V4(Ipv4Addr::new(93, 184, 216, 35)),
    ]
}

fn bench_cache_hit(c: &mut Criterion) {
    let cache = ResolveCache::default();
    for i in 0..1000u32 {
        cache.insert(&format!("host-{i}.example.com"), sample_addrs());
    }

    c.bench_function("cache_get_hit", |b| {
        b.iter(|| cache.get(black_box("host-500.example.com")))
    });
}

fn bench_cache_miss(c: &mut Criterion) {
    let cache = ResolveCache::default();
    for i in 0..1000u32 {
        cache.insert(&format!("host-{i}.example.com"), sample_addrs());
    }

    c.bench_function("cache_get_miss", |b| {
        b.iter(|| cache.get(black_box("absent.example.com")))
    });
}

fn bench_cache_insert(c: &mut Criterion) {
    let cache = ResolveCache::default();
    let addrs = sample_addrs();

    c.bench_function("cache_insert", |b| {
        let mut i = 0u32;
        b.iter(|| {
            cache.insert(black_box(&format!("host-{i}.example.com")), addrs.clone());
            i = i.wrapping_add(1);
        })
    });
}

criterion_group!(benches, bench_cache_hit, bench_cache_miss, bench_cache_insert);
criterion_main!(benches);
