//! Benchmarks for the routing and inference-cache hot paths.

use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use factweave::fact::{Fact, FactSet, Term};
use factweave::infer::{EntailmentRules, InferenceCache};
use factweave::integration::SeparationRule;
use factweave::store::{MemoryStore, Store};

fn combined_set(size: usize) -> FactSet {
    (0..size)
        .map(|n| {
            let namespace = match n % 3 {
                0 => "ns:spatial",
                1 => "ns:org",
                _ => "ns:event",
            };
            Fact::new(
                format!("{namespace}/resource{n}"),
                "urn:p",
                Term::iri("urn:o"),
            )
        })
        .collect()
}

fn bench_extract(c: &mut Criterion) {
    let rule = SeparationRule::SubjectPrefix("ns:spatial".into());
    c.bench_function("extract_10k", |b| {
        b.iter_batched(
            || combined_set(10_000),
            |mut set| set.extract(&rule),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let store = Arc::new(MemoryStore::new());
    store
        .add_to_partition("spatial", &combined_set(10_000))
        .unwrap();
    let rules: Arc<dyn EntailmentRules> = Arc::new(|base: &FactSet| base.clone());
    let cache = InferenceCache::new(Arc::clone(&store) as Arc<dyn Store>, rules);
    cache.get("spatial").unwrap();

    c.bench_function("cache_hit", |b| b.iter(|| cache.get("spatial").unwrap()));
}

criterion_group!(benches, bench_extract, bench_cache_hit);
criterion_main!(benches);
