use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kinship_core::{AggregateRoot, FamilyId};
use kinship_family::{Family, FamilyStatus, Parent};
use kinship_infra::resilience::{RateLimiterConfig, RetryPolicy};
use kinship_infra::{
    CallContext, FamilyRepository, FamilyStore, GuardedFamilyRepository, InMemoryFamilyStore,
    PipelineConfig,
};

fn family() -> Family {
    Family::create(
        FamilyId::parse("F1").unwrap(),
        FamilyStatus::Single,
        vec![Parent::try_new("P1", "Ada", "King", NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()).unwrap()],
        Vec::new(),
    )
    .unwrap()
}

fn bench_load(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let store = InMemoryFamilyStore::new();
    let repo = GuardedFamilyRepository::new(
        InMemoryFamilyStore::new(),
        PipelineConfig {
            retry: RetryPolicy::no_retry(),
            rate: RateLimiterConfig {
                requests_per_second: 1e9,
                burst_size: u32::MAX,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    let family = family();
    let ctx = CallContext::new();
    rt.block_on(async {
        store.store(&family).await.unwrap();
        repo.save(&ctx, &family).await.unwrap();
    });

    let mut group = c.benchmark_group("load_family");
    group.bench_function("store_direct", |b| {
        b.iter(|| rt.block_on(store.load(black_box(family.id()))).unwrap())
    });
    group.bench_function("guarded", |b| {
        b.iter(|| rt.block_on(repo.get_by_id(&ctx, black_box(family.id()))).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_load);
criterion_main!(benches);
