use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use kinship_core::{FamilyId, PersonId};
use kinship_family::{Child, Family, FamilyStatus, Parent};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn family_with_children(n: usize) -> Family {
    let parents = vec![
        Parent::try_new("P1", "Jane", "Doe", date(1980, 1, 1)).expect("parent"),
        Parent::try_new("P2", "John", "Doe", date(1979, 1, 1)).expect("parent"),
    ];
    let children = (0..n)
        .map(|i| Child::try_new(&format!("C{i}"), "Kid", "Doe", date(2010, 1, 1)).expect("child"))
        .collect();
    Family::create(FamilyId::parse("F1").expect("id"), FamilyStatus::Married, parents, children)
        .expect("family")
}

fn bench_add_child(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_child");
    for size in [0usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let base = family_with_children(size);
            b.iter(|| {
                let mut family = base.clone();
                family
                    .add_child(Child::try_new("NEW", "Baby", "Doe", date(2020, 1, 1)).expect("child"))
                    .expect("add child");
                black_box(family)
            })
        });
    }
    group.finish();
}

fn bench_divorce(c: &mut Criterion) {
    let base = family_with_children(10);
    let custodial = PersonId::parse("P1").expect("id");
    c.bench_function("divorce", |b| {
        b.iter(|| {
            let mut family = base.clone();
            let settlement = family.divorce(&custodial).expect("divorce");
            black_box(settlement.non_custodial_family().expect("spin off"))
        })
    });
}

criterion_group!(benches, bench_add_child, bench_divorce);
criterion_main!(benches);
