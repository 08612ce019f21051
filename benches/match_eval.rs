#![forbid(unsafe_code)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use entity_query::{
    an, entity_matching, match_, match_any, Evaluator, Pattern, Record, RecordRef, RecordType,
    SymbolGraph, TypeCatalog, TypeExpr, Value,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const CABINET_COUNT: usize = 2_048;
const DRAWERS_PER_CABINET: usize = 6;
const NAME_DOMAIN: u32 = 64;

fn match_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("match/cabinets");
    group.sample_size(30);
    let harness = CabinetHarness::new(CABINET_COUNT, DRAWERS_PER_CABINET);

    group.throughput(Throughput::Elements(1));
    group.bench_function("compile_nested", |b| {
        b.iter(|| black_box(harness.compile_nested()));
    });

    group.throughput(Throughput::Elements(CABINET_COUNT as u64));
    group.bench_function("flat_equality", |b| {
        b.iter(|| black_box(harness.run(match_("Cabinet").with("name", "cabinet-7"))));
    });
    group.bench_function("exists_drawer", |b| {
        b.iter(|| {
            black_box(harness.run(
                match_("Cabinet").with("drawers", match_any("Drawer").with("name", "drawer-3")),
            ))
        });
    });
    group.bench_function("explicit_domain_join", |b| {
        let domain = harness.sample.clone();
        b.iter(|| {
            black_box(harness.run(
                entity_matching("Cabinet", domain.clone())
                    .with("drawers", match_("Drawer").with("name", "drawer-5")),
            ))
        });
    });

    group.finish();
}

struct CabinetHarness {
    catalog: Arc<TypeCatalog>,
    evaluator: Evaluator,
    sample: Vec<RecordRef>,
}

impl CabinetHarness {
    fn new(cabinets: usize, drawers: usize) -> Self {
        let mut catalog = TypeCatalog::new();
        catalog
            .register_record(
                RecordType::new("Body")
                    .field("name", TypeExpr::str())
                    .queryable(),
            )
            .expect("register body");
        catalog
            .register_record(RecordType::new("Drawer").extends("Body"))
            .expect("register drawer");
        catalog
            .register_record(
                RecordType::new("Cabinet")
                    .extends("Body")
                    .field("drawers", TypeExpr::list(TypeExpr::named("Drawer"))),
            )
            .expect("register cabinet");
        let catalog = Arc::new(catalog);

        let registry = Arc::new(SymbolGraph::new());
        let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
        let mut sample = Vec::new();
        for idx in 0..cabinets {
            let drawer_records: Vec<RecordRef> = (0..drawers)
                .map(|_| {
                    let name = format!("drawer-{}", rng.gen_range(0..NAME_DOMAIN));
                    Record::new("Drawer", [("name", name)])
                })
                .collect();
            registry.extend(&drawer_records);
            let cabinet = Record::new(
                "Cabinet",
                [
                    ("name", Value::from(format!("cabinet-{idx}"))),
                    ("drawers", Value::from(drawer_records)),
                ],
            );
            registry.insert(&cabinet);
            if idx % 8 == 0 {
                sample.push(cabinet);
            }
        }

        let evaluator = Evaluator::new(Arc::clone(&catalog), registry);
        Self {
            catalog,
            evaluator,
            sample,
        }
    }

    fn compile_nested(&self) -> u64 {
        match_("Cabinet")
            .with("drawers", match_any("Drawer").with("name", "drawer-1"))
            .with("name", "cabinet-1")
            .compile(&self.catalog)
            .expect("compile")
            .descriptor()
            .query_hash()
    }

    fn run(&self, pattern: Pattern) -> usize {
        let query = pattern.compile(&self.catalog).expect("compile");
        an(query).collect(&self.evaluator).expect("evaluate").len()
    }
}

criterion_group!(benches, match_eval);
criterion_main!(benches);
