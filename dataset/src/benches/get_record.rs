use criterion::{criterion_group, Criterion};
use horizon_dataset::{Config, Filter, State, Stats};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{hint::black_box, sync::Arc};

const PAGE_SIZE: usize = 100;
const LOOKUPS: usize = 10_000;

/// Build a state holding `pages` resolved pages, with every third record hidden.
fn resolved(pages: u64) -> Arc<State<u64, ()>> {
    let mut config = Config::new(PAGE_SIZE);
    config.load_horizon = Some(pages * PAGE_SIZE as u64);
    let filter: Filter<u64> = Arc::new(|record: &u64| record % 3 != 0);
    config.filter = Some(filter);
    let mut state = Arc::new(State::new(&config).unwrap()).set_read_offset(0).state;
    loop {
        let page = state.pending().next().cloned();
        let Some(page) = page else {
            return state;
        };
        let start = page.offset() * PAGE_SIZE as u64;
        let records = (start..start + PAGE_SIZE as u64).collect();
        state = state
            .resolve(&page, records, Stats::default())
            .unwrap()
            .state;
    }
}

fn bench_get_record(c: &mut Criterion) {
    for pages in [10, 1_000, 5_000] {
        let state = resolved(pages);
        let length = state.length();
        let mut rng = StdRng::seed_from_u64(0);
        c.bench_function(&format!("{}/pages={}", module_path!(), pages), |b| {
            b.iter(|| {
                for _ in 0..LOOKUPS {
                    let position = rng.gen_range(0..length);
                    black_box(state.get_record(position));
                }
            });
        });
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_get_record
}
