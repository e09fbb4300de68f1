use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use protocell_core::{SimConfig, World};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(fallback)
}

fn bench_world_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_update");
    group.sample_size(env_or("PC_BENCH_SAMPLES", 20_usize).max(10));
    group.warm_up_time(Duration::from_secs(env_or("PC_BENCH_WARMUP_SECS", 2)));
    group.measurement_time(Duration::from_secs(env_or("PC_BENCH_MEASURE_SECS", 8)));
    let steps: usize = env_or("PC_BENCH_STEPS", 32_usize).max(1);

    for &cells in &[50_usize, 250, 1_000] {
        group.bench_function(format!("steps{steps}_cells{cells}"), |b| {
            b.iter_batched(
                || {
                    let config = SimConfig {
                        initial_cells: cells,
                        cells_limit: cells.max(1_000),
                        auto_save: false,
                        rng_seed: Some(0xCE11),
                        ..SimConfig::default()
                    };
                    let mut world = World::new(config).expect("world");
                    world.populate();
                    world
                },
                |mut world| {
                    for _ in 0..steps {
                        world.update().expect("tick");
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_world_updates);
criterion_main!(benches);
