//! Benchmarks for the hot data-set operations and a full emitter tick.
//!
//! Run with: `cargo bench`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use scintilla::events::EventSetStore;
use scintilla::prelude::*;
use scintilla::{EmitterInstance, InterfaceArena};

fn seeded_data_set(rows: usize) -> DataSet {
    let mut ds = DataSet::new();
    ds.add_variable(Variable::vec3("position"));
    ds.add_variable(Variable::float("age"));
    ds.finalize();
    ds.allocate(rows);
    ds.set_num_instances(rows);
    for s in 0..4 {
        for (i, v) in ds.float_column_mut(s).iter_mut().enumerate() {
            *v = i as f32;
        }
    }
    ds
}

fn bench_data_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_set");

    group.bench_function("tick_and_copy_10k", |b| {
        let mut ds = seeded_data_set(10_000);
        b.iter(|| {
            ds.tick();
            ds.copy_prev_to_cur();
            black_box(ds.num_instances())
        })
    });

    group.bench_function("kill_1k_of_10k", |b| {
        b.iter_batched(
            || seeded_data_set(10_000),
            |mut ds| {
                for _ in 0..1_000 {
                    ds.kill_instance(0);
                }
                black_box(ds.num_instances())
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_emitter_tick(c: &mut Criterion) {
    let spawn_kernel = |batch: &mut KernelBatch<'_>| {
        let n = batch.num_instances();
        let set = batch.set_mut(0);
        for lane in 0..n {
            set.output_f32(0)[lane] = lane as f32;
            set.output_f32(1)[lane] = 0.0;
            set.output_f32(2)[lane] = 0.0;
        }
    };
    let update_kernel = |batch: &mut KernelBatch<'_>| {
        let n = batch.num_instances();
        let set = batch.set_mut(0);
        for stream in 0..3 {
            for lane in 0..n {
                let v = set.input_f32(stream)[lane];
                set.output_f32(stream)[lane] = v + 0.01;
            }
        }
    };
    let spawn = Script::new("spawn")
        .with_attribute(Variable::vec3(params::ATTR_POSITION))
        .with_cpu_kernel(Arc::new(spawn_kernel))
        .build();
    let update = Script::new("update")
        .with_attribute(Variable::vec3(params::ATTR_POSITION))
        .with_reads_attributes()
        .with_cpu_kernel(Arc::new(update_kernel))
        .build();
    let spec = Arc::new(EmitterSpec::new("bench", spawn, update));

    let mut events = EventSetStore::new();
    let mut arena = InterfaceArena::default();
    let mut inst = EmitterInstance::new(spec, SystemInstanceId(1), 1, &mut events, None);

    // Seed 10k particles, then measure steady-state update ticks.
    inst.spawn_infos_mut()[0] = SpawnInfo::with_count(10_000);
    inst.pre_tick(&mut events);
    inst.tick(0.016, &mut events, &mut arena, &Mat4::IDENTITY);
    inst.spawn_infos_mut()[0] = SpawnInfo::default();

    c.bench_function("emitter_update_10k", |b| {
        b.iter(|| {
            inst.pre_tick(&mut events);
            inst.tick(0.016, &mut events, &mut arena, &Mat4::IDENTITY);
            black_box(inst.num_particles())
        })
    });
}

criterion_group!(benches, bench_data_set, bench_emitter_tick);
criterion_main!(benches);
