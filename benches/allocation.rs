use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata::{components, World};

#[derive(Debug)]
struct Pos(f32, f32);
#[derive(Debug)]
struct Vel(f32, f32);

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_10k_single_component", |b| {
        b.iter(|| {
            let world = World::new();
            for i in 0..10_000 {
                world.create_entity(components![Pos(i as f32, 0.0)]);
            }
            black_box(world);
        });
    });
}

fn bench_create_two_components(c: &mut Criterion) {
    c.bench_function("create_10k_two_components", |b| {
        b.iter(|| {
            let world = World::new();
            for i in 0..10_000 {
                world.create_entity(components![Vel(0.0, 1.0), Pos(i as f32, 0.0)]);
            }
            black_box(world);
        });
    });
}

fn bench_churn(c: &mut Criterion) {
    c.bench_function("create_destroy_churn", |b| {
        let world = World::new();
        b.iter(|| {
            let entity = world.create_entity(components![Pos(1.0, 2.0)]);
            world.destroy_entity(&entity);
        });
    });
}

fn bench_iterate(c: &mut Criterion) {
    let world = World::new();
    for i in 0..10_000 {
        world.create_entity(components![Pos(i as f32, 0.0), Vel(1.0, 1.0)]);
    }

    c.bench_function("iterate_10k_arity_1", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for row in world.find1::<Pos>() {
                sum += row.comp.0;
            }
            black_box(sum);
        });
    });

    c.bench_function("iterate_10k_arity_2", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for row in world.find2::<Pos, Vel>() {
                sum += row.comp1.0 + row.comp2.1;
            }
            black_box(sum);
        });
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_create_two_components,
    bench_churn,
    bench_iterate
);
criterion_main!(benches);
