use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::Rng;

use hashkv_core::{Config, FieldStore};

fn bench_set(c: &mut Criterion) {
    let keys: Vec<String> = (0..10_000).map(|i| format!("user:{}", i)).collect();

    c.bench_function("field_store_set_10k_fresh", |b| {
        b.iter_batched(
            || FieldStore::new(&Config::default()),
            |store| {
                for key in &keys {
                    store.set(key, "name", "value");
                }
                store
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get(c: &mut Criterion) {
    let store = FieldStore::new(&Config::default());
    for i in 0..10_000 {
        store.set(&format!("user:{}", i), "name", "value");
        store.set(&format!("user:{}", i), "email", "value");
    }
    let mut rng = rand::thread_rng();

    c.bench_function("field_store_get_hit", |b| {
        b.iter(|| {
            let key = format!("user:{}", rng.gen_range(0..10_000));
            black_box(store.get(&key, "email"))
        })
    });

    c.bench_function("field_store_get_all", |b| {
        b.iter(|| {
            let key = format!("user:{}", rng.gen_range(0..10_000));
            black_box(store.get_all(&key))
        })
    });
}

fn bench_set_delete_churn(c: &mut Criterion) {
    let store = FieldStore::new(&Config::default());
    let mut i = 0u64;

    c.bench_function("field_store_set_delete", |b| {
        b.iter(|| {
            let key = format!("k{}", i % 1024);
            store.set(&key, "f", "v");
            store.delete(&key, "f");
            i += 1;
        })
    });
}

criterion_group!(benches, bench_set, bench_get, bench_set_delete_churn);
criterion_main!(benches);
