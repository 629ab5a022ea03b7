use std::fmt::Display;
use std::rc::Rc;

use super::{doc_key, Payload};
use crate::mock_data::{fake_github_response, generate_random_string, generate_string};
use crate::timer::Stopwatch;
use crate::{log_error, LocalStorage, StoreError, TestCase};

const SOURCE: &str = "local_storage_write";

const ITERATION: u32 = 100;

fn store_error<E: Display>(err: E) -> StoreError {
    let msg = err.to_string();
    log_error(&msg, SOURCE);
    StoreError::new(msg)
}

/// Clears the store, times `count` writes of `payload`, then clears it again.
pub fn benchmark_write(
    store: &LocalStorage,
    count: usize,
    payload: &Payload,
) -> Result<f64, StoreError> {
    store.clear().map_err(store_error)?;

    let timer = Stopwatch::start();
    for i in 0..count {
        let data = payload.to_stored_string().map_err(store_error)?;
        store.set(&doc_key(i), &*data).map_err(store_error)?;
    }
    let elapsed = timer.elapsed_ms();

    store.clear().map_err(store_error)?;
    Ok(elapsed)
}

/// Times `count` writes of distinct random strings of `size_in_bytes` bytes.
///
/// The strings are generated before the timer starts. The store is not cleared afterwards;
/// the case built around this carries a cleanup phase for that.
pub fn benchmark_write_random(
    store: &LocalStorage,
    count: usize,
    size_in_bytes: usize,
) -> Result<f64, StoreError> {
    let values: Vec<_> = (0..count)
        .map(|_| generate_random_string(size_in_bytes))
        .collect();

    let timer = Stopwatch::start();
    for (i, value) in values.iter().enumerate() {
        store.set(&doc_key(i), value).map_err(store_error)?;
    }
    Ok(timer.elapsed_ms())
}

fn write_case(
    store: &LocalStorage,
    name: &'static str,
    label: &'static str,
    count: usize,
    payload: Payload,
) -> TestCase {
    let store = store.clone();
    let payload = Rc::new(payload);
    TestCase::new(name, label, move || {
        let result = benchmark_write(&store, count, &payload);
        async move { result }
    })
    .with_iteration(ITERATION)
}

fn write_random_case(
    store: &LocalStorage,
    name: &'static str,
    label: &'static str,
    count: usize,
    size_in_bytes: usize,
) -> TestCase {
    let (bench_store, cleanup_store) = (store.clone(), store.clone());
    TestCase::new(name, label, move || {
        let result = benchmark_write_random(&bench_store, count, size_in_bytes);
        async move { result }
    })
    .with_iteration(ITERATION)
    .with_cleanup(move || {
        let result = cleanup_store.clear().map_err(store_error);
        async move { result }
    })
}

pub fn test_cases(store: &LocalStorage) -> Vec<TestCase> {
    vec![
        write_case(
            store,
            "localStorageWrite1MB",
            "localStorage write 1MB",
            1,
            Payload::from(generate_string(1024.0)),
        ),
        write_case(
            store,
            "localStorageWrite1KB",
            "localStorage write 1KB",
            1,
            Payload::from(generate_string(1.0)),
        ),
        write_random_case(
            store,
            "localStorageWrite1024x10KB",
            "localStorage write a bunch of random data",
            102,
            10,
        ),
        write_case(
            store,
            "localStorageWrite100x1KB",
            "localStorage write 100x1KB",
            100,
            Payload::from(generate_string(1.0)),
        ),
        write_case(
            store,
            "localStorageWriteJSON",
            "localStorage write 70KB JSON",
            1,
            Payload::from(fake_github_response().clone()),
        ),
    ]
}
