use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

use kv::idb::{Database, Factory, Transaction, TransactionMode};
use serde_json::{json, Value};

use super::{doc_key, Payload};
use crate::mock_data::{fake_github_response, generate_string};
use crate::timer::Stopwatch;
use crate::{log_error, StoreError, TestCase};

pub const DB_NAME: &str = "idb-playground-benchmark";
pub const DB_VERSION: u32 = 1;
pub const STORE_NAME: &str = "entries";
pub const KEY_PATH: &str = "key";

const SOURCE: &str = "idb_read";

// Reads are slow enough that 100 runs per case is plenty.
const ITERATION: u32 = 100;

fn store_error<E: Display>(err: E) -> StoreError {
    let msg = err.to_string();
    log_error(&msg, SOURCE);
    StoreError::new(msg)
}

async fn open(factory: &Factory) -> Result<Database, StoreError> {
    factory
        .open(DB_NAME, DB_VERSION, |upgrade| {
            upgrade.create_object_store(STORE_NAME, KEY_PATH)
        })
        .await
        .map_err(store_error)
}

fn read_only(db: &Database) -> Result<Transaction<'_>, StoreError> {
    db.transaction(STORE_NAME, TransactionMode::ReadOnly)
        .map_err(store_error)
}

/// Inserts `count` records `{key: "doc_<i>", blob: payload}` in a single transaction.
pub async fn prep(factory: &Factory, count: usize, payload: &Payload) -> Result<(), StoreError> {
    let db = open(factory).await?;
    let mut tx = db
        .transaction(STORE_NAME, TransactionMode::ReadWrite)
        .map_err(store_error)?;
    let blob = payload.to_value();
    for i in 0..count {
        tx.add(json!({ "key": doc_key(i), "blob": blob.clone() }))
            .map_err(store_error)?;
    }
    tx.commit().await.map_err(store_error)?;
    db.close();
    Ok(())
}

pub async fn cleanup(factory: &Factory) -> Result<(), StoreError> {
    factory.delete_database(DB_NAME).await.map_err(store_error)
}

async fn get_one(db: &Database) -> Result<HashMap<String, Value>, StoreError> {
    let key = doc_key(1);
    let tx = read_only(db)?;
    let mut results = HashMap::new();
    if let Some(record) = tx.get(&key).await.map_err(store_error)? {
        results.insert(key, record);
    }
    Ok(results)
}

async fn get_all(db: &Database) -> Result<HashMap<String, Value>, StoreError> {
    let tx = read_only(db)?;
    let items = tx.get_all().await.map_err(store_error)?;
    let mut results = HashMap::with_capacity(items.len());
    for item in items {
        if let Value::Object(mut fields) = item {
            if let Some(Value::String(key)) = fields.remove(KEY_PATH) {
                results.insert(key, fields.remove("blob").unwrap_or_default());
            }
        }
    }
    Ok(results)
}

async fn scan(db: &Database) -> Result<HashMap<String, Value>, StoreError> {
    let tx = read_only(db)?;
    let mut cursor = tx.open_cursor();
    let mut results = HashMap::new();
    while let Some((key, value)) = cursor.next().await.map_err(store_error)? {
        results.insert(key, value);
    }
    Ok(results)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Read {
    GetOne,
    GetAll,
    Cursor,
}

async fn timed_read(factory: &Factory, read: Read) -> Result<f64, StoreError> {
    let db = open(factory).await?;
    let timer = Stopwatch::start();
    let results = match read {
        Read::GetOne => get_one(&db).await?,
        Read::GetAll => get_all(&db).await?,
        Read::Cursor => scan(&db).await?,
    };
    let elapsed = timer.elapsed_ms();
    log::trace!(target: SOURCE, "{read:?} read {} records", results.len());
    db.close();
    Ok(elapsed)
}

pub async fn benchmark_read_get_one(factory: &Factory) -> Result<f64, StoreError> {
    timed_read(factory, Read::GetOne).await
}

pub async fn benchmark_read_get_all(factory: &Factory) -> Result<f64, StoreError> {
    timed_read(factory, Read::GetAll).await
}

pub async fn benchmark_read_cursor(factory: &Factory) -> Result<f64, StoreError> {
    timed_read(factory, Read::Cursor).await
}

fn case(
    factory: &Factory,
    name: &'static str,
    label: &'static str,
    read: Read,
    count: usize,
    payload: Payload,
) -> TestCase {
    let payload = Rc::new(payload);
    let (prep_factory, bench_factory, cleanup_factory) =
        (factory.clone(), factory.clone(), factory.clone());

    TestCase::new(name, label, move || {
        let factory = bench_factory.clone();
        async move {
            match read {
                Read::GetOne => benchmark_read_get_one(&factory).await,
                Read::GetAll => benchmark_read_get_all(&factory).await,
                Read::Cursor => benchmark_read_cursor(&factory).await,
            }
        }
    })
    .with_iteration(ITERATION)
    .with_prep(move || {
        let factory = prep_factory.clone();
        let payload = payload.clone();
        async move { prep(&factory, count, &payload).await }
    })
    .with_cleanup(move || {
        let factory = cleanup_factory.clone();
        async move { cleanup(&factory).await }
    })
}

pub fn test_cases(factory: &Factory) -> Vec<TestCase> {
    let kb = || Payload::from(generate_string(1.0));
    let hundred_bytes = || Payload::from(generate_string(100.0 / 1024.0));

    vec![
        case(
            factory,
            "idbRead1MB",
            "idb read 1MB",
            Read::GetOne,
            10,
            Payload::from(generate_string(1024.0)),
        ),
        case(factory, "idbRead1KB", "idb read 1KB", Read::GetOne, 10, kb()),
        case(
            factory,
            "idbRead1024x100BGetAll",
            "idb read 1024x100B with getAll",
            Read::GetAll,
            1024,
            hundred_bytes(),
        ),
        case(
            factory,
            "idbRead100x1KBGetAll",
            "idb read 100x1KB with getAll",
            Read::GetAll,
            100,
            kb(),
        ),
        case(
            factory,
            "idbRead1024x100BCursor",
            "idb read 1024x100B with cursor",
            Read::Cursor,
            1024,
            hundred_bytes(),
        ),
        case(
            factory,
            "idbRead100x1KBCursor",
            "idb read 100x1KB with cursor",
            Read::Cursor,
            100,
            kb(),
        ),
        case(
            factory,
            "idbReadJSON",
            "idb read 70KB JSON",
            Read::GetOne,
            10,
            Payload::from(fake_github_response().clone()),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv::idb::Error;

    async fn keys(factory: &Factory) -> Vec<String> {
        let db = open(factory).await.unwrap();
        let records = scan(&db).await.unwrap();
        let mut keys: Vec<_> = records.into_keys().collect();
        keys.sort_by_key(|k| k["doc_".len()..].parse::<usize>().unwrap());
        keys
    }

    #[tokio::test]
    async fn prep_inserts_count_records() {
        let factory = Factory::new();
        prep(&factory, 12, &Payload::from("x")).await.unwrap();

        let expected: Vec<_> = (0..12).map(doc_key).collect();
        assert_eq!(expected, keys(&factory).await);

        cleanup(&factory).await.unwrap();
        assert!(factory.database_names().is_empty());
    }

    #[tokio::test]
    async fn get_one_fetches_doc_1() {
        let factory = Factory::new();
        prep(&factory, 10, &Payload::from("x")).await.unwrap();

        assert!(benchmark_read_get_one(&factory).await.unwrap() >= 0.0);

        let db = open(&factory).await.unwrap();
        let results = get_one(&db).await.unwrap();
        assert_eq!(
            Some(&json!({"key": "doc_1", "blob": "x"})),
            results.get("doc_1")
        );
        db.close();

        cleanup(&factory).await.unwrap();
    }

    #[tokio::test]
    async fn get_one_miss_is_not_an_error() {
        let factory = Factory::new();
        prep(&factory, 1, &Payload::from("x")).await.unwrap();

        assert!(benchmark_read_get_one(&factory).await.unwrap() >= 0.0);
        let db = open(&factory).await.unwrap();
        assert!(get_one(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_all_materializes_every_record() {
        let factory = Factory::new();
        prep(&factory, 1024, &Payload::from("y")).await.unwrap();

        assert!(benchmark_read_get_all(&factory).await.unwrap() >= 0.0);

        let db = open(&factory).await.unwrap();
        let results = get_all(&db).await.unwrap();
        assert_eq!(1024, results.len());
        assert_eq!(Some(&json!("y")), results.get("doc_1023"));
    }

    #[tokio::test]
    async fn cursor_visits_every_record() {
        let factory = Factory::new();
        let doc = Payload::from(json!({"nested": [1, 2, 3]}));
        prep(&factory, 100, &doc).await.unwrap();

        assert!(benchmark_read_cursor(&factory).await.unwrap() >= 0.0);

        let db = open(&factory).await.unwrap();
        let results = scan(&db).await.unwrap();
        assert_eq!(100, results.len());
        assert_eq!(
            json!({"key": "doc_42", "blob": {"nested": [1, 2, 3]}}),
            results["doc_42"]
        );
    }

    #[tokio::test]
    async fn benchmarks_run_on_a_fresh_store() {
        for read in [Read::GetOne, Read::GetAll, Read::Cursor] {
            let factory = Factory::new();
            assert!(timed_read(&factory, read).await.unwrap() >= 0.0);
            cleanup(&factory).await.unwrap();
        }
    }

    #[tokio::test]
    async fn every_case_runs_twice_and_leaves_nothing() {
        let factory = Factory::new();
        for case in test_cases(&factory) {
            for _ in 0..2 {
                (case.prep.as_ref().unwrap())().await.unwrap();
                assert!((case.benchmark)().await.unwrap() >= 0.0);
                (case.cleanup.as_ref().unwrap())().await.unwrap();
                assert!(factory.database_names().is_empty(), "{}", case.name);
            }
        }
    }

    #[tokio::test]
    async fn prep_without_cleanup_fails_atomically() {
        let factory = Factory::new();
        prep(&factory, 2, &Payload::from("x")).await.unwrap();

        let err = prep(&factory, 4, &Payload::from("x")).await.unwrap_err();
        assert!(err.message().contains("doc_0"), "{err}");
        assert_eq!(vec!["doc_0", "doc_1"], keys(&factory).await);

        // The failed prep released its connection.
        cleanup(&factory).await.unwrap();
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let factory = Factory::new();
        factory
            .open(DB_NAME, DB_VERSION + 1, |_| Ok(()))
            .await
            .unwrap()
            .close();

        let expected = Error::Version {
            requested: DB_VERSION,
            existing: DB_VERSION + 1,
        }
        .to_string();
        assert_eq!(expected, benchmark_read_cursor(&factory).await.unwrap_err().message());
        assert_eq!(
            expected,
            prep(&factory, 1, &Payload::from("x")).await.unwrap_err().message()
        );
    }

    #[tokio::test]
    async fn failed_read_releases_the_connection() {
        let factory = Factory::new();
        // Same name and version, but without the `entries` store.
        factory
            .open(DB_NAME, DB_VERSION, |_| Ok(()))
            .await
            .unwrap()
            .close();

        for read in [Read::GetOne, Read::GetAll, Read::Cursor] {
            let err = timed_read(&factory, read).await.unwrap_err();
            assert_eq!(Error::NotFound(STORE_NAME.into()).to_string(), err.message());
        }

        cleanup(&factory).await.unwrap();
        assert!(factory.database_names().is_empty());
    }

    #[tokio::test]
    async fn cleanup_is_blocked_by_open_connections() {
        let factory = Factory::new();
        let db = open(&factory).await.unwrap();
        assert!(cleanup(&factory).await.is_err());
        db.close();
        cleanup(&factory).await.unwrap();
    }
}
