
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::task::yield_now;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Version must be greater than zero, got {0}")]
    InvalidVersion(u32),

    #[error("The requested version ({requested}) is less than the existing version ({existing})")]
    Version { requested: u32, existing: u32 },

    #[error("No object store named `{0}` in this database")]
    NotFound(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Key path `{0}` did not yield a string key")]
    Data(String),

    #[error("Database `{name}` is blocked by {connections} open connection(s)")]
    Blocked { name: String, connections: usize },

    #[error("Transaction is read-only")]
    ReadOnly,

    #[error("Database `{0}` no longer exists")]
    InvalidState(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Default)]
struct Registry {
    databases: FxHashMap<String, DatabaseState>,
}

#[derive(Debug, Default)]
struct DatabaseState {
    version: u32,
    stores: BTreeMap<String, ObjectStore>,
    connections: usize,
}

#[derive(Debug, Clone)]
struct ObjectStore {
    key_path: String,
    records: BTreeMap<String, Value>,
}

/// Entry point to the databases of one process. Clones share the same databases.
#[derive(Clone, Default)]
pub struct Factory(Arc<Mutex<Registry>>);

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `version` is above the stored version, `upgrade` runs against a staged copy of the
    /// schema which is only kept if it returns `Ok`. The registry is locked while `upgrade`
    /// runs, so it must not call back into this factory.
    pub async fn open<F>(&self, name: &str, version: u32, upgrade: F) -> Result<Database, Error>
    where
        F: FnOnce(&mut Upgrade<'_>) -> Result<(), Error>,
    {
        if version == 0 {
            return Err(Error::InvalidVersion(version));
        }
        yield_now().await;

        let mut registry = self.0.lock();
        let state = registry.databases.entry(name.to_owned()).or_default();
        if version < state.version {
            return Err(Error::Version {
                requested: version,
                existing: state.version,
            });
        }

        if version > state.version {
            let old_version = state.version;
            let mut stores = state.stores.clone();
            match upgrade(&mut Upgrade {
                stores: &mut stores,
                old_version,
            }) {
                Ok(()) => {
                    state.stores = stores;
                    state.version = version;
                    log::debug!("Upgraded database `{name}` from v{old_version} to v{version}");
                }
                Err(e) => {
                    if old_version == 0 {
                        registry.databases.remove(name);
                    }
                    return Err(e);
                }
            }
        }

        state.connections += 1;

        Ok(Database {
            factory: self.clone(),
            name: name.to_owned(),
            version,
        })
    }

    pub async fn delete_database(&self, name: &str) -> Result<(), Error> {
        yield_now().await;

        let mut registry = self.0.lock();
        let connections = registry
            .databases
            .get(name)
            .map_or(0, |state| state.connections);
        if connections > 0 {
            return Err(Error::Blocked {
                name: name.to_owned(),
                connections,
            });
        }

        if registry.databases.remove(name).is_some() {
            log::debug!("Deleted database `{name}`");
        }
        Ok(())
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.0.lock().databases.keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct Upgrade<'a> {
    stores: &'a mut BTreeMap<String, ObjectStore>,
    old_version: u32,
}

impl Upgrade<'_> {
    /// Version the database had before this upgrade, 0 when it was just created.
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn create_object_store(&mut self, name: &str, key_path: &str) -> Result<(), Error> {
        if self.stores.contains_key(name) {
            return Err(Error::Constraint(format!(
                "object store `{name}` already exists"
            )));
        }
        self.stores.insert(
            name.to_owned(),
            ObjectStore {
                key_path: key_path.to_owned(),
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn delete_object_store(&mut self, name: &str) -> Result<(), Error> {
        self.stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }
}

/// An open connection. Dropping it releases the connection.
pub struct Database {
    factory: Factory,
    name: String,
    version: u32,
}

impl Database {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn object_store_names(&self) -> Vec<String> {
        self.factory
            .0
            .lock()
            .databases
            .get(&self.name)
            .map(|state| state.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn transaction(&self, store: &str, mode: TransactionMode) -> Result<Transaction<'_>, Error> {
        self.with_store(store, |_| ())?;
        Ok(Transaction {
            db: self,
            store: store.to_owned(),
            mode,
            pending: BTreeMap::new(),
        })
    }

    pub fn close(self) {}

    fn with_store<R>(&self, name: &str, f: impl FnOnce(&mut ObjectStore) -> R) -> Result<R, Error> {
        let mut registry = self.factory.0.lock();
        let state = registry
            .databases
            .get_mut(&self.name)
            .ok_or_else(|| Error::InvalidState(self.name.clone()))?;
        let store = state
            .stores
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))?;
        Ok(f(store))
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(state) = self.factory.0.lock().databases.get_mut(&self.name) {
            state.connections = state.connections.saturating_sub(1);
        }
    }
}

/// Writes are buffered until [`Transaction::commit`]; dropping the transaction aborts them.
/// Reads observe committed records only.
pub struct Transaction<'db> {
    db: &'db Database,
    store: String,
    mode: TransactionMode,
    pending: BTreeMap<String, Value>,
}

impl<'db> Transaction<'db> {
    /// Queues `value` for insertion, failing if its key is already taken.
    pub fn add(&mut self, value: Value) -> Result<(), Error> {
        let key = self.writable_key(&value)?;
        let exists = self.pending.contains_key(&key)
            || self
                .db
                .with_store(&self.store, |s| s.records.contains_key(&key))?;
        if exists {
            return Err(Error::Constraint(format!(
                "key `{key}` already exists in `{}`",
                self.store
            )));
        }
        self.pending.insert(key, value);
        Ok(())
    }

    pub fn put(&mut self, value: Value) -> Result<(), Error> {
        let key = self.writable_key(&value)?;
        self.pending.insert(key, value);
        Ok(())
    }

    pub async fn commit(self) -> Result<(), Error> {
        yield_now().await;
        let pending = self.pending;
        self.db
            .with_store(&self.store, move |s| s.records.extend(pending))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        yield_now().await;
        self.db
            .with_store(&self.store, |s| s.records.get(key).cloned())
    }

    pub async fn get_all(&self) -> Result<Vec<Value>, Error> {
        yield_now().await;
        self.db
            .with_store(&self.store, |s| s.records.values().cloned().collect())
    }

    pub async fn count(&self) -> Result<usize, Error> {
        yield_now().await;
        self.db.with_store(&self.store, |s| s.records.len())
    }

    pub fn open_cursor(&self) -> Cursor<'_> {
        Cursor {
            tx: self,
            position: None,
        }
    }

    fn writable_key(&self, value: &Value) -> Result<String, Error> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        let key_path = self.db.with_store(&self.store, |s| s.key_path.clone())?;
        match value.get(&key_path) {
            Some(Value::String(key)) => Ok(key.clone()),
            _ => Err(Error::Data(key_path)),
        }
    }

    fn entry_after(&self, position: Option<&str>) -> Result<Option<(String, Value)>, Error> {
        let lower = match position {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.db.with_store(&self.store, |s| {
            s.records
                .range::<str, _>((lower, Bound::Unbounded))
                .next()
                .map(|(k, v)| (k.clone(), v.clone()))
        })
    }
}

pub struct Cursor<'t> {
    tx: &'t Transaction<'t>,
    position: Option<String>,
}

impl Cursor<'_> {
    /// Advances to the next record, `None` once the store is exhausted.
    pub async fn next(&mut self) -> Result<Option<(String, Value)>, Error> {
        yield_now().await;
        let entry = self.tx.entry_after(self.position.as_deref())?;
        if let Some((key, _)) = &entry {
            self.position = Some(key.clone());
        }
        Ok(entry)
    }
}
