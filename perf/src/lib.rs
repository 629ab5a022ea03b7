pub mod cases;
pub mod mock_data;
pub mod runner;
pub mod timer;

use std::fmt;
use std::future::Future;

use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cases::Payload;

pub type LocalStorage = kv::Store<String>;

/// A storage engine reported a failure. Carries the engine's message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn log_error(message: &str, source: &str) {
    log::error!(target: source, "{message}");
}

pub type Phase = Box<dyn Fn() -> LocalBoxFuture<'static, Result<(), StoreError>>>;
pub type Benchmark = Box<dyn Fn() -> LocalBoxFuture<'static, Result<f64, StoreError>>>;

/// One benchmark, with optional untimed setup and teardown around it.
///
/// `benchmark` resolves with the elapsed milliseconds of the one measured window.
pub struct TestCase {
    pub name: &'static str,
    pub label: &'static str,
    pub iteration: u32,
    pub prep: Option<Phase>,
    pub benchmark: Benchmark,
    pub cleanup: Option<Phase>,
}

impl TestCase {
    pub fn new<F, Fut>(name: &'static str, label: &'static str, benchmark: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<f64, StoreError>> + 'static,
    {
        TestCase {
            name,
            label,
            iteration: 1,
            prep: None,
            benchmark: Box::new(move || benchmark().boxed_local()),
            cleanup: None,
        }
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn with_prep<F, Fut>(mut self, prep: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<(), StoreError>> + 'static,
    {
        self.prep = Some(Box::new(move || prep().boxed_local()));
        self
    }

    pub fn with_cleanup<F, Fut>(mut self, cleanup: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<(), StoreError>> + 'static,
    {
        self.cleanup = Some(Box::new(move || cleanup().boxed_local()));
        self
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("iteration", &self.iteration)
            .field("prep", &self.prep.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct Backends {
    pub idb: kv::idb::Factory,
    pub local_storage: LocalStorage,
}

impl Backends {
    pub fn in_memory() -> Self {
        Backends {
            idb: kv::idb::Factory::new(),
            local_storage: LocalStorage::in_memory(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suite {
    IdbRead,
    LocalStorageWrite,
}

impl Suite {
    pub const ALL: [Suite; 2] = [Suite::IdbRead, Suite::LocalStorageWrite];

    pub fn name(self) -> &'static str {
        match self {
            Suite::IdbRead => "idb_read",
            Suite::LocalStorageWrite => "local_storage_write",
        }
    }

    pub fn test_cases(self, backends: &Backends) -> Vec<TestCase> {
        match self {
            Suite::IdbRead => cases::idb_read::test_cases(&backends.idb),
            Suite::LocalStorageWrite => {
                cases::local_storage_write::test_cases(&backends.local_storage)
            }
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
