pub mod idb;

use std::borrow::Borrow;
use std::fs::File;
use std::io;
use std::io::{BufRead, Seek, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to read record: {0}")]
    Read(String),

    #[error("Unable to write record: {0}")]
    Write(String),
}

fn write_err<E: std::error::Error>(err: E) -> Error {
    Error::Write(err.to_string())
}

fn read_err<E: std::error::Error>(err: E) -> Error {
    Error::Read(err.to_string())
}

#[derive(Debug)]
enum Storage {
    File(File),
    Memory(Vec<u8>),
}

impl Storage {
    fn truncate(&mut self) -> io::Result<()> {
        match self {
            Storage::File(f) => {
                f.set_len(0)?;
                f.rewind()
            }
            Storage::Memory(v) => {
                v.clear();
                Ok(())
            }
        }
    }
}

impl io::Write for Storage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Storage::File(f) => f.write(buf),
            Storage::Memory(v) => v.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Storage::File(f) => f.flush(),
            Storage::Memory(_) => Ok(()),
        }
    }
}

/// Synchronous string-keyed store backed by an append-only log of `key,<json>` lines.
#[derive(Clone)]
pub struct Store<T>(Arc<Mutex<StoreInner<T>>>);

struct StoreInner<T> {
    backing_storage: Storage,
    _phantom: PhantomData<T>,
}

impl<T> Store<T>
where
    T: Serialize + for<'a> Deserialize<'a>,
{
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .append(true)
            .open(path)?;

        let inner = StoreInner {
            backing_storage: Storage::File(file),
            _phantom: PhantomData,
        };

        Ok(Store(Arc::new(Mutex::new(inner))))
    }

    pub fn in_memory() -> Self {
        let inner = StoreInner {
            backing_storage: Storage::Memory(Default::default()),
            _phantom: PhantomData,
        };
        Store(Arc::new(Mutex::new(inner)))
    }

    pub fn set<Q>(&self, key: &str, data: &Q) -> Result<(), Error>
    where
        T: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        check_key(key)?;
        let mut inner = self.0.lock();
        let data = serde_json::to_string(&Some(data)).map_err(write_err)?;
        writeln!(inner.backing_storage, "{key},{data}").map_err(write_err)
    }

    pub fn unset(&self, key: &str) -> Result<(), Error> {
        check_key(key)?;
        let mut inner = self.0.lock();
        let data = serde_json::to_string(&Option::<T>::None).map_err(write_err)?;
        writeln!(inner.backing_storage, "{key},{data}").map_err(write_err)
    }

    pub fn get(&self, key: &str) -> Result<Option<T>, Error> {
        let mut inner = self.0.lock();

        match inner.backing_storage {
            Storage::File(ref mut f) => {
                f.rewind().map_err(read_err)?;
                search_lines(f, key)
            }
            Storage::Memory(ref mut b) => search_lines(&mut b.as_slice(), key),
        }
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.0.lock().backing_storage.truncate().map_err(write_err)
    }

    /// Number of keys whose latest record is not a tombstone.
    pub fn len(&self) -> Result<usize, Error> {
        let mut inner = self.0.lock();

        match inner.backing_storage {
            Storage::File(ref mut f) => {
                f.rewind().map_err(read_err)?;
                count_live_keys(f)
            }
            Storage::Memory(ref mut b) => count_live_keys(&mut b.as_slice()),
        }
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }
}

fn check_key(key: &str) -> Result<(), Error> {
    if key.contains([',', '\n']) {
        return Err(Error::Write(format!(
            "Key `{}` must not contain commas or newlines",
            key.escape_debug()
        )));
    }
    Ok(())
}

fn line_error(line_number: u64, line: &str) -> Error {
    Error::Read(format!("Invalid data at line {line_number}: `{line}`"))
}

fn search_lines<T, R: io::Read>(reader: R, key: &str) -> Result<Option<T>, Error>
where
    T: for<'a> Deserialize<'a>,
{
    let mut reader = io::BufReader::new(reader);
    let mut value = None;
    let mut line = String::with_capacity(100);
    let mut line_number = 0;

    while reader.read_line(&mut line).map_err(read_err)? != 0 {
        let mut split = line.splitn(2, ',');
        let k = split.next().ok_or_else(|| line_error(line_number, &line))?;
        if k == key {
            let v = split
                .next()
                .ok_or_else(|| line_error(line_number, &line))?
                .trim();

            value = serde_json::from_str(v).map_err(read_err)?;
        }
        line.clear();
        line_number += 1;
    }

    Ok(value)
}

fn count_live_keys<R: io::Read>(reader: R) -> Result<usize, Error> {
    let mut reader = io::BufReader::new(reader);
    let mut live = FxHashMap::<String, bool>::default();
    let mut line = String::with_capacity(100);
    let mut line_number = 0;

    while reader.read_line(&mut line).map_err(read_err)? != 0 {
        let (k, v) = line
            .split_once(',')
            .ok_or_else(|| line_error(line_number, &line))?;
        live.insert(k.to_owned(), v.trim() != "null");
        line.clear();
        line_number += 1;
    }

    Ok(live.values().filter(|is_live| **is_live).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test() {
        let store = Store::<u8>::in_memory();
        assert_eq!(None, store.get("key1").unwrap());

        store.set("key1", &1u8).unwrap();
        assert_eq!(Some(1), store.get("key1").unwrap());
        assert_eq!(None, store.get("not a key").unwrap());

        store.set("key2", &1u8).unwrap();
        store.set("key3", &1u8).unwrap();
        store.set("key1", &2u8).unwrap();
        store.set("key1", &3u8).unwrap();

        assert_eq!(Some(3), store.get("key1").unwrap());
        assert_eq!(3, store.len().unwrap());

        store.unset("key1").unwrap();
        assert_eq!(None, store.get("key1").unwrap());
        assert_eq!(2, store.len().unwrap());
    }

    #[test]
    fn line_error_test() {
        let data = "key1,1\nkey2".as_bytes();

        // We don't attempt to access the data if the key doesn't match, so we never notice the
        // data is missing.
        assert_eq!(None, search_lines::<u8, _>(data, "not a key").unwrap());

        assert!(search_lines::<u8, _>(data, "key2").is_err());
        assert!(count_live_keys(data).is_err());
    }

    #[test]
    fn values_with_separators() {
        let store = Store::<String>::in_memory();
        let json = r#"{"a":1,"b":[2,3]}"#.to_string();
        store.set("doc_0", &json).unwrap();
        store.set("doc_1", "line\nbreak").unwrap();

        assert_eq!(Some(json), store.get("doc_0").unwrap());
        assert_eq!(Some("line\nbreak".to_string()), store.get("doc_1").unwrap());
        assert_eq!(2, store.len().unwrap());
    }

    #[test]
    fn rejects_unencodable_keys() {
        let store = Store::<String>::in_memory();
        assert!(matches!(
            store.set("a,b", "x"),
            Err(Error::Write(_))
        ));
        assert!(store.unset("a\nb").is_err());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn clear_test() {
        let store = Store::<String>::in_memory();
        for i in 0..10 {
            store.set(&format!("doc_{i}"), "z").unwrap();
        }
        assert_eq!(10, store.len().unwrap());

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(None, store.get("doc_0").unwrap());

        store.set("doc_0", "again").unwrap();
        assert_eq!(Some("again".to_string()), store.get("doc_0").unwrap());
    }

    #[test]
    fn file_test() {
        let f = NamedTempFile::new().unwrap();
        let store = Store::<u8>::open(f.path()).unwrap();

        store.set("key1", &1u8).unwrap();
        store.set("key1", &2u8).unwrap();

        assert_eq!(Some(2), store.get("key1").unwrap());
        assert_eq!(Some(2), store.get("key1").unwrap());

        store.set("key1", &3u8).unwrap();
        assert_eq!(Some(3), store.get("key1").unwrap());

        store.clear().unwrap();
        assert_eq!(None, store.get("key1").unwrap());
        assert_eq!(0, store.len().unwrap());

        store.set("key2", &4u8).unwrap();
        assert_eq!(Some(4), store.get("key2").unwrap());
        assert_eq!(1, store.len().unwrap());
    }
}
