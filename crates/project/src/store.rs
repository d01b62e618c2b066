use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD as KEY_ENCODING;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

const RECORD_EXTENSION: &str = "json";

/// Key/value persistence surviving a reload.
/// 可跨重新載入保存資料的鍵值儲存。
///
/// Implementations deal in raw JSON text; the typed helpers encode and decode
/// with `serde_json`.
pub trait DurableStore {
    /// Returns the raw record under `key`, or `Ok(None)` when nothing was stored.
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the record under `key`.
    fn save_raw(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Loads and decodes `key`, returning `default` when the record is absent.
    /// 載入並解碼 `key`；若無紀錄則回傳 `default`。
    fn load<T>(&self, key: &str, default: T) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
        Self: Sized,
    {
        match self.load_raw(key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Deserialize {
                key: key.to_string(),
                source,
            }),
            None => Ok(default),
        }
    }

    /// Encodes `value` and stores it under `key`.
    fn save<T>(&mut self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
        Self: Sized,
    {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.save_raw(key, &raw)
    }
}

impl<T: DurableStore + ?Sized> DurableStore for Box<T> {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load_raw(key)
    }

    fn save_raw(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).save_raw(key, value)
    }
}

/// Errors emitted by durable stores.
/// 持久化儲存可能拋出的錯誤。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store IO error for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid payload under `{key}`: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// In-process store; contents vanish with the value.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn save_raw(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores each key as a JSON file inside a directory, replaced atomically.
/// 以目錄中的 JSON 檔案保存每個鍵值，並以原子方式取代。
///
/// File names are the URL-safe base64 form of the key, so arbitrary keys
/// (including ones containing `/`) map to flat, portable names.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record backing `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        let encoded = KEY_ENCODING.encode(key.as_bytes());
        self.root.join(format!("{encoded}.{RECORD_EXTENSION}"))
    }

    /// Lists stored keys in sorted order. A missing directory yields no keys.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    key: String::new(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some(key) = KEY_ENCODING
                .decode(stem.as_bytes())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Deletes the record under `key`; absent records are ignored.
    pub fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

impl DurableStore for DirectoryStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.record_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn save_raw(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        write_atomic(&self.record_path(key), value.as_bytes()).map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })
    }
}

/// Writes through a temporary sibling followed by rename.
/// 以臨時檔案搭配 rename 實現原子寫入。
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)
}
