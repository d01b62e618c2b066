use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::theme::Theme;

const PREFERENCES_VERSION: u32 = 1;
const MIN_RUN_TIMEOUT_MS: u64 = 100;
const MAX_RUN_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to read preferences {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse preferences {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize preferences {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write preferences {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Versioned preference document.
/// 具版本號的偏好設定文件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub editor: EditorPreferences,
    #[serde(default)]
    pub storage: StoragePreferences,
    #[serde(default)]
    pub run: RunPreferences,
}

fn default_version() -> u32 {
    PREFERENCES_VERSION
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            editor: EditorPreferences::default(),
            storage: StoragePreferences::default(),
            run: RunPreferences::default(),
        }
    }
}

impl Preferences {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = PREFERENCES_VERSION;
        }
        self.editor.sanitize();
        self.storage.sanitize();
        self.run.sanitize();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorPreferences {
    /// Language code given to files created before the user picks one.
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default)]
    pub theme: Theme,
}

fn default_language() -> String {
    "js".to_string()
}

impl Default for EditorPreferences {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            theme: Theme::default(),
        }
    }
}

impl EditorPreferences {
    fn sanitize(&mut self) {
        let trimmed = self.default_language.trim();
        if trimmed.is_empty() {
            self.default_language = default_language();
        } else if trimmed.len() != self.default_language.len() {
            self.default_language = trimmed.to_string();
        }
    }
}

/// Keys and bootstrap names used by the durable store.
/// 持久化儲存使用的鍵值與預設專案名稱。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePreferences {
    #[serde(default = "default_project_key")]
    pub project_key: String,
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
    #[serde(default = "default_folder_name")]
    pub default_folder_name: String,
    #[serde(default = "default_file_name")]
    pub default_file_name: String,
}

fn default_project_key() -> String {
    "folders".to_string()
}

fn default_snapshot_prefix() -> String {
    "file_".to_string()
}

fn default_folder_name() -> String {
    "My Project".to_string()
}

fn default_file_name() -> String {
    "untitled.js".to_string()
}

impl Default for StoragePreferences {
    fn default() -> Self {
        Self {
            project_key: default_project_key(),
            snapshot_prefix: default_snapshot_prefix(),
            default_folder_name: default_folder_name(),
            default_file_name: default_file_name(),
        }
    }
}

impl StoragePreferences {
    fn sanitize(&mut self) {
        if self.project_key.trim().is_empty() {
            self.project_key = default_project_key();
        }
        // The snapshot prefix must keep per-file keys apart from the project key.
        if self.snapshot_prefix.is_empty() || self.snapshot_prefix == self.project_key {
            self.snapshot_prefix = default_snapshot_prefix();
        }
        if self.default_folder_name.trim().is_empty() {
            self.default_folder_name = default_folder_name();
        }
        if self.default_file_name.trim().is_empty() {
            self.default_file_name = default_file_name();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPreferences {
    #[serde(default = "default_run_timeout")]
    pub timeout_ms: u64,
    /// Interpreter argv per language code; content is piped on stdin.
    #[serde(default = "default_interpreters")]
    pub interpreters: BTreeMap<String, Vec<String>>,
}

fn default_run_timeout() -> u64 {
    10_000
}

fn default_interpreters() -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert("js".to_string(), vec!["node".to_string()]);
    map.insert(
        "ts".to_string(),
        vec!["npx".to_string(), "--yes".to_string(), "tsx".to_string()],
    );
    map
}

impl Default for RunPreferences {
    fn default() -> Self {
        Self {
            timeout_ms: default_run_timeout(),
            interpreters: default_interpreters(),
        }
    }
}

impl RunPreferences {
    fn sanitize(&mut self) {
        if self.timeout_ms == 0 {
            self.timeout_ms = default_run_timeout();
        }
        self.timeout_ms = self.timeout_ms.clamp(MIN_RUN_TIMEOUT_MS, MAX_RUN_TIMEOUT_MS);
        self.interpreters
            .retain(|code, argv| !code.trim().is_empty() && !argv.is_empty());
    }
}

#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        let mut data = preferences;
        data.sanitize();
        Self {
            path: path.into(),
            data,
        }
    }

    /// Loads preferences from disk, falling back to defaults when the file is absent.
    /// 從磁碟載入偏好設定；檔案不存在時使用預設值。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let mut data = Preferences::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let contents = fs::read_to_string(&path).map_err(|source| PreferencesError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: Preferences =
            serde_json::from_str(&contents).map_err(|source| PreferencesError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), PreferencesError>
    where
        F: FnMut(&mut Preferences),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| PreferencesError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = serde_json::to_string_pretty(&self.data).map_err(|source| {
            PreferencesError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| PreferencesError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| PreferencesError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
