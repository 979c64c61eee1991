//! Memoization of expensive simulations
//!
//! Results are addressed by a [`CacheKey`]: the SHA-256 digest of the
//! canonical JSON form of the call arguments. [`Memory`] keeps encoded results
//! in memory and, with a root directory, on disk as one file per key.
//!
//! Each key is written to a temporary file in its target directory and then
//! renamed into place, so concurrent processes computing the same key never
//! observe a partial payload. Duplicate computation of a key is possible and
//! harmless: results are deterministic.

use crate::dataset::DatasetConfig;
use crate::error::Result;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable holding the on-disk cache root
pub const CACHE_DIR_ENV: &str = "FLYVIS_CACHE_DIR";

/// Configuration entries that change how fast a result is computed, not what it is
pub const PERFORMANCE_KEYS: [&str; 4] = ["batch_size", "device", "num_workers", "type"];

/// Identity of one memoized call
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    function: String,
    digest: String,
}

impl CacheKey {
    /// Digest of `args` for `function`; object key order does not matter.
    pub fn new<A: Serialize + ?Sized>(function: &str, args: &A) -> Result<Self> {
        let canonical = canonicalize(serde_json::to_value(args)?);
        let json = serde_json::to_string(&canonical)?;
        Ok(Self {
            function: function.to_string(),
            digest: hash_string(&json),
        })
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Hex-encoded SHA-256 of the canonical arguments
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Rebuild every object with sorted keys
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn hash_string(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Copy of a dataset configuration without [`PERFORMANCE_KEYS`]
pub fn strip_performance_keys(config: &DatasetConfig) -> DatasetConfig {
    config
        .iter()
        .filter(|(k, _)| !PERFORMANCE_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Where memoized results are kept
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// On-disk root; `None` keeps results in memory only
    pub root: Option<PathBuf>,
}

impl CacheConfig {
    /// Reads the root from `FLYVIS_CACHE_DIR`
    pub fn from_env() -> Self {
        Self {
            root: std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn build(&self) -> Memory {
        Memory {
            root: self.root.clone(),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

/// Result store keyed by [`CacheKey`]
#[derive(Debug, Default)]
pub struct Memory {
    root: Option<PathBuf>,
    entries: Mutex<HashMap<CacheKey, Vec<u8>>>,
}

impl Memory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        CacheConfig::default().with_root(root).build()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(&key.function).join(format!("{}.bin", key.digest)))
    }

    /// Whether a result for `key` is stored
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
            || self.path(key).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        if let Some(bytes) = self.entries.lock().get(key) {
            return Ok(Some(bincode::deserialize(bytes)?));
        }
        let path = match self.path(key) {
            Some(path) if path.is_file() => path,
            _ => return Ok(None),
        };
        let bytes = std::fs::read(&path)?;
        let value = bincode::deserialize(&bytes)?;
        self.entries.lock().insert(key.clone(), bytes);
        Ok(Some(value))
    }

    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        if let Some(path) = self.path(key) {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let mut file = tempfile::NamedTempFile::new_in(dir)?;
            file.write_all(&bytes)?;
            file.persist(&path).map_err(|e| e.error)?;
        }
        self.entries.lock().insert(key.clone(), bytes);
        Ok(())
    }

    /// Returns the stored result for `key`, computing and storing it on a miss.
    pub fn get_or_compute<T, F>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.get(key)? {
            tracing::debug!(function = %key.function, digest = %key.digest, "cache hit");
            return Ok(value);
        }
        tracing::info!(function = %key.function, digest = %key.digest, "cache miss");
        let value = compute()?;
        self.put(key, &value)?;
        Ok(value)
    }

    /// Drops every stored result, including the on-disk root
    pub fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        if let Some(root) = &self.root {
            if root.exists() {
                std::fs::remove_dir_all(root)?;
            }
        }
        Ok(())
    }
}
