//! Namespaced string key-value settings.
//!
//! Keys are `/`-separated paths. Callers scope reads and writes with an
//! explicit [`Namespace`] value instead of an ambient "current group", so
//! nested scopes never leak into each other.
//!
//! The store is persisted as a flat JSON object. Every write takes the file
//! lock, re-reads the file, applies the change and replaces the file
//! atomically, so concurrent processes do not lose each other's updates.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};

const SEPARATOR: char = '/';

/// A key prefix such as `projects` or `settings/ai`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Namespace(String);

impl Namespace {
    /// The unprefixed namespace.
    pub fn root() -> Self {
        Namespace(String::new())
    }

    pub fn new(path: impl AsRef<str>) -> Self {
        Namespace(path.as_ref().trim_matches(SEPARATOR).to_string())
    }

    /// Nested namespace `self/name`.
    pub fn child(&self, name: &str) -> Self {
        let name = name.trim_matches(SEPARATOR);
        if self.0.is_empty() {
            Namespace(name.to_string())
        } else {
            Namespace(format!("{}{SEPARATOR}{name}", self.0))
        }
    }

    /// Full key for `key` inside this namespace.
    pub fn key(&self, key: &str) -> String {
        if self.0.is_empty() {
            key.to_string()
        } else {
            format!("{}{SEPARATOR}{key}", self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn prefix(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!("{}{SEPARATOR}", self.0)
        }
    }
}

/// Persistent string settings.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl SettingsStore {
    /// Open (or lazily create) the store backed by `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = read_values(&path)?;
        debug!(path = %path.display(), keys = values.len(), "settings loaded");
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, ns: &Namespace, key: &str, default: &str) -> String {
        self.get_opt(ns, key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_opt(&self, ns: &Namespace, key: &str) -> Option<String> {
        self.values.get(&ns.key(key)).cloned()
    }

    pub fn contains(&self, ns: &Namespace, key: &str) -> bool {
        self.values.contains_key(&ns.key(key))
    }

    pub fn set(&mut self, ns: &Namespace, key: &str, value: impl Into<String>) -> Result<()> {
        let full_key = ns.key(key);
        if full_key.is_empty() {
            return Err(Error::InvalidArgument("settings key cannot be empty".to_string()));
        }
        let value = value.into();
        self.update(move |values| {
            values.insert(full_key, value);
        })
    }

    /// Remove `key` and everything nested below it.
    pub fn remove(&mut self, ns: &Namespace, key: &str) -> Result<()> {
        let full_key = ns.key(key);
        let nested = format!("{full_key}{SEPARATOR}");
        self.update(move |values| {
            values.retain(|k, _| k != &full_key && !k.starts_with(&nested));
        })
    }

    /// Direct keys of `ns` (not nested groups), sorted.
    pub fn child_keys(&self, ns: &Namespace) -> Vec<String> {
        self.children(ns)
            .filter(|rest| !rest.contains(SEPARATOR))
            .map(str::to_string)
            .collect()
    }

    /// Direct sub-namespaces of `ns`, sorted and deduplicated.
    pub fn child_groups(&self, ns: &Namespace) -> Vec<String> {
        let mut groups: Vec<String> = self
            .children(ns)
            .filter_map(|rest| rest.split_once(SEPARATOR).map(|(group, _)| group.to_string()))
            .collect();
        groups.dedup();
        groups
    }

    fn children<'a>(&'a self, ns: &Namespace) -> impl Iterator<Item = &'a str> + 'a {
        let prefix = ns.prefix();
        self.values
            .keys()
            .filter_map(move |key| key.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.is_empty())
    }

    fn update<F>(&mut self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let Some(path) = self.path.clone() else {
            mutate(&mut self.values);
            return Ok(());
        };

        let _lock = FileLock::acquire(lock::lock_path_for(&path), DEFAULT_LOCK_TIMEOUT_MS)?;
        let mut values = read_values(&path)?;
        mutate(&mut values);
        let json = serde_json::to_string_pretty(&values)?;
        lock::write_atomic(&path, json.as_bytes())?;
        self.values = values;
        Ok(())
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&content)?)
}
