//! Memory vault: category/content facts persisted across sessions.
//!
//! The persistence medium is an external collaborator behind the
//! `MemoryStore` trait; the vault loads once at startup and appends on
//! each store tool-call. Update and delete are deliberately absent.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryFact {
    pub category: String,
    pub content: String,
}

pub trait MemoryStore: Send + Sync {
    fn load(&self) -> Result<Vec<MemoryFact>>;
    fn append(&self, fact: &MemoryFact) -> Result<()>;
}

/// Flat JSON file store, the default external blob collaborator.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MemoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<MemoryFact>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read memory store {:?}", self.path))?;
        serde_json::from_str(&raw).with_context(|| format!("corrupt memory store {:?}", self.path))
    }

    fn append(&self, fact: &MemoryFact) -> Result<()> {
        let mut facts = self.load()?;
        facts.push(fact.clone());
        let raw = serde_json::to_string_pretty(&facts)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write memory store {:?}", self.path))
    }
}

/// Store double that keeps nothing; used when persistence is disabled.
pub struct EphemeralStore;

impl MemoryStore for EphemeralStore {
    fn load(&self) -> Result<Vec<MemoryFact>> {
        Ok(Vec::new())
    }

    fn append(&self, _fact: &MemoryFact) -> Result<()> {
        Ok(())
    }
}

pub struct MemoryVault {
    facts: Vec<MemoryFact>,
    store: Box<dyn MemoryStore>,
}

impl MemoryVault {
    /// Loads all persisted facts once. A missing or unreadable store is
    /// non-fatal: it logs and starts empty.
    pub fn open(store: Box<dyn MemoryStore>) -> Self {
        let facts = match store.load() {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!("failed to load memory vault: {:?}", e);
                Vec::new()
            }
        };
        tracing::info!("memory vault loaded with {} facts", facts.len());
        Self { facts, store }
    }

    /// Appends a fact to the vault and the backing store.
    pub fn remember(&mut self, fact: MemoryFact) -> Result<()> {
        self.store.append(&fact)?;
        self.facts.push(fact);
        Ok(())
    }

    pub fn facts(&self) -> &[MemoryFact] {
        &self.facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_store_round_trips_facts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.json");
        let store = JsonFileStore::new(&path);

        assert!(store.load().unwrap().is_empty());

        let fact = MemoryFact {
            category: "preferences".to_string(),
            content: "prefers metric units".to_string(),
        };
        store.append(&fact).unwrap();
        store
            .append(&MemoryFact {
                category: "diet".to_string(),
                content: "no sugar".to_string(),
            })
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], fact);
    }

    #[test]
    fn vault_survives_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("memories.json");
        let vault = MemoryVault::open(Box::new(JsonFileStore::new(path)));
        assert!(vault.facts().is_empty());
    }

    #[test]
    fn vault_appends_to_store_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.json");
        let mut vault = MemoryVault::open(Box::new(JsonFileStore::new(&path)));

        vault
            .remember(MemoryFact {
                category: "callsign".to_string(),
                content: "prefers to be addressed as Sir".to_string(),
            })
            .unwrap();
        assert_eq!(vault.facts().len(), 1);

        // A fresh vault sees the persisted fact.
        let reopened = MemoryVault::open(Box::new(JsonFileStore::new(&path)));
        assert_eq!(reopened.facts().len(), 1);
    }
}
