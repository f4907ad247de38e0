//! Keyed snapshot of the latest about document per service

use about_api::AboutDocument;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// How entries are keyed
///
/// `Name` matches the published behaviour: services sharing a name in different
/// namespaces overwrite each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    #[default]
    Name,
    NamespacedName,
}

impl KeyStrategy {
    pub fn key(&self, about: &AboutDocument) -> String {
        match self {
            KeyStrategy::Name => about.service.name.clone(),
            KeyStrategy::NamespacedName => about.service.qualified_name(),
        }
    }
}

/// AboutStore holds the most recently seen about document for each service
///
/// Writers take the exclusive lock for a single insert, so readers always see whole
/// entries. Clones share the same entries.
#[derive(Clone, Default)]
pub struct AboutStore {
    entries: Arc<RwLock<BTreeMap<String, AboutDocument>>>,
    strategy: KeyStrategy,
}

impl AboutStore {
    pub fn new(strategy: KeyStrategy) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            strategy,
        }
    }

    /// Insert or replace the entry for the document's service, returning the store size
    pub async fn insert(&self, about: AboutDocument) -> usize {
        let key = self.strategy.key(&about);

        let mut entries = self.entries.write().await;
        entries.insert(key.clone(), about);

        debug!("Stored about document for {}", key);
        entries.len()
    }

    /// Point-in-time copy of all entries, ordered by key
    pub async fn snapshot(&self) -> Vec<AboutDocument> {
        let entries = self.entries.read().await;
        entries.values().cloned().collect()
    }

    pub async fn get(&self, key: &str) -> Option<AboutDocument> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }
}
