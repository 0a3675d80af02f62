use super::kv::KvStore;
use crate::config::COMPLETED_IDS_KEY;
use crate::error::Error;
use indexmap::IndexSet;
use std::sync::Arc;
use tracing::{error, info};

/// Durable record of successfully retrieved asset ids.
///
/// Append-only apart from [`CompletedSet::clear`]. Not scoped to a browsing
/// context, so it survives store resets and context switches.
pub struct CompletedSet {
    ids: IndexSet<String>,
    kv: Arc<dyn KvStore>,
}

impl CompletedSet {
    /// Load the persisted set. A missing or unreadable payload yields an empty set.
    pub fn load(kv: Arc<dyn KvStore>) -> Self {
        let ids = match Self::read(kv.as_ref()) {
            Ok(ids) => {
                info!("Loaded {} previously completed items", ids.len());
                ids
            }
            Err(e) => {
                error!("Failed to load completion history: {}", e);
                IndexSet::new()
            }
        };
        Self { ids, kv }
    }

    fn read(kv: &dyn KvStore) -> Result<IndexSet<String>, Error> {
        let raw = kv.get_or(COMPLETED_IDS_KEY, "[]")?;
        let ids: Vec<String> = serde_json::from_str(&raw)?;
        Ok(ids.into_iter().collect())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Record `id` and persist. Returns false if it was already present.
    pub fn mark(&mut self, id: &str) -> bool {
        let inserted = self.ids.insert(id.to_string());
        if inserted {
            self.save();
        }
        inserted
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.save();
        info!("Completion history cleared");
    }

    fn save(&self) {
        if let Err(e) = self.try_save() {
            error!("Failed to save completion history: {}", e);
        }
    }

    fn try_save(&self) -> Result<(), Error> {
        let ids: Vec<&String> = self.ids.iter().collect();
        self.kv.set(COMPLETED_IDS_KEY, &serde_json::to_string(&ids)?)
    }
}
