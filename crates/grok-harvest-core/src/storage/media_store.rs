use super::kv::KvStore;
use crate::config::{CHILD_PARENT_KEY_PREFIX, MEDIA_DB_KEY_PREFIX};
use crate::error::Error;
use crate::model::{Asset, Group, StoreStats};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

const SNAPSHOT_VERSION: u32 = 1;

/// Persisted form of one table, tagged with the context it belongs to.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<T> {
    version: u32,
    path: String,
    saved_at: i64,
    /// Aggregation root pinned when the snapshot was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root: Option<String>,
    entries: Vec<(String, T)>,
}

/// Context-scoped group table plus derivation edges (derivative id → subject id).
pub struct MediaStore {
    groups: IndexMap<String, Group>,
    edges: IndexMap<String, String>,
    pinned_root: Option<String>,
    kv: Arc<dyn KvStore>,
}

impl MediaStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            groups: IndexMap::new(),
            edges: IndexMap::new(),
            pinned_root: None,
            kv,
        }
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    /// The group keyed by `id`, else the group of the subject `id` was derived from.
    pub fn group_for(&self, id: &str) -> Option<&Group> {
        self.groups
            .get(id)
            .or_else(|| self.parent_of(id).and_then(|parent| self.groups.get(parent)))
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.edges.is_empty()
    }

    pub fn parent_of(&self, derivative_id: &str) -> Option<&str> {
        self.edges.get(derivative_id).map(String::as_str)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert `asset` into the group `group_id`, creating the group on first use.
    pub fn upsert(&mut self, group_id: &str, asset: Asset) -> bool {
        if let Some(group) = self.groups.get_mut(group_id) {
            return group.upsert(asset);
        }
        let mut group = Group::new(group_id);
        group.upsert(asset);
        self.groups.insert(group_id.to_string(), group);
        true
    }

    pub fn record_edge(&mut self, derivative_id: &str, subject_id: &str) {
        self.edges
            .insert(derivative_id.to_string(), subject_id.to_string());
    }

    pub fn pinned_root(&self) -> Option<&str> {
        self.pinned_root.as_deref()
    }

    /// Pin `id` as the aggregation root unless one is already pinned. Returns the pinned root.
    pub fn pin_root(&mut self, id: &str) -> &str {
        self.pinned_root.get_or_insert_with(|| {
            debug!("Pinned aggregation root {}", id);
            id.to_string()
        })
    }

    pub fn unpin_root(&mut self) {
        self.pinned_root = None;
    }

    /// Structural dedup pass over every group. Returns the number of members removed.
    pub fn dedupe_all(&mut self) -> usize {
        let removed: usize = self.groups.values_mut().map(Group::dedupe).sum();
        if removed > 0 {
            info!("Removed {} duplicates", removed);
        }
        removed
    }

    pub fn stats(&self, completed: usize) -> StoreStats {
        StoreStats::compute(self.groups.values(), completed)
    }

    /// Wipe groups, edges and the pinned root. Completion history lives elsewhere.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.edges.clear();
        self.pinned_root = None;
        info!("Media store cleared");
    }

    /// Persist both tables under `context_key`. Failures are logged, never returned.
    pub fn save(&self, context_key: &str) {
        if let Err(e) = self.try_save(context_key) {
            error!("Failed to save media store for {}: {}", context_key, e);
        }
    }

    fn try_save(&self, context_key: &str) -> Result<(), Error> {
        let saved_at = chrono::Utc::now().timestamp_millis();
        let groups = Snapshot {
            version: SNAPSHOT_VERSION,
            path: context_key.to_string(),
            saved_at,
            root: self.pinned_root.clone(),
            entries: self
                .groups
                .iter()
                .map(|(id, group)| (id.clone(), group.clone()))
                .collect(),
        };
        let edges = Snapshot {
            version: SNAPSHOT_VERSION,
            path: context_key.to_string(),
            saved_at,
            root: None,
            entries: self
                .edges
                .iter()
                .map(|(child, parent)| (child.clone(), parent.clone()))
                .collect(),
        };
        self.kv
            .set(&media_key(context_key), &serde_json::to_string(&groups)?)?;
        self.kv
            .set(&edge_key(context_key), &serde_json::to_string(&edges)?)?;
        debug!(
            "Saved {} groups and {} edges for {}",
            self.groups.len(),
            self.edges.len(),
            context_key
        );
        Ok(())
    }

    /// Replace in-memory tables with the snapshot stored for `context_key`.
    ///
    /// Restores the pinned root saved with the snapshot. Returns false, leaving
    /// state untouched, when nothing is stored, the payload is unreadable, or
    /// its tag names another context.
    pub fn load(&mut self, context_key: &str) -> bool {
        match self.try_load(context_key) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Failed to load media store for {}: {}", context_key, e);
                false
            }
        }
    }

    fn try_load(&mut self, context_key: &str) -> Result<bool, Error> {
        let raw = match self.kv.get(&media_key(context_key))? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(false),
        };
        let snapshot: Snapshot<Group> = serde_json::from_str(&raw)?;
        if snapshot.path != context_key {
            debug!(
                "Ignoring stored media for {} while in {}",
                snapshot.path, context_key
            );
            return Ok(false);
        }

        let edges = match self.kv.get(&edge_key(context_key))? {
            Some(raw) if !raw.is_empty() => {
                let snapshot: Snapshot<String> = serde_json::from_str(&raw)?;
                if snapshot.path == context_key {
                    snapshot.entries
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        };

        if let Some(root) = snapshot.root.filter(|r| !r.is_empty()) {
            debug!("Restored aggregation root {}", root);
            self.pinned_root = Some(root);
        }
        self.groups = snapshot
            .entries
            .into_iter()
            .filter(|(id, _)| !id.is_empty())
            .collect();
        self.edges = edges
            .into_iter()
            .filter(|(child, parent)| !child.is_empty() && !parent.is_empty())
            .collect();
        self.dedupe_all();

        info!("Loaded media store with {} entries", self.groups.len());
        Ok(true)
    }
}

fn media_key(context_key: &str) -> String {
    format!("{}:{}", MEDIA_DB_KEY_PREFIX, context_key)
}

fn edge_key(context_key: &str) -> String {
    format!("{}:{}", CHILD_PARENT_KEY_PREFIX, context_key)
}
