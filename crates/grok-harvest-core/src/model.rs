use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// A single downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub create_time: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub prompt: String,
    pub kind: MediaKind,
    pub filename: String,
}

impl Asset {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// Assets aggregated under one root id, in discovery order, unique by asset id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub items: Vec<Asset>,
}

impl Group {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            items: Vec::new(),
        }
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.items.iter().any(|item| item.id == asset_id)
    }

    /// Append `asset` unless a member already has its id. Returns whether it was inserted.
    pub fn upsert(&mut self, asset: Asset) -> bool {
        if self.contains(&asset.id) {
            return false;
        }
        self.items.push(asset);
        true
    }

    /// Drop repeated ids, keeping the first occurrence. Returns the number removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.items.len();
        let mut seen = HashSet::new();
        self.items.retain(|item| seen.insert(item.id.clone()));
        before - self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Aggregate counts over a group table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub entries: usize,
    pub total_items: usize,
    pub unique_items: usize,
    /// Members whose id already appeared earlier in the table (possibly in another group).
    pub duplicates: usize,
    pub videos: usize,
    pub images: usize,
    pub completed: usize,
}

impl StoreStats {
    pub fn compute<'a, I>(groups: I, completed: usize) -> Self
    where
        I: IntoIterator<Item = &'a Group>,
    {
        let mut stats = StoreStats {
            completed,
            ..Default::default()
        };
        let mut all_ids: HashSet<&str> = HashSet::new();

        for group in groups {
            stats.entries += 1;
            for item in &group.items {
                stats.total_items += 1;
                if !all_ids.insert(item.id.as_str()) {
                    stats.duplicates += 1;
                }
                match item.kind {
                    MediaKind::Video => stats.videos += 1,
                    MediaKind::Image => stats.images += 1,
                }
            }
        }
        stats.unique_items = all_ids.len();
        stats
    }
}
