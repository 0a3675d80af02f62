//! Ephemeral tracking for interactive generation pages.
//!
//! Generation produces assets faster than the persistent store should keep
//! them, so nothing here is saved automatically. [`SessionTracker::export`]
//! is the only way session data outlives the context.

use crate::model::Asset;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, info};

/// Where the prompt currently shown on the page can be read from.
///
/// Both methods default to "nothing visible".
pub trait PromptSource: Send + Sync {
    /// Text of the active prompt input, if any.
    fn input_prompt(&self) -> Option<String> {
        None
    }

    /// Text of the nearest contextual prompt label, if any.
    fn label_prompt(&self) -> Option<String> {
        None
    }
}

/// Prompt source for contexts with no page to inspect.
pub struct NoPromptSource;

impl PromptSource for NoPromptSource {}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub asset: Asset,
    pub added_at: DateTime<Utc>,
    pub downloaded: bool,
    pub downloaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total: usize,
    pub downloaded: usize,
    pub remaining: usize,
    pub session_id: String,
    pub start_time: String,
    pub current_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedImage {
    pub id: String,
    pub url: String,
    pub prompt: String,
    pub filename: String,
    pub added_at: String,
    pub downloaded: bool,
    pub downloaded_at: Option<String>,
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub exported_at: String,
    pub session_id: String,
    pub start_time: String,
    pub last_prompt: String,
    pub total_images: usize,
    pub downloaded_count: usize,
    pub images: Vec<ExportedImage>,
}

impl SessionExport {
    /// Suggested file name for the exported document.
    pub fn file_name(&self) -> String {
        format!("grok-imagine-session-{}.json", self.session_id)
    }
}

pub struct SessionTracker {
    session_id: String,
    start_time: DateTime<Utc>,
    prompt: String,
    entries: IndexMap<String, SessionEntry>,
    downloaded_in_session: IndexSet<String>,
    prompt_source: Box<dyn PromptSource>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(Box::new(NoPromptSource))
    }
}

impl SessionTracker {
    pub fn new(prompt_source: Box<dyn PromptSource>) -> Self {
        Self {
            session_id: new_session_id(),
            start_time: Utc::now(),
            prompt: String::new(),
            entries: IndexMap::new(),
            downloaded_in_session: IndexSet::new(),
            prompt_source,
        }
    }

    pub fn set_prompt_source(&mut self, prompt_source: Box<dyn PromptSource>) {
        self.prompt_source = prompt_source;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_prompt(&self) -> &str {
        &self.prompt
    }

    /// Re-read the page prompt: input first, then label, else keep the last known one.
    pub fn refresh_prompt(&mut self) {
        let visible = [
            self.prompt_source.input_prompt(),
            self.prompt_source.label_prompt(),
        ]
        .into_iter()
        .flatten()
        .map(|p| p.trim().to_string())
        .find(|p| !p.is_empty());

        if let Some(prompt) = visible {
            self.prompt = prompt;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&SessionEntry> {
        self.entries.get(id)
    }

    /// Track `asset` unless its id is already known. An asset without its own
    /// prompt takes the current page prompt.
    pub fn add(&mut self, mut asset: Asset) -> bool {
        if self.entries.contains_key(&asset.id) {
            return false;
        }
        self.refresh_prompt();
        if asset.prompt.trim().is_empty() {
            asset.prompt = self.prompt.clone();
        }
        let id = asset.id.clone();
        self.entries.insert(
            id.clone(),
            SessionEntry {
                asset,
                added_at: Utc::now(),
                downloaded: false,
                downloaded_at: None,
            },
        );
        debug!("Added to session: {} - total: {}", id, self.entries.len());
        true
    }

    pub fn mark_downloaded(&mut self, id: &str) {
        self.downloaded_in_session.insert(id.to_string());
        if let Some(entry) = self.entries.get_mut(id) {
            entry.downloaded = true;
            entry.downloaded_at = Some(Utc::now());
        }
    }

    pub fn is_downloaded(&self, id: &str) -> bool {
        self.downloaded_in_session.contains(id)
    }

    /// Tracked assets not yet retrieved in this session, in discovery order.
    pub fn undownloaded(&self) -> Vec<Asset> {
        self.entries
            .iter()
            .filter(|(id, _)| !self.downloaded_in_session.contains(id.as_str()))
            .map(|(_, entry)| entry.asset.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> SessionStats {
        let total = self.entries.len();
        let downloaded = self.downloaded_in_session.len();
        SessionStats {
            total,
            downloaded,
            remaining: total.saturating_sub(downloaded),
            session_id: self.session_id.clone(),
            start_time: iso(&self.start_time),
            current_prompt: self.prompt.clone(),
        }
    }

    /// Forget everything and start a new session identity.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.downloaded_in_session.clear();
        self.prompt.clear();
        self.session_id = new_session_id();
        self.start_time = Utc::now();
        info!("Session cleared");
    }

    pub fn export(&mut self) -> SessionExport {
        self.refresh_prompt();
        let images: Vec<ExportedImage> = self
            .entries
            .values()
            .map(|entry| ExportedImage {
                id: entry.asset.id.clone(),
                url: entry.asset.url.clone(),
                prompt: entry.asset.prompt.clone(),
                filename: entry.asset.filename.clone(),
                added_at: iso(&entry.added_at),
                downloaded: entry.downloaded,
                downloaded_at: entry.downloaded_at.as_ref().map(iso),
            })
            .collect();

        let export = SessionExport {
            exported_at: iso(&Utc::now()),
            session_id: self.session_id.clone(),
            start_time: iso(&self.start_time),
            last_prompt: self.prompt.clone(),
            total_images: self.entries.len(),
            downloaded_count: self.downloaded_in_session.len(),
            images,
        };
        info!("Exported session data: {} images", export.total_images);
        export
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn iso(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::asset;
    use crate::model::MediaKind;

    struct FixedPrompts {
        input: Option<&'static str>,
        label: Option<&'static str>,
    }

    impl PromptSource for FixedPrompts {
        fn input_prompt(&self) -> Option<String> {
            self.input.map(str::to_string)
        }

        fn label_prompt(&self) -> Option<String> {
            self.label.map(str::to_string)
        }
    }

    #[test]
    fn test_add_is_noop_for_known_id() {
        let mut session = SessionTracker::default();
        assert!(session.add(asset("a", MediaKind::Image)));
        assert!(!session.add(asset("a", MediaKind::Image)));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_prompt_resolution_order() {
        let mut session = SessionTracker::new(Box::new(FixedPrompts {
            input: Some("  typed prompt "),
            label: Some("label prompt"),
        }));
        session.add(asset("a", MediaKind::Image));
        assert_eq!(session.get("a").unwrap().asset.prompt, "typed prompt");

        session.set_prompt_source(Box::new(FixedPrompts {
            input: Some(""),
            label: Some("label prompt"),
        }));
        session.add(asset("b", MediaKind::Image));
        assert_eq!(session.get("b").unwrap().asset.prompt, "label prompt");

        session.set_prompt_source(Box::new(NoPromptSource));
        session.add(asset("c", MediaKind::Image));
        assert_eq!(session.get("c").unwrap().asset.prompt, "label prompt");
    }

    #[test]
    fn test_own_prompt_is_kept() {
        let mut session = SessionTracker::new(Box::new(FixedPrompts {
            input: Some("page prompt"),
            label: None,
        }));
        let mut item = asset("a", MediaKind::Image);
        item.prompt = "own prompt".to_string();
        session.add(item);
        assert_eq!(session.get("a").unwrap().asset.prompt, "own prompt");
        assert_eq!(session.current_prompt(), "page prompt");
    }

    #[test]
    fn test_mark_downloaded_updates_stats_and_backlog() {
        let mut session = SessionTracker::default();
        session.add(asset("a", MediaKind::Image));
        session.add(asset("b", MediaKind::Image));
        session.mark_downloaded("a");

        let stats = session.stats();
        assert_eq!((stats.total, stats.downloaded, stats.remaining), (2, 1, 1));
        let entry = session.get("a").unwrap();
        assert!(entry.downloaded);
        assert!(entry.downloaded_at.is_some());

        let backlog: Vec<String> = session.undownloaded().into_iter().map(|a| a.id).collect();
        assert_eq!(backlog, vec!["b"]);
    }

    #[test]
    fn test_reset_mints_new_session() {
        let mut session = SessionTracker::default();
        let first_id = session.session_id().to_string();
        session.add(asset("a", MediaKind::Image));
        session.mark_downloaded("a");
        session.reset();

        assert_ne!(session.session_id(), first_id);
        assert!(session.is_empty());
        assert_eq!(session.stats().downloaded, 0);
    }

    #[test]
    fn test_export_document_shape() {
        let mut session = SessionTracker::default();
        session.add(asset("a", MediaKind::Image));
        session.add(asset("b", MediaKind::Image));
        session.mark_downloaded("b");

        let export = session.export();
        assert_eq!(export.total_images, 2);
        assert_eq!(export.downloaded_count, 1);
        assert!(export.file_name().starts_with("grok-imagine-session-"));

        let json = serde_json::to_value(&export).unwrap();
        for key in [
            "exportedAt",
            "sessionId",
            "startTime",
            "lastPrompt",
            "totalImages",
            "downloadedCount",
            "images",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert!(json["images"][0]["downloadedAt"].is_null());
        assert!(json["images"][1]["downloadedAt"].is_string());
        assert_eq!(json["images"][1]["downloaded"], true);
    }
}
