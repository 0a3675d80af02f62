use crate::aggregate::{AggregationScope, Aggregator, IngestReport};
use crate::config::AppConfig;
use crate::context::{ContextKind, ViewContext};
use crate::filename::{FilenameBuilder, FilenameParts};
use crate::model::{Asset, Group, MediaKind, StoreStats};
use crate::observation::{ApiPost, ApiPostList, ScannedMedia, SubjectRecord};
use crate::progress::ProgressReporter;
use crate::retrieval::{self, Orchestrator, RetrievalOutcome, Retriever, RunControl, RunOutcome};
use crate::session::{PromptSource, SessionExport, SessionStats, SessionTracker};
use crate::storage::{CompletedSet, KvStore, MediaStore};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the presentation layer shows for the active context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub path: String,
    pub label: String,
    pub backlog: usize,
    pub store: StoreStats,
    pub session: SessionStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupRetrieval {
    pub succeeded: usize,
    pub failed: usize,
}

/// Owns every piece of mutable state for one browsing context: group table,
/// derivation edges, completion history, session and the run orchestrator.
pub struct HarvestEngine {
    context: ViewContext,
    store: MediaStore,
    completed: CompletedSet,
    session: SessionTracker,
    namer: FilenameBuilder,
    orchestrator: Orchestrator,
    last_batch: Option<Vec<SubjectRecord>>,
}

impl HarvestEngine {
    pub fn new(config: &AppConfig, kv: Arc<dyn KvStore>, path: &str) -> Self {
        let context = ViewContext::from_path(path);
        let mut store = MediaStore::new(kv.clone());
        store.load(context.key());

        Self {
            context,
            store,
            completed: CompletedSet::load(kv),
            session: SessionTracker::default(),
            namer: FilenameBuilder::from_config(config),
            orchestrator: Orchestrator::new(config.retrieval_delay()),
            last_batch: None,
        }
    }

    pub fn with_prompt_source(mut self, prompt_source: Box<dyn PromptSource>) -> Self {
        self.session.set_prompt_source(prompt_source);
        self
    }

    pub fn context(&self) -> &ViewContext {
        &self.context
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub fn completed(&self) -> &CompletedSet {
        &self.completed
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    /// Attach to the browsing subject at `path`.
    ///
    /// Moving between posts keeps the pinned root and the in-memory store; any
    /// other change swaps in the snapshot stored for the new context. The root is
    /// pinned by the first subject observed, not taken from the path.
    pub fn enter_context(&mut self, path: &str) {
        let next = ViewContext::from_path(path);
        if next == self.context {
            return;
        }

        let post_to_post = self.context.kind() == ContextKind::SingleSubject
            && next.kind() == ContextKind::SingleSubject;
        if !post_to_post {
            self.store.clear();
            self.store.load(next.key());
        }
        if next.kind() != ContextKind::SingleSubject {
            self.store.unpin_root();
        }

        debug!(
            "Entered {} (root: {:?})",
            next.key(),
            self.store.pinned_root()
        );
        self.context = next;
    }

    fn scope(&self) -> AggregationScope {
        match self.context.kind() {
            ContextKind::SingleSubject => AggregationScope::PinnedRoot,
            ContextKind::Collection | ContextKind::Ephemeral => AggregationScope::PerSubject,
        }
    }

    // ── Ingestion ────────────────────────────────────────────────

    /// Merge a batch of subject records under the active context's rules.
    pub fn ingest(&mut self, batch: Vec<SubjectRecord>) -> IngestReport {
        let scope = self.scope();
        let report =
            Aggregator::new(&mut self.store, &self.namer, scope, self.context.key()).ingest(&batch);
        self.last_batch = Some(batch);
        report
    }

    pub fn ingest_api_response(&mut self, response: &ApiPostList) -> IngestReport {
        self.ingest(response.to_batch())
    }

    /// Fold a page scan into the pinned root. Falls back to the context's post id.
    pub fn ingest_scan(&mut self, images: &[ScannedMedia], videos: &[ScannedMedia]) -> IngestReport {
        let root_hint = match self.store.pinned_root().or(self.context.post_id()) {
            Some(root) => root.to_string(),
            None => {
                debug!("Ignoring page scan outside a single-post context");
                return IngestReport::default();
            }
        };
        Aggregator::new(
            &mut self.store,
            &self.namer,
            AggregationScope::PinnedRoot,
            self.context.key(),
        )
        .ingest_scan(&root_hint, images, videos)
    }

    /// Track a freshly generated post in the session. Posts without id or media are skipped.
    pub fn ingest_created_post(&mut self, post: &ApiPost) -> bool {
        let (id, url) = match (post.id.as_deref(), post.media_url.as_deref()) {
            (Some(id), Some(url)) if !id.is_empty() && !url.is_empty() => (id, url),
            _ => {
                debug!("Skipping created post without id or media url");
                return false;
            }
        };

        let prompt = post.effective_prompt().unwrap_or_default();
        let create_time = post
            .create_time
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let filename = self.session_filename(id, &prompt);

        self.session.add(Asset {
            id: id.to_string(),
            url: url.to_string(),
            create_time,
            model_name: post.model_name.clone().unwrap_or_default(),
            prompt,
            kind: MediaKind::Image,
            filename,
        })
    }

    /// Track images found on the prompt page in the session, tagged with the
    /// prompt visible at scan time. Returns how many were new.
    pub fn ingest_session_scan(&mut self, images: &[ScannedMedia]) -> usize {
        let mut added = 0;
        for media in images {
            let id = match media.resolved_id() {
                Some(id) if !media.url.is_empty() => id,
                _ => {
                    debug!("Skipping scanned image without id or url");
                    continue;
                }
            };
            if self.session.contains(id) {
                continue;
            }

            self.session.refresh_prompt();
            let prompt = self.session.current_prompt().to_string();
            let filename = self.session_filename(id, &prompt);
            let asset = Asset {
                id: id.to_string(),
                url: media.url.clone(),
                create_time: Utc::now().to_rfc3339(),
                model_name: String::new(),
                prompt,
                kind: MediaKind::Image,
                filename,
            };
            if self.session.add(asset) {
                added += 1;
            }
        }
        if added > 0 {
            info!("Session scan tracked {} new images", added);
        }
        added
    }

    /// Session filenames are stamped at observation time and always `.jpg`.
    fn session_filename(&self, id: &str, prompt: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        self.namer.build(FilenameParts {
            timestamp: &timestamp,
            id,
            model: "",
            prompt: if prompt.is_empty() { "no-prompt" } else { prompt },
            ext: "jpg",
        })
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Group shown for `id`: its own, else its parent's through the derivation edge.
    pub fn group_for(&self, id: &str) -> Option<&Group> {
        self.store.group_for(id)
    }

    /// Outstanding assets in scope, in discovery order, unique by id.
    pub fn compute_backlog(&self) -> Vec<Asset> {
        match self.context.kind() {
            ContextKind::Ephemeral => self.session.undownloaded(),
            ContextKind::SingleSubject => {
                let root = self.store.pinned_root().or(self.context.post_id());
                let groups = root.and_then(|id| self.store.group(id));
                self.outstanding(groups.into_iter())
            }
            ContextKind::Collection => self.outstanding(self.store.groups()),
        }
    }

    fn outstanding<'a, I>(&self, groups: I) -> Vec<Asset>
    where
        I: Iterator<Item = &'a Group>,
    {
        let mut seen = HashSet::new();
        groups
            .flat_map(|group| group.items.iter())
            .filter(|item| !self.completed.contains(&item.id))
            .filter(|item| seen.insert(item.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn backlog_count(&self) -> usize {
        self.compute_backlog().len()
    }

    pub fn stats_for_context(&self) -> ContextStats {
        ContextStats {
            path: self.context.key().to_string(),
            label: self.context.run_label().to_string(),
            backlog: self.backlog_count(),
            store: self.store.stats(self.completed.len()),
            session: self.session.stats(),
        }
    }

    // ── Retrieval ────────────────────────────────────────────────

    pub fn run_control(&self) -> RunControl {
        self.orchestrator.control()
    }

    pub fn run_state(&self) -> retrieval::RunState {
        self.orchestrator.state()
    }

    /// Retrieve the backlog sequentially. Rejected if already running or nothing is outstanding.
    pub async fn start_run(
        &mut self,
        retriever: &dyn Retriever,
        reporter: &dyn ProgressReporter,
    ) -> RunOutcome {
        let backlog = self.compute_backlog();
        let ephemeral = self.context.kind() == ContextKind::Ephemeral;
        let completed = &mut self.completed;
        let session = &mut self.session;

        self.orchestrator
            .run(backlog, retriever, reporter, |asset| {
                completed.mark(&asset.id);
                if ephemeral {
                    session.mark_downloaded(&asset.id);
                }
            })
            .await
    }

    pub fn cancel_run(&self) -> bool {
        self.orchestrator.cancel()
    }

    /// Retrieve one asset on demand, outside any bulk run.
    pub async fn retrieve_one(&mut self, asset: &Asset, retriever: &dyn Retriever) -> RetrievalOutcome {
        let outcome = retrieval::retrieve_item(retriever, asset).await;
        if outcome.is_success() {
            self.completed.mark(&asset.id);
            if self.session.contains(&asset.id) {
                self.session.mark_downloaded(&asset.id);
            }
        }
        outcome
    }

    /// Retrieve every member of the group shown for `id`, one at a time.
    pub async fn retrieve_group(&mut self, id: &str, retriever: &dyn Retriever) -> GroupRetrieval {
        let members = match self.group_for(id) {
            Some(group) => group.items.clone(),
            None => return GroupRetrieval::default(),
        };

        let mut result = GroupRetrieval::default();
        for asset in &members {
            if self.retrieve_one(asset, retriever).await.is_success() {
                result.succeeded += 1;
            } else {
                result.failed += 1;
            }
        }
        result
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Clear the store, persist the empty state, then rebuild from the last batch seen.
    pub fn reset_store(&mut self) -> Option<IngestReport> {
        self.store.clear();
        self.store.save(self.context.key());
        info!("Media store reset for {}", self.context.key());

        let batch = self.last_batch.take()?;
        Some(self.ingest(batch))
    }

    pub fn reset_history(&mut self) {
        self.completed.clear();
    }

    pub fn reset_session(&mut self) {
        self.session.reset();
    }

    pub fn dedupe(&mut self) -> usize {
        let removed = self.store.dedupe_all();
        self.store.save(self.context.key());
        removed
    }

    pub fn export_session(&mut self) -> SessionExport {
        self.session.export()
    }
}
