//! Merges observation batches into the media store.

use crate::filename::FilenameBuilder;
use crate::model::{Asset, MediaKind};
use crate::observation::{AssetSpec, ScannedMedia, Subject, SubjectRecord};
use crate::storage::MediaStore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationScope {
    /// Everything folds into the first subject id seen (single-subject contexts).
    PinnedRoot,
    /// Each subject is its own root; derivatives also get a secondary group.
    PerSubject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub subjects: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub duplicates_removed: usize,
}

pub struct Aggregator<'a> {
    store: &'a mut MediaStore,
    namer: &'a FilenameBuilder,
    scope: AggregationScope,
    context_key: &'a str,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        store: &'a mut MediaStore,
        namer: &'a FilenameBuilder,
        scope: AggregationScope,
        context_key: &'a str,
    ) -> Self {
        Self {
            store,
            namer,
            scope,
            context_key,
        }
    }

    /// Merge a batch in arrival order, then dedupe and persist.
    ///
    /// Records that fail validation are skipped; the rest still merge.
    /// Insertion is an id-presence check only, so re-ingesting a batch is a no-op.
    pub fn ingest(&mut self, batch: &[SubjectRecord]) -> IngestReport {
        info!("Processing {} subjects", batch.len());
        let mut report = IngestReport::default();

        for record in batch {
            match record.validate() {
                Ok(subject) => {
                    report.subjects += 1;
                    report.inserted += self.merge_subject(&subject);
                }
                Err(e) => {
                    warn!("Skipping subject record: {}", e);
                    report.skipped += 1;
                }
            }
        }

        self.finish(report)
    }

    /// Fold scanned page media into the pinned root (pinning `root_hint` if none is pinned).
    pub fn ingest_scan(
        &mut self,
        root_hint: &str,
        images: &[ScannedMedia],
        videos: &[ScannedMedia],
    ) -> IngestReport {
        let root = self.store.pin_root(root_hint).to_string();
        debug!(
            "Scan found {} images and {} videos for root {}",
            images.len(),
            videos.len(),
            root
        );

        let mut report = IngestReport::default();
        let scanned = images
            .iter()
            .map(|m| (m, MediaKind::Image))
            .chain(videos.iter().map(|m| (m, MediaKind::Video)));
        for (media, kind) in scanned {
            let id = match media.resolved_id() {
                Some(id) if !media.url.is_empty() => id,
                _ => {
                    report.skipped += 1;
                    continue;
                }
            };
            if self.store.upsert(&root, scanned_asset(id, &media.url, kind)) {
                report.inserted += 1;
            }
        }

        if let Some(group) = self.store.group(&root) {
            debug!("Root {} now has {} items", root, group.len());
        }
        self.finish(report)
    }

    fn finish(&mut self, mut report: IngestReport) -> IngestReport {
        report.duplicates_removed = self.store.dedupe_all();
        self.store.save(self.context_key);
        report
    }

    fn resolve_root(&mut self, subject_id: &str) -> String {
        match self.scope {
            AggregationScope::PinnedRoot => self.store.pin_root(subject_id).to_string(),
            AggregationScope::PerSubject => subject_id.to_string(),
        }
    }

    fn merge_subject(&mut self, subject: &Subject) -> usize {
        let root = self.resolve_root(&subject.id);
        let mut inserted = 0;

        let primary = subject
            .primary
            .as_ref()
            .map(|spec| build_asset(self.namer, spec, None));
        if let Some(item) = &primary {
            if self.store.upsert(&root, item.clone()) {
                debug!("Added main item {} to {}", item.id, root);
                inserted += 1;
            }
        }

        for spec in &subject.derivatives {
            let item = build_asset(self.namer, spec, subject.primary.as_ref());
            if self.store.upsert(&root, item.clone()) {
                debug!("Added derivative {} to {}", item.id, root);
                inserted += 1;
            }

            // A pinned root already holds the pair; a derivative sharing its parent's id has no group of its own.
            if self.scope == AggregationScope::PinnedRoot || item.id == subject.id {
                continue;
            }
            if let Some(parent_item) = &primary {
                if self.store.upsert(&item.id, parent_item.clone()) {
                    inserted += 1;
                }
            }
            let derivative_id = item.id.clone();
            if self.store.upsert(&derivative_id, item) {
                inserted += 1;
            }
            self.store.record_edge(&derivative_id, &subject.id);
        }

        inserted
    }
}

/// Build an asset, inheriting time, model and prompt from `parent` where `spec` has none.
pub fn build_asset(namer: &FilenameBuilder, spec: &AssetSpec, parent: Option<&AssetSpec>) -> Asset {
    let create_time = inherit(&spec.create_time, parent.map(|p| p.create_time.as_str()));
    let model_name = inherit(&spec.model_name, parent.map(|p| p.model_name.as_str()));
    let prompt = inherit(&spec.prompt, parent.map(|p| p.prompt.as_str()));

    let filename = namer.for_asset(
        &create_time,
        &spec.id,
        &model_name,
        &prompt,
        spec.kind,
        spec.mime_type.as_deref(),
    );

    Asset {
        id: spec.id.clone(),
        url: spec.url.clone(),
        create_time,
        model_name,
        prompt,
        kind: spec.kind,
        filename,
    }
}

fn inherit(own: &str, parent: Option<&str>) -> String {
    if own.is_empty() {
        parent.unwrap_or_default().to_string()
    } else {
        own.to_string()
    }
}

fn scanned_asset(id: &str, url: &str, kind: MediaKind) -> Asset {
    let ext = match kind {
        MediaKind::Video => "mp4",
        MediaKind::Image => "jpg",
    };
    Asset {
        id: id.to_string(),
        url: url.to_string(),
        create_time: String::new(),
        model_name: String::new(),
        prompt: String::new(),
        kind,
        filename: format!("{}.{}", id, ext),
    }
}
