use std::sync::Arc;

use grok_harvest_core::aggregate::IngestReport;
use grok_harvest_core::observation::{ApiPostList, AssetRef, ScannedMedia, SubjectRecord};
use grok_harvest_core::session::PromptSource;
use grok_harvest_core::storage::{KvStore, MemoryKv};
use grok_harvest_core::{AppConfig, HarvestEngine, MediaKind};

const POST_A: &str = "aaaaaaaa-0000-4000-8000-000000000001";
const POST_B: &str = "bbbbbbbb-0000-4000-8000-000000000002";

fn asset_ref(id: &str, url: &str, kind: MediaKind) -> AssetRef {
    AssetRef {
        id: Some(id.to_string()),
        url: Some(url.to_string()),
        media_kind: Some(kind),
        ..Default::default()
    }
}

fn subject(id: &str, primary: Option<AssetRef>, derivatives: Vec<AssetRef>) -> SubjectRecord {
    SubjectRecord {
        id: Some(id.to_string()),
        primary_asset_ref: primary,
        derivative_refs: Some(derivatives),
        aux_derivative_refs: None,
    }
}

struct FixedPrompt(&'static str);

impl PromptSource for FixedPrompt {
    fn input_prompt(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

fn scanned(id: &str, url: &str) -> ScannedMedia {
    ScannedMedia {
        id: id.to_string(),
        url: url.to_string(),
    }
}

fn member_ids(engine: &HarvestEngine, group_id: &str) -> Vec<String> {
    engine
        .store()
        .group(group_id)
        .map(|g| g.items.iter().map(|a| a.id.clone()).collect())
        .unwrap_or_default()
}

fn engine_at(path: &str) -> HarvestEngine {
    HarvestEngine::new(&AppConfig::default(), Arc::new(MemoryKv::new()), path)
}

#[test]
fn test_collection_scenario_builds_secondary_group_and_edge() {
    let mut engine = engine_at("/imagine/favorites");
    let batch = vec![subject(
        "A",
        Some(asset_ref("A", "u1", MediaKind::Image)),
        vec![asset_ref("B", "u2", MediaKind::Video)],
    )];

    let report = engine.ingest(batch);
    assert_eq!(report.subjects, 1);
    assert_eq!(report.skipped, 0);

    assert_eq!(member_ids(&engine, "A"), vec!["A", "B"]);
    assert_eq!(member_ids(&engine, "B"), vec!["A", "B"]);
    assert_eq!(engine.store().parent_of("B"), Some("A"));
    assert_eq!(engine.group_for("B").unwrap().id, "B");
}

#[test]
fn test_reingesting_same_batch_changes_nothing() {
    let mut engine = engine_at("/imagine/favorites");
    let batch = vec![
        subject(
            "A",
            Some(asset_ref("A", "u1", MediaKind::Image)),
            vec![asset_ref("B", "u2", MediaKind::Video)],
        ),
        subject("C", Some(asset_ref("C", "u3", MediaKind::Image)), vec![]),
    ];

    engine.ingest(batch.clone());
    let before: Vec<_> = engine.store().groups().cloned().collect();

    let report = engine.ingest(batch);
    let after: Vec<_> = engine.store().groups().cloned().collect();
    assert_eq!(report.inserted, 0);
    assert_eq!(before, after);
}

#[test]
fn test_later_observation_does_not_overwrite_metadata() {
    let mut engine = engine_at("/imagine/favorites");
    engine.ingest(vec![subject(
        "A",
        Some(asset_ref("A", "https://preview/a.jpg", MediaKind::Image)),
        vec![],
    )]);
    engine.ingest(vec![subject(
        "A",
        Some(asset_ref("A", "https://other/a.jpg", MediaKind::Image)),
        vec![],
    )]);

    let group = engine.store().group("A").unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(group.items[0].url, "https://preview/a.jpg");
}

#[test]
fn test_single_subject_context_pins_first_root_and_skips_secondary_groups() {
    let mut engine = engine_at(&format!("/imagine/post/{}", POST_A));
    let batch = vec![
        subject(
            POST_A,
            Some(asset_ref(POST_A, "u1", MediaKind::Image)),
            vec![asset_ref("vid-1", "u2", MediaKind::Video)],
        ),
        subject(
            "unrelated",
            Some(asset_ref("unrelated", "u3", MediaKind::Image)),
            vec![],
        ),
    ];
    engine.ingest(batch);

    assert_eq!(engine.store().group_count(), 1);
    assert_eq!(member_ids(&engine, POST_A), vec![POST_A, "vid-1", "unrelated"]);
    assert!(engine.store().group("vid-1").is_none());
    assert_eq!(engine.store().parent_of("vid-1"), None);
}

#[test]
fn test_post_path_without_id_is_a_collection() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let mut engine = HarvestEngine::new(&AppConfig::default(), kv, "/imagine/post/");
    assert!(engine.store().pinned_root().is_none());

    engine.ingest(vec![subject(
        "first",
        Some(asset_ref("first", "u1", MediaKind::Image)),
        vec![],
    )]);
    assert!(engine.store().group("first").is_some());
}

#[test]
fn test_navigating_between_posts_keeps_root() {
    let mut engine = engine_at(&format!("/imagine/post/{}", POST_A));
    engine.ingest_scan(
        &[ScannedMedia {
            id: POST_A.to_string(),
            url: "https://img/a.jpg".to_string(),
        }],
        &[],
    );

    engine.enter_context(&format!("/imagine/post/{}", POST_B));
    engine.ingest_scan(
        &[],
        &[ScannedMedia {
            id: POST_B.to_string(),
            url: "https://vid/b.mp4".to_string(),
        }],
    );

    assert_eq!(engine.store().pinned_root(), Some(POST_A));
    assert_eq!(member_ids(&engine, POST_A), vec![POST_A, POST_B]);
    let group = engine.store().group(POST_A).unwrap();
    assert_eq!(group.items[1].filename, format!("{}.mp4", POST_B));
    assert_eq!(engine.backlog_count(), 2);
}

#[test]
fn test_leaving_post_context_unpins_root() {
    let mut engine = engine_at(&format!("/imagine/post/{}", POST_A));
    assert!(engine.store().pinned_root().is_none());
    engine.ingest(vec![subject(
        POST_A,
        Some(asset_ref(POST_A, "u1", MediaKind::Image)),
        vec![],
    )]);
    assert_eq!(engine.store().pinned_root(), Some(POST_A));

    engine.enter_context("/imagine/favorites");
    assert!(engine.store().pinned_root().is_none());
}

#[test]
fn test_first_observed_subject_wins_over_path_id() {
    let mut engine = engine_at(&format!("/imagine/post/{}", POST_A));
    engine.ingest(vec![
        subject("first", Some(asset_ref("first", "u0", MediaKind::Image)), vec![]),
        subject(POST_A, Some(asset_ref(POST_A, "u1", MediaKind::Image)), vec![]),
    ]);

    assert_eq!(engine.store().pinned_root(), Some("first"));
    assert_eq!(member_ids(&engine, "first"), vec!["first", POST_A]);
    assert_eq!(engine.backlog_count(), 2);
}

#[test]
fn test_derivative_with_parent_id_gets_no_secondary_group() {
    let mut engine = engine_at("/imagine/favorites");
    engine.ingest(vec![subject(
        "A",
        Some(asset_ref("A", "u1", MediaKind::Image)),
        vec![asset_ref("A", "u1-video", MediaKind::Video)],
    )]);

    assert_eq!(engine.store().group_count(), 1);
    assert_eq!(member_ids(&engine, "A"), vec!["A"]);
    assert_eq!(engine.store().parent_of("A"), None);
}

#[test]
fn test_malformed_subject_is_skipped_rest_processed() {
    let mut engine = engine_at("/imagine/favorites");
    let broken = SubjectRecord {
        id: Some("X".to_string()),
        primary_asset_ref: Some(AssetRef {
            id: Some("X".to_string()),
            url: None,
            media_kind: Some(MediaKind::Image),
            ..Default::default()
        }),
        ..Default::default()
    };
    let report = engine.ingest(vec![
        broken,
        subject("C", Some(asset_ref("C", "u3", MediaKind::Image)), vec![]),
    ]);

    assert_eq!(report.skipped, 1);
    assert_eq!(report.subjects, 1);
    assert!(engine.store().group("X").is_none());
    assert!(engine.store().group("C").is_some());
}

#[test]
fn test_api_payload_with_both_derivative_lists() {
    let mut engine = engine_at("/imagine/favorites");
    let payload: ApiPostList = serde_json::from_str(
        r#"{"posts": [{
            "id": "p1",
            "mediaUrl": "https://img/p1.jpg",
            "mediaType": "MEDIA_POST_TYPE_IMAGE",
            "createTime": "2024-01-01T10:00:00Z",
            "modelName": "imagine",
            "originalPrompt": "red fox",
            "childPosts": [{"id": "v1", "mediaUrl": "https://vid/v1.mp4", "mediaType": "MEDIA_POST_TYPE_VIDEO"}],
            "videos": [
                {"id": "v1", "mediaUrl": "https://vid/v1.mp4", "mediaType": "MEDIA_POST_TYPE_VIDEO"},
                {"id": "v2", "mediaUrl": "https://vid/v2.mp4", "mediaType": "MEDIA_POST_TYPE_VIDEO"}
            ]
        }]}"#,
    )
    .unwrap();

    engine.ingest_api_response(&payload);

    assert_eq!(member_ids(&engine, "p1"), vec!["p1", "v1", "v2"]);
    assert_eq!(member_ids(&engine, "v2"), vec!["p1", "v2"]);
    let video = &engine.store().group("p1").unwrap().items[1];
    assert_eq!(video.prompt, "red fox");
    assert_eq!(video.filename, "grok_2024-01-01T10-00-00_v1_imagine_red_fox.mp4");
}

#[test]
fn test_reset_store_rebuilds_from_last_batch() {
    let mut engine = engine_at("/imagine/favorites");
    engine.ingest(vec![subject(
        "A",
        Some(asset_ref("A", "u1", MediaKind::Image)),
        vec![asset_ref("B", "u2", MediaKind::Video)],
    )]);
    assert_eq!(engine.ingest_scan(&[], &[]), IngestReport::default());

    let report = engine.reset_store().expect("last batch is cached");
    assert_eq!(report.subjects, 1);
    assert_eq!(member_ids(&engine, "A"), vec!["A", "B"]);
    assert_eq!(engine.store().group_count(), 2);
}

#[test]
fn test_reset_store_without_cached_batch_leaves_empty_store() {
    let mut engine = engine_at("/imagine/favorites");
    assert!(engine.reset_store().is_none());
    assert!(engine.store().is_empty());
}

#[test]
fn test_created_posts_go_to_session() {
    let mut engine = engine_at("/imagine");
    let created: grok_harvest_core::observation::ApiCreatedPost = serde_json::from_str(
        r#"{"post": {"id": "gen-1", "mediaUrl": "https://img/gen-1.jpg", "prompt": "a castle"}}"#,
    )
    .unwrap();
    let post = created.post.unwrap();

    assert!(engine.ingest_created_post(&post));
    assert!(!engine.ingest_created_post(&post));

    let missing_media: grok_harvest_core::observation::ApiPost =
        serde_json::from_str(r#"{"id": "gen-2"}"#).unwrap();
    assert!(!engine.ingest_created_post(&missing_media));

    let entry = engine.session().get("gen-1").unwrap();
    assert!(entry.asset.filename.ends_with("_gen-1_a_castle.jpg"));
    assert!(entry.asset.filename.starts_with("grok_"));
    assert_eq!(engine.backlog_count(), 1);
    assert_eq!(engine.stats_for_context().label, "Download Session");
}

#[test]
fn test_session_scan_tags_images_with_visible_prompt() {
    let mut engine = engine_at("/imagine").with_prompt_source(Box::new(FixedPrompt("  misty harbor ")));
    let images = vec![
        scanned("img-1", "https://img/img-1.jpg"),
        scanned("", "https://img/no-id.jpg"),
        scanned("img-1", "https://img/img-1.jpg"),
        scanned("img-2", ""),
    ];

    assert_eq!(engine.ingest_session_scan(&images), 1);
    assert_eq!(engine.ingest_session_scan(&images), 0);

    let entry = engine.session().get("img-1").unwrap();
    assert_eq!(entry.asset.prompt, "misty harbor");
    assert_eq!(entry.asset.kind, MediaKind::Image);
    assert!(entry.asset.filename.starts_with("grok_"));
    assert!(entry.asset.filename.ends_with("_img-1_misty_harbor.jpg"));
    assert_eq!(engine.backlog_count(), 1);
}

#[test]
fn test_session_scan_without_prompt_uses_placeholder() {
    let mut engine = engine_at("/imagine");
    let uuid_url = format!("https://img/users/u/generated/{}/image.jpg", POST_A);

    assert_eq!(engine.ingest_session_scan(&[scanned("", &uuid_url)]), 1);

    let entry = engine.session().get(POST_A).unwrap();
    assert_eq!(entry.asset.prompt, "");
    assert!(entry.asset.filename.ends_with(&format!("_{}_no-prompt.jpg", POST_A)));
}

#[test]
fn test_page_scan_takes_id_from_url_when_missing() {
    let mut engine = engine_at(&format!("/imagine/post/{}", POST_A));
    let report = engine.ingest_scan(
        &[scanned("", &format!("https://img/{}/image.jpg", POST_A))],
        &[
            scanned("", &format!("https://vid/{}/video.mp4", POST_B)),
            scanned("", "https://vid/opaque.mp4"),
        ],
    );

    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(member_ids(&engine, POST_A), vec![POST_A, POST_B]);
}
