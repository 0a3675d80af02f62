//! Observation schema at the ingestion boundary.
//!
//! Records arrive with optional fields from two capture paths. They are decoded
//! leniently into [`SubjectRecord`] and then validated into [`Subject`]; a record
//! that fails validation is rejected as a whole instead of being coerced.

use crate::context::extract_post_id;
use crate::error::Error;
use crate::model::MediaKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

const API_VIDEO_MEDIA_TYPE: &str = "MEDIA_POST_TYPE_VIDEO";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: Option<String>,
    pub url: Option<String>,
    pub create_time: Option<String>,
    pub model_name: Option<String>,
    pub prompt: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub id: Option<String>,
    pub primary_asset_ref: Option<AssetRef>,
    pub derivative_refs: Option<Vec<AssetRef>>,
    pub aux_derivative_refs: Option<Vec<AssetRef>>,
}

/// A validated asset reference: id, url and kind are guaranteed present.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSpec {
    pub id: String,
    pub url: String,
    pub create_time: String,
    pub model_name: String,
    pub prompt: String,
    pub kind: MediaKind,
    pub mime_type: Option<String>,
}

/// A validated subject record. Derivatives from both source lists are merged in
/// arrival order (primary list first); duplicates are left for the id check.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: String,
    pub primary: Option<AssetSpec>,
    pub derivatives: Vec<AssetSpec>,
}

impl AssetRef {
    pub fn validate(&self) -> Result<AssetSpec, Error> {
        let id = required(&self.id, "asset id")?;
        let url = required(&self.url, "asset url")
            .map_err(|_| Error::InvalidRecord(format!("asset {} has no url", id)))?;
        let kind = self
            .media_kind
            .ok_or_else(|| Error::InvalidRecord(format!("asset {} has no media kind", id)))?;

        Ok(AssetSpec {
            id,
            url,
            create_time: optional(&self.create_time),
            model_name: optional(&self.model_name),
            prompt: optional(&self.prompt),
            kind,
            mime_type: self.mime_type.clone().filter(|m| !m.trim().is_empty()),
        })
    }
}

impl SubjectRecord {
    pub fn validate(&self) -> Result<Subject, Error> {
        let id = required(&self.id, "subject id")?;
        let primary = self
            .primary_asset_ref
            .as_ref()
            .map(AssetRef::validate)
            .transpose()
            .map_err(|e| Error::InvalidRecord(format!("subject {}: {}", id, e)))?;

        let derivatives = self
            .derivative_refs
            .iter()
            .flatten()
            .chain(self.aux_derivative_refs.iter().flatten())
            .map(AssetRef::validate)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidRecord(format!("subject {}: {}", id, e)))?;

        Ok(Subject {
            id,
            primary,
            derivatives,
        })
    }
}

/// Decode a JSON array of subject records. Elements that do not have the record
/// shape are skipped with a warning; a document that is not an array is an error.
pub fn parse_batch(json: &str) -> Result<Vec<SubjectRecord>, Error> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<SubjectRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed subject record at index {}: {}", index, e),
        }
    }
    Ok(records)
}

fn required(value: &Option<String>, what: &str) -> Result<String, Error> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::InvalidRecord(format!("missing {}", what))),
    }
}

fn optional(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

// ── Site API payloads ────────────────────────────────────────────

/// Response body of the site's post listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPostList {
    #[serde(default)]
    pub posts: Vec<ApiPost>,
}

/// Response body of the post creation endpoint used on generation pages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCreatedPost {
    pub post: Option<ApiPost>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPost {
    pub id: Option<String>,
    pub media_url: Option<String>,
    pub hd_media_url: Option<String>,
    pub media_type: Option<String>,
    pub mime_type: Option<String>,
    pub create_time: Option<String>,
    pub model_name: Option<String>,
    pub prompt: Option<String>,
    pub original_prompt: Option<String>,
    pub child_posts: Option<Vec<ApiPost>>,
    pub videos: Option<Vec<ApiPost>>,
}

impl ApiPost {
    pub fn is_video(&self) -> bool {
        self.media_type.as_deref() == Some(API_VIDEO_MEDIA_TYPE)
    }

    /// `originalPrompt` wins over `prompt`; blank values count as absent.
    pub fn effective_prompt(&self) -> Option<String> {
        [&self.original_prompt, &self.prompt]
            .into_iter()
            .flatten()
            .map(|p| p.trim())
            .find(|p| !p.is_empty())
            .map(str::to_string)
    }

    pub fn to_asset_ref(&self) -> AssetRef {
        let url = if self.is_video() {
            self.hd_media_url
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| self.media_url.clone())
        } else {
            self.media_url.clone()
        };

        AssetRef {
            id: self.id.clone(),
            url,
            create_time: self.create_time.clone(),
            model_name: self.model_name.clone(),
            prompt: self.effective_prompt(),
            media_kind: Some(if self.is_video() {
                MediaKind::Video
            } else {
                MediaKind::Image
            }),
            mime_type: self.mime_type.clone(),
        }
    }

    /// A post without `mediaUrl` contributes no primary asset, only derivatives.
    pub fn to_subject_record(&self) -> SubjectRecord {
        let has_media = self.media_url.as_deref().is_some_and(|u| !u.is_empty());
        SubjectRecord {
            id: self.id.clone(),
            primary_asset_ref: has_media.then(|| self.to_asset_ref()),
            derivative_refs: self
                .child_posts
                .as_ref()
                .map(|children| children.iter().map(ApiPost::to_asset_ref).collect()),
            aux_derivative_refs: self
                .videos
                .as_ref()
                .map(|videos| videos.iter().map(ApiPost::to_asset_ref).collect()),
        }
    }
}

impl ApiPostList {
    pub fn to_batch(&self) -> Vec<SubjectRecord> {
        self.posts.iter().map(ApiPost::to_subject_record).collect()
    }
}

/// A `{id, url}` pair found by a page scan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScannedMedia {
    #[serde(default)]
    pub id: String,
    pub url: String,
}

impl ScannedMedia {
    /// The scanned id, or the last UUID in the url when the page gave none.
    pub fn resolved_id(&self) -> Option<&str> {
        if !self.id.is_empty() {
            Some(self.id.as_str())
        } else {
            extract_post_id(&self.url)
        }
    }
}
