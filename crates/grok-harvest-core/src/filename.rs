use crate::model::MediaKind;

const ELLIPSIS: &str = "...";

/// Inputs to the unified filename rule. Empty strings count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameParts<'a> {
    pub timestamp: &'a str,
    pub id: &'a str,
    pub model: &'a str,
    pub prompt: &'a str,
    pub ext: &'a str,
}

/// Builds `prefix_timestamp_id[_model][_prompt].ext` names.
#[derive(Debug, Clone)]
pub struct FilenameBuilder {
    prefix: String,
    prompt_max_len: usize,
}

impl Default for FilenameBuilder {
    fn default() -> Self {
        Self::new("grok", 100)
    }
}

impl FilenameBuilder {
    pub fn new(prefix: &str, prompt_max_len: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            prompt_max_len: prompt_max_len.max(ELLIPSIS.len() + 1),
        }
    }

    pub fn from_config(config: &crate::AppConfig) -> Self {
        Self::new(&config.filename_prefix, config.prompt_max_len)
    }

    /// Sanitizes model and prompt, bounds the prompt, then joins the parts.
    pub fn build(&self, parts: FilenameParts<'_>) -> String {
        let model = sanitize_for_filename(parts.model);
        let prompt = truncate_chars(&sanitize_for_filename(parts.prompt), self.prompt_max_len);

        let mut segments: Vec<&str> = vec![
            self.prefix.as_str(),
            non_empty_or(parts.timestamp, "unknown"),
            non_empty_or(parts.id, "unknown"),
        ];
        if !model.is_empty() {
            segments.push(model.as_str());
        }
        if !prompt.is_empty() {
            segments.push(prompt.as_str());
        }
        format!("{}.{}", segments.join("_"), parts.ext)
    }

    /// Filename for an observed asset whose create time is an ISO-8601 string.
    pub fn for_asset(
        &self,
        create_time: &str,
        id: &str,
        model: &str,
        prompt: &str,
        kind: MediaKind,
        mime_type: Option<&str>,
    ) -> String {
        let timestamp = filename_timestamp(create_time);
        self.build(FilenameParts {
            timestamp: &timestamp,
            id,
            model,
            prompt,
            ext: extension_for(kind, mime_type),
        })
    }
}

/// Replace characters that are illegal on common filesystems and collapse whitespace runs.
pub fn sanitize_for_filename(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' => '_',
            other => other,
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut in_whitespace = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

/// Second-resolution timestamp with `:` swapped for `-`; `unknown` when absent.
pub fn filename_timestamp(create_time: &str) -> String {
    let trimmed = create_time.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    trimmed.chars().take(19).collect::<String>().replace(':', "-")
}

pub fn extension_for(kind: MediaKind, mime_type: Option<&str>) -> &'static str {
    match mime_type {
        Some("video/mp4") => "mp4",
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        _ => match kind {
            MediaKind::Video => "mp4",
            MediaKind::Image => "jpg",
        },
    }
}

fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let kept: String = input.chars().take(max - ELLIPSIS.len()).collect();
    format!("{}{}", kept, ELLIPSIS)
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
