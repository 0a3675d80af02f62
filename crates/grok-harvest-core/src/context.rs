use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UUID_RE: Regex =
        Regex::new(r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}")
            .expect("valid uuid pattern");
    static ref MORE_LIKE_THIS_RE: Regex =
        Regex::new(r"/imagine/more/[a-f0-9-]+").expect("valid more-like-this pattern");
    static ref SINGLE_POST_RE: Regex =
        Regex::new(r"/imagine/post/([a-f0-9-]+)").expect("valid post pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// `/imagine`: the main prompt page.
    Prompt,
    /// `/imagine/more/{id}`: "more like this" generation.
    MoreLikeThis,
    Favorites,
    /// `/imagine/post/{id}`
    SinglePost,
    Other,
}

/// How the active context aggregates and scopes its backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Generation pages: assets live in the session only.
    Ephemeral,
    /// One pinned root collects everything observed.
    SingleSubject,
    /// Each subject is its own group.
    Collection,
}

/// The browsing subject the engine is currently attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
    path: String,
    page_type: PageType,
    post_id: Option<String>,
}

impl ViewContext {
    pub fn from_path(path: &str) -> Self {
        let page_type = detect_page_type(path);
        let post_id = match page_type {
            PageType::SinglePost => SINGLE_POST_RE
                .captures(path)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            _ => None,
        };
        Self {
            path: path.to_string(),
            page_type,
            post_id,
        }
    }

    /// Key that namespaces persisted state for this context.
    pub fn key(&self) -> &str {
        &self.path
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    pub fn post_id(&self) -> Option<&str> {
        self.post_id.as_deref()
    }

    pub fn kind(&self) -> ContextKind {
        match self.page_type {
            PageType::Prompt | PageType::MoreLikeThis => ContextKind::Ephemeral,
            PageType::SinglePost => ContextKind::SingleSubject,
            PageType::Favorites | PageType::Other => ContextKind::Collection,
        }
    }

    /// Label of the bulk action for this context.
    pub fn run_label(&self) -> &'static str {
        match self.page_type {
            PageType::Prompt | PageType::MoreLikeThis => "Download Session",
            PageType::Favorites => "Download Favorites",
            PageType::SinglePost => "Download Post",
            PageType::Other => "Download All",
        }
    }
}

pub fn detect_page_type(path: &str) -> PageType {
    if path == "/imagine" || path == "/imagine/" {
        PageType::Prompt
    } else if MORE_LIKE_THIS_RE.is_match(path) {
        PageType::MoreLikeThis
    } else if path.contains("/imagine/favorites") {
        PageType::Favorites
    } else if SINGLE_POST_RE.is_match(path) {
        PageType::SinglePost
    } else {
        PageType::Other
    }
}

/// The last UUID-shaped substring of `url`.
pub fn extract_post_id(url: &str) -> Option<&str> {
    UUID_RE.find_iter(url).last().map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = "0a1b2c3d-0000-4111-8222-abcdefabcdef";

    #[test]
    fn test_page_type_detection() {
        assert_eq!(detect_page_type("/imagine"), PageType::Prompt);
        assert_eq!(detect_page_type("/imagine/"), PageType::Prompt);
        assert_eq!(
            detect_page_type(&format!("/imagine/more/{}", POST)),
            PageType::MoreLikeThis
        );
        assert_eq!(detect_page_type("/imagine/favorites"), PageType::Favorites);
        assert_eq!(
            detect_page_type(&format!("/imagine/post/{}", POST)),
            PageType::SinglePost
        );
        assert_eq!(detect_page_type("/imagine/explore"), PageType::Other);
        assert_eq!(detect_page_type("/chat"), PageType::Other);
    }

    #[test]
    fn test_context_kind_and_labels() {
        let post = ViewContext::from_path(&format!("/imagine/post/{}", POST));
        assert_eq!(post.kind(), ContextKind::SingleSubject);
        assert_eq!(post.post_id(), Some(POST));
        assert_eq!(post.run_label(), "Download Post");

        let prompt = ViewContext::from_path("/imagine");
        assert_eq!(prompt.kind(), ContextKind::Ephemeral);
        assert_eq!(prompt.run_label(), "Download Session");

        let favorites = ViewContext::from_path("/imagine/favorites");
        assert_eq!(favorites.kind(), ContextKind::Collection);
        assert_eq!(favorites.key(), "/imagine/favorites");
        assert!(favorites.post_id().is_none());
    }

    #[test]
    fn test_extract_post_id_takes_last_match() {
        let url = format!(
            "https://assets.example/users/11111111-2222-3333-4444-555555555555/generated/{}/image.jpg",
            POST
        );
        assert_eq!(extract_post_id(&url), Some(POST));
        assert_eq!(extract_post_id("https://assets.example/no-id.jpg"), None);
    }
}
