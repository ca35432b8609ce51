// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which extraction strategy a source URL needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Page,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Page => "page",
        }
    }

    /// Operator hint shown when this kind of source could not be reached.
    pub fn alternate_hint(&self) -> &'static str {
        match self {
            SourceKind::Feed => "check the feed URL or try a direct article URL instead",
            SourceKind::Page => "try an RSS feed or a different article instead",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one source drives a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "lowercase")]
pub enum FetchTarget {
    Feed(String),
    Page(String),
}

impl FetchTarget {
    pub fn kind(&self) -> SourceKind {
        match self {
            FetchTarget::Feed(_) => SourceKind::Feed,
            FetchTarget::Page(_) => SourceKind::Page,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchTarget::Feed(u) | FetchTarget::Page(u) => u,
        }
    }
}

/// Raw acquired content, before rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub body: String,
}

impl ExtractedArticle {
    /// Title and body as two paragraphs; an empty title yields only the body.
    pub fn source_text(&self) -> String {
        match (self.title.is_empty(), self.body.is_empty()) {
            (true, _) => self.body.clone(),
            (false, true) => self.title.clone(),
            (false, false) => format!("{}\n\n{}", self.title, self.body),
        }
    }
}

/// Why a fetched body could not be turned into an article.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("feed has no entries")]
    NoEntries,
    #[error("first feed entry has neither title nor content")]
    EmptyEntry,
    #[error("document too small ({0} bytes)")]
    BodyTooSmall(usize),
    #[error("no article content found")]
    NoContent,
    #[error("extracted text too short ({len} chars, need more than {min})")]
    TooShort { len: usize, min: usize },
}
