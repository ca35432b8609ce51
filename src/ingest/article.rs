// src/ingest/article.rs
//! Main-content extraction from arbitrary news pages.
//!
//! Strategy, in order:
//! 1. first node matching a content selector (landmarks, then CMS class names)
//! 2. if nothing matches and the page has more than 3 `<p>`, a synthesized
//!    container holding only the paragraphs longer than 50 characters
//!
//! Noise subtrees (scripts, navigation, ads, share widgets, ...) are skipped while
//! collecting text. The title is resolved independently from the content.

use metrics::histogram;
use scraper::{ElementRef, Html, Node, Selector};

use crate::ingest::collapse_whitespace;
use crate::ingest::types::{ExtractError, ExtractedArticle};

/// Bodies smaller than this are relay error stubs, not pages.
pub const MIN_HTML_BYTES: usize = 100;
/// Extracted text must be longer than this.
pub const MIN_PAGE_TEXT_CHARS: usize = 100;
const FALLBACK_MIN_PARAGRAPHS: usize = 3;
const FALLBACK_PARAGRAPH_MIN_CHARS: usize = 50;

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".content",
    ".article-content",
    ".post-content",
    ".entry-content",
    ".news-content",
    ".story-body",
    ".article-body",
    ".mc-article-body", // G1
    ".content-text",    // G1
    ".entry-title",
];

const TITLE_SELECTORS: &[&str] = &[
    "h1",
    ".title",
    ".headline",
    ".article-title",
    ".post-title",
    ".entry-title",
];

const NOISE_TAGS: &[&str] = &[
    "script", "style", "iframe", "nav", "header", "footer", "aside", "noscript",
];

const NOISE_CLASSES: &[&str] = &[
    "ad",
    "advertisement",
    "social-share",
    "related",
    "comments",
    "sidebar",
];

/// Which strategy produced the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    Selector(&'static str),
    ParagraphFallback { kept: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtraction {
    pub article: ExtractedArticle,
    pub source: ContentSource,
}

pub fn extract_article(html: &str) -> Result<ExtractedArticle, ExtractError> {
    extract_article_detailed(html).map(|p| p.article)
}

pub fn extract_article_detailed(html: &str) -> Result<PageExtraction, ExtractError> {
    if html.len() < MIN_HTML_BYTES {
        return Err(ExtractError::BodyTooSmall(html.len()));
    }
    let t0 = std::time::Instant::now();
    // html5ever recovers from malformed markup; its recoverable errors are not failures.
    let document = Html::parse_document(html);

    let (body, source) = match select_container(&document) {
        Some((selector, el)) => (visible_text(el), ContentSource::Selector(selector)),
        None => paragraph_fallback(&document).ok_or(ExtractError::NoContent)?,
    };
    let title = select_title(&document).unwrap_or_default();

    histogram!("extract_parse_ms", "kind" => "page").record(t0.elapsed().as_secs_f64() * 1_000.0);

    if body.is_empty() {
        return Err(ExtractError::NoContent);
    }
    let article = ExtractedArticle { title, body };
    let len = article.source_text().chars().count();
    if len <= MIN_PAGE_TEXT_CHARS {
        return Err(ExtractError::TooShort {
            len,
            min: MIN_PAGE_TEXT_CHARS,
        });
    }

    tracing::debug!(target: "ingest", ?source, chars = len, "page content extracted");
    Ok(PageExtraction { article, source })
}

fn select_container(document: &Html) -> Option<(&'static str, ElementRef<'_>)> {
    CONTENT_SELECTORS.iter().find_map(|name| {
        let sel = Selector::parse(name).ok()?;
        document.select(&sel).next().map(|el| (*name, el))
    })
}

fn select_title(document: &Html) -> Option<String> {
    TITLE_SELECTORS.iter().find_map(|name| {
        let sel = Selector::parse(name).ok()?;
        let el = document.select(&sel).next()?;
        let t = collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "));
        (!t.is_empty()).then_some(t)
    })
}

/// Aggregate long paragraphs. Only runs on pages with more than 3 `<p>`, so sparse
/// pages don't end up as a pile of nav/footer snippets.
fn paragraph_fallback(document: &Html) -> Option<(String, ContentSource)> {
    let sel = Selector::parse("p").ok()?;
    let paragraphs: Vec<ElementRef<'_>> = document.select(&sel).collect();
    if paragraphs.len() <= FALLBACK_MIN_PARAGRAPHS {
        return None;
    }

    let kept: Vec<String> = paragraphs
        .iter()
        .map(|p| visible_text(*p))
        .filter(|t| t.chars().count() > FALLBACK_PARAGRAPH_MIN_CHARS)
        .collect();

    let source = ContentSource::ParagraphFallback {
        kept: kept.len(),
        total: paragraphs.len(),
    };
    Some((kept.join("\n\n"), source))
}

fn is_noise(el: &ElementRef<'_>) -> bool {
    let e = el.value();
    NOISE_TAGS.contains(&e.name()) || e.classes().any(|c| NOISE_CLASSES.contains(&c))
}

/// Text of `el` with noise subtrees skipped, whitespace collapsed.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut buf = String::new();
    collect_text(el, &mut buf);
    collapse_whitespace(&buf)
}

fn collect_text(el: ElementRef<'_>, buf: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                buf.push_str(t);
                buf.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_noise(&child_el) {
                        collect_text(child_el, buf);
                    }
                }
            }
            _ => {}
        }
    }
}
