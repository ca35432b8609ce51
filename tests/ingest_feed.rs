// tests/ingest_feed.rs
mod common;

use common::{FEED_3, FEED_ATOM};
use news_audio_generator::ingest::feed::extract_feed;
use news_audio_generator::ingest::types::{ExtractError, ExtractedArticle};

#[test]
fn three_item_feed_yields_first_item() {
    let a = extract_feed(FEED_3).expect("fixture parses");
    assert_eq!(a.title, "Prefeitura inaugura nova ponte sobre o rio Tietê");
    // content:encoded wins over description, markup stripped
    assert!(a.body.starts_with("A prefeitura inaugurou nesta terça-feira (04)"));
    assert!(a.body.contains("80 mil motoristas por dia."));
    assert!(!a.body.contains("<p>"));
    assert!(!a.body.contains("Defesa Civil"), "second item leaked");
}

#[test]
fn single_item_title_and_description() {
    let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>C</title>
<item><title>X</title><description>Y</description></item>
</channel></rss>"#;
    assert_eq!(
        extract_feed(xml).unwrap(),
        ExtractedArticle {
            title: "X".into(),
            body: "Y".into(),
        }
    );
}

#[test]
fn atom_entry_with_escaped_html_content() {
    let a = extract_feed(FEED_ATOM).unwrap();
    assert_eq!(a.title, "Central bank holds rates steady");
    assert!(a.body.starts_with("Policy makers kept the benchmark rate unchanged on Tuesday"));
    assert!(!a.body.contains("<p>"));
}

#[test]
fn mismatched_close_tag_is_malformed() {
    assert!(matches!(
        extract_feed("<rss><item><title>a</titel></item></rss>"),
        Err(ExtractError::Malformed(_))
    ));
}

#[test]
fn source_text_is_two_paragraphs() {
    let a = extract_feed(FEED_3).unwrap();
    let text = a.source_text();
    let (title, body) = text.split_once("\n\n").unwrap();
    assert_eq!(title, a.title);
    assert_eq!(body, a.body);
}
