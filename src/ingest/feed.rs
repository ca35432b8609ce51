// src/ingest/feed.rs
use metrics::histogram;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use crate::ingest::normalize_text;
use crate::ingest::types::{ExtractError, ExtractedArticle};

/// Entry fields we care about, keyed by element name inside `<item>`/`<entry>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Encoded,
    Description,
    Published,
    Link,
}

impl Field {
    fn from_element(e: &BytesStart<'_>) -> Option<Self> {
        match e.name().as_ref() {
            b"title" => Some(Field::Title),
            b"description" | b"summary" => Some(Field::Description),
            // Atom <content> carries the full body, like RSS content:encoded
            b"content" => Some(Field::Encoded),
            b"pubDate" | b"published" | b"updated" => Some(Field::Published),
            b"link" => Some(Field::Link),
            _ if e.local_name().as_ref() == b"encoded" => Some(Field::Encoded),
            _ if e.name().as_ref() == b"dc:date" => Some(Field::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawEntry {
    title: String,
    encoded: String,
    description: String,
    published: String,
    link: String,
}

impl RawEntry {
    fn slot(&mut self, f: Field) -> &mut String {
        match f {
            Field::Title => &mut self.title,
            Field::Encoded => &mut self.encoded,
            Field::Description => &mut self.description,
            Field::Published => &mut self.published,
            Field::Link => &mut self.link,
        }
    }
}

fn is_entry(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"item" | b"entry")
}

/// Parse an RSS or Atom document and return its first entry in document order.
/// The whole document is still read so structural errors anywhere fail the parse.
pub fn extract_feed(xml: &str) -> Result<ExtractedArticle, ExtractError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&xml_clean);
    reader.config_mut().trim_text(true);

    let mut entry: Option<RawEntry> = None;
    let mut entry_done = false;
    // depth relative to the entry element: 1 = directly inside it
    let mut depth = 0usize;
    let mut field: Option<Field> = None;
    // open elements across the whole document; non-zero at EOF means truncated
    let mut open = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            ExtractError::Malformed(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Eof if open > 0 => {
                return Err(ExtractError::Malformed(
                    "unexpected end of document".to_string(),
                ));
            }
            Event::Eof => break,
            Event::Start(e) => {
                open += 1;
                if entry_done {
                    continue;
                }
                match entry.as_mut() {
                    None if is_entry(&e) => {
                        entry = Some(RawEntry::default());
                        depth = 1;
                    }
                    None => {}
                    Some(raw) => {
                        depth += 1;
                        if depth == 2 {
                            // first occurrence of each field wins
                            field = Field::from_element(&e).filter(|f| raw.slot(*f).is_empty());
                        }
                    }
                }
            }
            Event::Empty(e) => {
                // Atom: <link rel="alternate" href="..."/>
                if let (Some(raw), false, 1) = (entry.as_mut(), entry_done, depth) {
                    if e.name().as_ref() == b"link" && raw.link.is_empty() {
                        if let Some(href) = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"href")
                        {
                            raw.link = String::from_utf8_lossy(&href.value).into_owned();
                        }
                    }
                }
            }
            Event::End(_) => {
                open = open.saturating_sub(1);
                if entry.is_some() && !entry_done {
                    depth -= 1;
                    match depth {
                        0 => entry_done = true,
                        1 => field = None,
                        _ => {}
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(raw), Some(f)) = (entry.as_mut(), field) {
                    append(raw.slot(f), &String::from_utf8_lossy(&t));
                }
            }
            Event::CData(c) => {
                if let (Some(raw), Some(f)) = (entry.as_mut(), field) {
                    append(raw.slot(f), &String::from_utf8_lossy(&c));
                }
            }
            _ => {}
        }
    }

    let raw = entry.ok_or(ExtractError::NoEntries)?;
    let title = normalize_text(&raw.title);
    let encoded = normalize_text(&raw.encoded);
    let body = if encoded.is_empty() {
        normalize_text(&raw.description)
    } else {
        encoded
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("extract_parse_ms", "kind" => "feed").record(ms);

    if title.is_empty() && body.is_empty() {
        return Err(ExtractError::EmptyEntry);
    }

    tracing::debug!(
        target: "ingest",
        published_at = parse_published_to_unix(raw.published.trim()),
        link = %raw.link.trim(),
        title_chars = title.chars().count(),
        body_chars = body.chars().count(),
        "feed entry selected"
    );

    Ok(ExtractedArticle { title, body })
}

fn append(slot: &mut String, text: &str) {
    if !slot.is_empty() {
        slot.push(' ');
    }
    slot.push_str(text);
}

/// RFC 2822 (RSS) or RFC 3339 (Atom) to unix seconds; 0 when unparseable.
fn parse_published_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

/// HTML-only entities are not valid XML; map the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_content_preferred_over_description() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Feed</title>
    <item>
      <title>Headline</title>
      <description>Short teaser</description>
      <content:encoded><![CDATA[<p>Full <b>story</b> text.</p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;
        let a = extract_feed(xml).unwrap();
        assert_eq!(a.title, "Headline");
        assert_eq!(a.body, "Full story text.");
    }

    #[test]
    fn channel_title_is_not_mistaken_for_entry_title() {
        let xml = r#"<rss><channel><title>Channel</title>
            <item><description>Only a body</description></item>
        </channel></rss>"#;
        let a = extract_feed(xml).unwrap();
        assert_eq!(a.title, "");
        assert_eq!(a.body, "Only a body");
    }

    #[test]
    fn html_entities_do_not_break_parsing() {
        let xml = "<rss><channel><item><title>A&nbsp;B &mdash; C</title></item></channel></rss>";
        let a = extract_feed(xml).unwrap();
        assert_eq!(a.title, "A B - C");
    }

    #[test]
    fn mismatched_tags_are_malformed() {
        let xml = "<rss><channel><item><title>T</item></channel></rss>";
        assert!(matches!(extract_feed(xml), Err(ExtractError::Malformed(_))));
    }

    #[test]
    fn truncated_document_is_malformed() {
        let cut = "<rss><channel><item><title>Truncated headline</title><description>Body cut off mid";
        assert_eq!(
            extract_feed(cut),
            Err(ExtractError::Malformed("unexpected end of document".into()))
        );
        // entry closed but the document is not
        let cut = "<rss><channel><item><title>T</title><description>Body</description></item>";
        assert!(matches!(extract_feed(cut), Err(ExtractError::Malformed(_))));
    }

    #[test]
    fn no_items_and_empty_item() {
        assert_eq!(
            extract_feed("<rss><channel><title>x</title></channel></rss>"),
            Err(ExtractError::NoEntries)
        );
        assert_eq!(
            extract_feed("<rss><channel><item><link>u</link></item></channel></rss>"),
            Err(ExtractError::EmptyEntry)
        );
    }

    #[test]
    fn published_parses_both_formats() {
        assert_eq!(
            parse_published_to_unix("Thu, 01 Jan 1970 00:01:00 +0000"),
            60
        );
        assert_eq!(parse_published_to_unix("1970-01-01T00:02:00Z"), 120);
        assert_eq!(parse_published_to_unix("yesterday"), 0);
    }
}
