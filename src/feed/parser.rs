use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{FeedDocument, FeedError, FeedItem, ParseError, ValidationError};

/// Maximum element nesting accepted inside a feed document.
const MAX_DEPTH: usize = 64;

/// Item fields as they appear in the document, before validation.
#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
}

#[derive(Debug, Default)]
struct RawChannel {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    items: Vec<RawItem>,
}

/// Where the reader currently is, relative to `<rss><channel>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"description" => Some(Self::Description),
            b"pubDate" => Some(Self::PubDate),
            _ => None,
        }
    }
}

/// Parses an RSS 2.0 document and applies per-item validation.
///
/// Items missing `title`, `link` or `description` are dropped with a warning.
/// An unparseable `pubDate` keeps the item with `published_at = None`.
/// Fails with [`ValidationError::NoValidItems`] when nothing survives.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, FeedError> {
    let raw = read_channel(bytes)?;

    let (title, link, description) = match (raw.title, raw.link, raw.description) {
        (Some(t), Some(l), Some(d)) => (t, l, d),
        (t, l, d) => {
            let missing: Vec<&str> = [("title", t), ("link", l), ("description", d)]
                .into_iter()
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name)
                .collect();
            return Err(ParseError::MissingChannelFields(missing.join(", ")).into());
        }
    };

    let total = raw.items.len();
    let items: Vec<FeedItem> = raw.items.into_iter().filter_map(validate_item).collect();
    let dropped = total - items.len();

    if dropped > 0 {
        tracing::warn!(channel = %title, dropped, total, "Skipped feed items missing required fields");
    }
    if items.is_empty() {
        return Err(ValidationError::NoValidItems { dropped }.into());
    }

    Ok(FeedDocument {
        title,
        link,
        description,
        items,
    })
}

fn validate_item(item: RawItem) -> Option<FeedItem> {
    let (title, link, description) = match (item.title, item.link, item.description) {
        (Some(t), Some(l), Some(d)) => (t, l, d),
        (title, link, _) => {
            tracing::debug!(
                title = title.as_deref().unwrap_or("<none>"),
                link = link.as_deref().unwrap_or("<none>"),
                "Dropping feed item with missing fields"
            );
            return None;
        }
    };

    let published_at = item.pub_date.and_then(|raw| match parse_pub_date(&raw) {
        Some(dt) => Some(dt),
        None => {
            tracing::warn!(link = %link, pub_date = %raw, "Unparseable pubDate, keeping item without it");
            None
        }
    });

    Some(FeedItem {
        title,
        link,
        description,
        published_at,
    })
}

/// RSS dates are RFC 2822; some feeds emit RFC 3339 instead.
pub(crate) fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn read_channel(bytes: &[u8]) -> Result<RawChannel, ParseError> {
    // quick-xml 0.37 never expands <!ENTITY> declarations; unknown entities
    // fail to unescape and fall back to the raw text below.
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    // Depth of the field element being collected; markup nested below it
    // contributes its text instead of resetting the buffer.
    let mut field_depth: Option<usize> = None;
    let mut channel: Option<RawChannel> = None;
    let mut item: Option<RawItem> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if path.len() >= MAX_DEPTH {
                    return Err(ParseError::Xml(format!(
                        "nesting deeper than {MAX_DEPTH} levels"
                    )));
                }
                path.push(e.name().as_ref().to_vec());
                if field_depth.is_none() {
                    text.clear();
                    if is_field(&path) {
                        field_depth = Some(path.len());
                    }

                    if is_path(&path, &[b"rss", b"channel"]) && channel.is_none() {
                        channel = Some(RawChannel::default());
                    } else if is_path(&path, &[b"rss", b"channel", b"item"]) {
                        item = Some(RawItem::default());
                    }
                }
            }
            Ok(Event::Text(e)) => match e.unescape() {
                Ok(s) => append_run(&mut text, &s),
                Err(_) => append_run(&mut text, &String::from_utf8_lossy(&e)),
            },
            Ok(Event::CData(e)) => append_run(&mut text, &String::from_utf8_lossy(&e)),
            Ok(Event::End(_)) if field_depth.is_some_and(|depth| path.len() > depth) => {
                path.pop();
            }
            Ok(Event::End(_)) => {
                field_depth = None;
                let value = non_empty(&text);
                match path.as_slice() {
                    [root, ch, name] if root == b"rss" && ch == b"channel" => {
                        if let (Some(channel), Some(field)) =
                            (channel.as_mut(), Field::from_name(name))
                        {
                            match field {
                                Field::Title => channel.title = value,
                                Field::Link => channel.link = value,
                                Field::Description => channel.description = value,
                                Field::PubDate => {}
                            }
                        } else if name == b"item" {
                            if let (Some(channel), Some(done)) = (channel.as_mut(), item.take()) {
                                channel.items.push(done);
                            }
                        }
                    }
                    [root, ch, it, name]
                        if root == b"rss" && ch == b"channel" && it == b"item" =>
                    {
                        if let (Some(item), Some(field)) = (item.as_mut(), Field::from_name(name)) {
                            match field {
                                Field::Title => item.title = value,
                                Field::Link => item.link = value,
                                Field::Description => item.description = value,
                                Field::PubDate => item.pub_date = value,
                            }
                        }
                    }
                    _ => {}
                }
                path.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }

    channel.ok_or(ParseError::NoChannel)
}

fn is_path(path: &[Vec<u8>], expected: &[&[u8]]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}

/// True when `path` ends at a channel or item field element.
fn is_field(path: &[Vec<u8>]) -> bool {
    match path {
        [root, ch, name] if root == b"rss" && ch == b"channel" => Field::from_name(name).is_some(),
        [root, ch, it, name] if root == b"rss" && ch == b"channel" && it == b"item" => {
            Field::from_name(name).is_some()
        }
        _ => false,
    }
}

/// Joins adjacent text and CDATA runs with a single space.
fn append_run(text: &mut String, run: &str) {
    if run.is_empty() {
        return;
    }
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(run);
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rss(items: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <atom:link href="https://example.com/index.xml" rel="self" type="application/rss+xml"/>
    <description>Recent posts</description>
    {items}
</channel>
</rss>"#
        )
    }

    #[test]
    fn test_parses_channel_and_items() {
        let xml = rss(r#"
            <item>
                <title>First</title>
                <link>https://example.com/first</link>
                <description>One</description>
                <pubDate>Mon, 02 Jan 2023 15:04:05 +0000</pubDate>
            </item>
            <item>
                <title>Second</title>
                <link>https://example.com/second</link>
                <description>Two</description>
            </item>"#);

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.title, "Example Blog");
        assert_eq!(doc.link, "https://example.com/");
        assert_eq!(doc.description, "Recent posts");
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].link, "https://example.com/first");
        assert_eq!(
            doc.items[0].published_at.map(|d| d.timestamp()),
            Some(1_672_671_845)
        );
        assert_eq!(doc.items[1].published_at, None);
    }

    #[test]
    fn test_single_item_is_a_list_of_one() {
        let xml = rss(r#"<item><title>Only</title><link>https://example.com/only</link><description>x</description></item>"#);
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "Only");
    }

    #[test]
    fn test_atom_link_does_not_shadow_channel_link() {
        let xml = rss(r#"<item><title>a</title><link>https://example.com/a</link><description>d</description></item>"#);
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.link, "https://example.com/");
    }

    #[test]
    fn test_items_missing_fields_are_dropped() {
        let xml = rss(r#"
            <item><title>No link</title><description>d</description></item>
            <item><link>https://example.com/no-title</link><description>d</description></item>
            <item><title>No description</title><link>https://example.com/nd</link></item>
            <item><title>Good</title><link>https://example.com/good</link><description>d</description></item>"#);

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "Good");
    }

    #[test]
    fn test_bad_pub_date_keeps_item() {
        let xml = rss(r#"<item><title>t</title><link>https://example.com/t</link><description>d</description><pubDate>sometime last week</pubDate></item>"#);
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert!(doc.items[0].published_at.is_none());
    }

    #[test]
    fn test_rfc3339_pub_date_accepted() {
        let parsed = parse_pub_date("2024-03-01T10:00:00Z").unwrap();
        assert_eq!(parsed.timestamp(), 1_709_287_200);
        assert!(parse_pub_date("Tue, 10 Jun 2003 04:00:00 GMT").is_some());
    }

    #[test]
    fn test_cdata_and_entities() {
        let xml = rss(r#"<item><title>Fish &amp; Chips</title><link>https://example.com/f</link><description><![CDATA[<p>Hot</p>]]></description></item>"#);
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items[0].title, "Fish & Chips");
        assert_eq!(doc.items[0].description, "<p>Hot</p>");
    }

    #[test]
    fn test_markup_inside_description_keeps_text() {
        let xml = rss(r#"
            <item><title>Mixed</title><link>https://example.com/mixed</link><description>Hello <b>bold</b> world</description></item>
            <item><title>Markup only</title><link>https://example.com/markup</link><description><p>Para</p></description></item>
            <item><title>Plain</title><link>https://example.com/plain</link><description>ok</description></item>"#);

        let doc = parse_feed(xml.as_bytes()).unwrap();
        let descriptions: Vec<&str> = doc.items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Hello bold world", "Para", "ok"]);
    }

    #[test]
    fn test_nested_markup_does_not_leak_into_next_field() {
        let xml = rss(r#"<item><description><div><p>Deep</p> text</div></description><title>After</title><link>https://example.com/after</link></item>"#);
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items[0].description, "Deep text");
        assert_eq!(doc.items[0].title, "After");
    }

    #[test]
    fn test_text_and_cdata_runs_are_spaced() {
        let xml = rss(r#"<item><title>t</title><link>https://example.com/t</link><description>Intro <![CDATA[<em>x</em>]]></description></item>"#);
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items[0].description, "Intro <em>x</em>");
    }

    #[test]
    fn test_empty_element_counts_as_missing() {
        let xml = rss(r#"<item><title></title><link>https://example.com/e</link><description>d</description></item>
            <item><title>ok</title><link>https://example.com/ok</link><description>d</description></item>"#);
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn test_no_channel() {
        let atom = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"><title>x</title></feed>"#;
        let err = parse_feed(atom.as_bytes()).unwrap_err();
        assert!(matches!(err, FeedError::Parse(ParseError::NoChannel)));
    }

    #[test]
    fn test_missing_channel_fields() {
        let xml = r#"<rss><channel><title>Only title</title><item><title>t</title><link>l</link><description>d</description></item></channel></rss>"#;
        let err = parse_feed(xml.as_bytes()).unwrap_err();
        match err {
            FeedError::Parse(ParseError::MissingChannelFields(fields)) => {
                assert_eq!(fields, "link, description");
            }
            other => panic!("expected MissingChannelFields, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_surviving_items_is_validation_error() {
        let xml = rss(r#"<item><title>x</title></item>"#);
        let err = parse_feed(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            FeedError::Validation(ValidationError::NoValidItems { dropped: 1 })
        ));
    }

    #[test]
    fn test_channel_without_items_is_validation_error() {
        let err = parse_feed(rss("").as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            FeedError::Validation(ValidationError::NoValidItems { dropped: 0 })
        ));
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_feed(b"<rss><channel><title>x</channel></rss>").unwrap_err();
        assert!(matches!(err, FeedError::Parse(ParseError::Xml(_))));
    }

    #[test]
    fn test_truncated_document() {
        let err = parse_feed(b"<rss><channel><title>x</title>").unwrap_err();
        assert!(matches!(err, FeedError::Parse(_)));
    }
}
