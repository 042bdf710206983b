use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::error::FetchError;

/// Title and link of one feed entry, both trimmed. Either may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Prefixes are dropped when deserializing, so `<atom:link/>` or
/// `<media:title>` land next to the plain element. Take the first one that
/// carries text.
fn first_text(values: &[Text]) -> String {
    values
        .iter()
        .map(|t| t.value.trim())
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(rename = "title", default)]
    titles: Vec<Text>,
    #[serde(rename = "link", default)]
    links: Vec<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(rename = "title", default)]
    titles: Vec<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    /// The `alternate` link (also the meaning of a link without `rel`),
    /// falling back to whatever link comes first.
    fn link(&self) -> &str {
        self.links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
            .or_else(|| self.links.first())
            .map_or("", |l| l.href.as_str())
    }
}

fn root_element(xml: &str) -> Result<String, FetchError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) => return Err(FetchError::parse("feed", "empty document")),
            Ok(_) => {}
            Err(e) => return Err(FetchError::parse("feed", e)),
        }
    }
}

/// Parses an RSS 2.0 or Atom document into entries in document order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FetchError> {
    let root = root_element(xml)?;
    match root.as_str() {
        "rss" => {
            let rss: Rss =
                quick_xml::de::from_str(xml).map_err(|e| FetchError::parse("RSS feed", e))?;
            Ok(rss
                .channel
                .items
                .into_iter()
                .map(|item| FeedEntry {
                    title: first_text(&item.titles),
                    link: first_text(&item.links),
                })
                .collect())
        }
        "feed" => {
            let feed: AtomFeed =
                quick_xml::de::from_str(xml).map_err(|e| FetchError::parse("Atom feed", e))?;
            Ok(feed
                .entries
                .iter()
                .map(|entry| FeedEntry {
                    title: first_text(&entry.titles),
                    link: entry.link().trim().to_string(),
                })
                .collect())
        }
        other => Err(FetchError::parse(
            "feed",
            format!("unsupported root element <{}>", other),
        )),
    }
}
