//! RSS / Atom feed ingestion
//!
//! Feeds are parsed with a handful of tolerant regular expressions rather than
//! a strict XML parser: real-world feeds are frequently malformed, and only a
//! few elements per item matter here.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("newsdesk/", env!("CARGO_PKG_VERSION"), " (+feed fetcher)");

/// Elements looked up inside `<item>` / `<entry>` blocks
const ELEMENTS: &[&str] = &[
    "title",
    "link",
    "description",
    "content:encoded",
    "summary",
    "content",
    "pubDate",
    "dc:date",
    "published",
    "updated",
    "guid",
    "id",
];

static ITEM_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<item(?:\s[^>]*)?>(.*?)</item>").unwrap());

static ENTRY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<entry(?:\s[^>]*)?>(.*?)</entry>").unwrap());

static ELEMENT_REGEXES: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    ELEMENTS
        .iter()
        .map(|name| {
            let pattern = format!(
                r"(?is)<{0}(?:\s[^>]*)?>(.*?)</{0}>",
                regex::escape(name)
            );
            (*name, Regex::new(&pattern).unwrap())
        })
        .collect()
});

/// `<link .../>` and friends, capturing the attribute string
static ATOM_LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<link(\s[^>]*?)/?>").unwrap());

static ENCLOSURE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<enclosure(\s[^>]*?)/?>").unwrap());

static MEDIA_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<media:(content|thumbnail)(\s[^>]*?)/?>").unwrap());

static IMG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\s[^>]*?src\s*=\s*["']([^"']+)["']"#).unwrap());

static ATTR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)([\w:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

static CDATA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static SCRIPT_STYLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static FEED_ROOT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(rss|feed|rdf:RDF)[\s>]").unwrap());

/// A single article extracted from a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// Plain-text body
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned HTTP {0}")]
    Status(u16),

    #[error("Not an RSS or Atom document")]
    NotAFeed,
}

/// Parse an RSS 2.0, RSS 1.0 or Atom document.
///
/// Items missing a title or a link are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, FeedError> {
    if !FEED_ROOT_REGEX.is_match(xml) {
        return Err(FeedError::NotAFeed);
    }

    let mut items: Vec<FeedItem> = ITEM_REGEX
        .captures_iter(xml)
        .filter_map(|c| parse_rss_item(&c[1]))
        .collect();

    items.extend(ENTRY_REGEX.captures_iter(xml).filter_map(|c| parse_atom_entry(&c[1])));

    Ok(items)
}

fn parse_rss_item(block: &str) -> Option<FeedItem> {
    let title = element_text(block, "title")?;
    let link = element_raw(block, "link")
        .map(|l| decode_entities(&unwrap_cdata(&l)).trim().to_string())
        .filter(|l| !l.is_empty())
        .or_else(|| atom_link(block))
        .or_else(|| {
            element_text(block, "guid").filter(|g| g.starts_with("http://") || g.starts_with("https://"))
        })?;

    let description = element_raw(block, "description").map(|d| decode_entities(&unwrap_cdata(&d)));
    let encoded = element_raw(block, "content:encoded").map(|d| decode_entities(&unwrap_cdata(&d)));
    let (content, html) = pick_body(description, encoded);

    let published_at = ["pubDate", "dc:date", "published", "updated"]
        .iter()
        .find_map(|name| element_text(block, name).and_then(|d| parse_date(&d)));

    Some(FeedItem {
        title,
        link,
        content,
        published_at,
        guid: element_text(block, "guid"),
        image_url: find_image(block, html.as_deref()),
    })
}

fn parse_atom_entry(block: &str) -> Option<FeedItem> {
    let title = element_text(block, "title")?;
    let link = atom_link(block)?;

    let summary = element_raw(block, "summary").map(|d| decode_entities(&unwrap_cdata(&d)));
    let content = element_raw(block, "content").map(|d| decode_entities(&unwrap_cdata(&d)));
    let (content, html) = pick_body(summary, content);

    let published_at = ["published", "updated"]
        .iter()
        .find_map(|name| element_text(block, name).and_then(|d| parse_date(&d)));

    Some(FeedItem {
        title,
        link,
        content,
        published_at,
        guid: element_text(block, "id"),
        image_url: find_image(block, html.as_deref()),
    })
}

/// Choose the longer of the short and full bodies, returning plain text and
/// the HTML it came from
fn pick_body(short: Option<String>, full: Option<String>) -> (String, Option<String>) {
    let short_text = short.as_deref().map(html_to_text).unwrap_or_default();
    let full_text = full.as_deref().map(html_to_text).unwrap_or_default();
    if full_text.chars().count() > short_text.chars().count() {
        (full_text, full)
    } else {
        (short_text, short.or(full))
    }
}

fn element_raw(block: &str, name: &str) -> Option<String> {
    ELEMENT_REGEXES
        .get(name)
        .and_then(|re| re.captures(block))
        .map(|c| c[1].to_string())
}

/// Element content as collapsed plain text, `None` when missing or blank
fn element_text(block: &str, name: &str) -> Option<String> {
    element_raw(block, name)
        .map(|raw| html_to_text(&decode_entities(&unwrap_cdata(&raw))))
        .filter(|s| !s.is_empty())
}

/// Pick the `alternate` (or first) `<link href>` of an Atom entry
fn atom_link(block: &str) -> Option<String> {
    let mut fallback = None;
    for caps in ATOM_LINK_REGEX.captures_iter(block) {
        let attrs = parse_attrs(&caps[1]);
        let Some(href) = attrs.get("href") else { continue };
        match attrs.get("rel").map(String::as_str) {
            None | Some("alternate") => return Some(decode_entities(href)),
            _ if fallback.is_none() => fallback = Some(decode_entities(href)),
            _ => {}
        }
    }
    fallback
}

fn find_image(block: &str, html: Option<&str>) -> Option<String> {
    for caps in ENCLOSURE_REGEX.captures_iter(block) {
        let attrs = parse_attrs(&caps[1]);
        let is_image = attrs.get("type").map(|t| t.starts_with("image/")).unwrap_or(false);
        if is_image {
            if let Some(url) = attrs.get("url") {
                return Some(decode_entities(url));
            }
        }
    }

    for caps in MEDIA_REGEX.captures_iter(block) {
        let attrs = parse_attrs(&caps[2]);
        let is_video = attrs.get("medium").map(|m| m != "image").unwrap_or(false)
            || attrs.get("type").map(|t| !t.starts_with("image/")).unwrap_or(false);
        if &caps[1] == "content" && is_video {
            continue;
        }
        if let Some(url) = attrs.get("url") {
            return Some(decode_entities(url));
        }
    }

    html.and_then(|h| IMG_REGEX.captures(h))
        .map(|c| decode_entities(&c[1]))
}

fn parse_attrs(attrs: &str) -> HashMap<String, String> {
    ATTR_REGEX
        .captures_iter(attrs)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str()).unwrap_or("");
            (c[1].to_lowercase(), value.to_string())
        })
        .collect()
}

fn unwrap_cdata(s: &str) -> String {
    CDATA_REGEX.replace_all(s, "$1").into_owned()
}

/// Decode named and numeric HTML entities
pub fn decode_entities(s: &str) -> String {
    ENTITY_REGEX
        .replace_all(s, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "ndash" => Some('–'),
                    "mdash" => Some('—'),
                    "hellip" => Some('…'),
                    "laquo" => Some('«'),
                    "raquo" => Some('»'),
                    "rsquo" => Some('’'),
                    "lsquo" => Some('‘'),
                    "rdquo" => Some('”'),
                    "ldquo" => Some('“'),
                    _ => None,
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Strip markup and collapse whitespace
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE_REGEX.replace_all(html, " ");
    let without_tags = TAG_REGEX.replace_all(&without_scripts, " ");
    WHITESPACE_REGEX.replace_all(&without_tags, " ").trim().to_string()
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

/// SHA-256 over the normalized title and body, hex encoded.
///
/// Used to spot the same story syndicated under different URLs.
pub fn content_hash(title: &str, content: &str) -> String {
    let normalize = |s: &str| WHITESPACE_REGEX.replace_all(s.trim(), " ").to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalize(title).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize(content).as_bytes());
    hex::encode(hasher.finalize())
}

/// Downloads and parses feeds over HTTP
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>, FeedError> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let items = parse_feed(&body)?;
        tracing::debug!(url, count = items.len(), "Parsed feed");
        Ok(items)
    }
}
