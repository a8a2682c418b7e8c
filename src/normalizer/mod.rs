use chrono::{DateTime, NaiveDateTime, Utc};
use html_escape::decode_html_entities;

use crate::domain::Post;
use crate::xml::XmlValue;

const KEY_FIELDS: &[&str] = &["id", "@id", "guid", "link", "title"];
const LINK_FIELDS: &[&str] = &["link", "url", "permalink", "guid"];
const CONTENT_FIELDS: &[&str] = &["content", "content:encoded", "description"];
const EXCERPT_FIELDS: &[&str] = &["excerpt", "summary"];
const AUTHOR_FIELDS: &[&str] = &["author", "dc:creator", "creator"];
const DATE_FIELDS: &[&str] = &["date", "post_date", "pubDate", "published"];

/// Picks the post elements out of a decoded page and maps them to [`Post`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    item_element: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new("post")
    }
}

impl Normalizer {
    pub fn new(item_element: impl Into<String>) -> Self {
        Self {
            item_element: item_element.into(),
        }
    }

    /// The raw post elements of a page. Empty means end of data.
    pub fn items<'a>(&self, page: &'a XmlValue) -> Vec<&'a XmlValue> {
        page.elements(&self.item_element)
    }

    pub fn normalize(&self, source: &str, page: &XmlValue) -> Vec<Post> {
        self.items(page)
            .into_iter()
            .map(|item| self.post_from_value(source, item))
            .collect()
    }

    pub fn post_from_value(&self, source: &str, item: &XmlValue) -> Post {
        let key = first_text(item, KEY_FIELDS).unwrap_or_default();
        let mut post = Post::new(source, key);

        post.title = first_text(item, &["title"]).map(decode);
        post.link = first_text(item, LINK_FIELDS).map(String::from);
        post.content = first_text(item, CONTENT_FIELDS).map(decode);
        post.excerpt = first_text(item, EXCERPT_FIELDS).map(decode);
        post.author = first_text(item, AUTHOR_FIELDS).map(decode);
        post.categories = item
            .texts_of("category")
            .into_iter()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(decode)
            .collect();
        post.published_at = first_text(item, DATE_FIELDS).and_then(parse_date);

        post
    }
}

fn first_text<'a>(item: &'a XmlValue, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| item.text_of(key))
}

fn decode(text: &str) -> String {
    decode_html_entities(text).to_string()
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc())
        })
}
