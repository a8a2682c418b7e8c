//! Generic XML-to-dictionary decoding.
//!
//! Turns a response body into a nested [`XmlValue`] that mirrors the element
//! hierarchy:
//!
//! ```text
//! <posts>                         {"posts": {"post": [
//!   <post><title>A</title></post>     {"title": "A"},
//!   <post><title>B</title></post>     {"title": "B"}
//! </posts>                        ]}}
//! ```
//!
//! Leaf elements become text, elements with children or attributes become
//! maps (attributes under `@name`, mixed text under `#text`), and repeated
//! siblings collapse into a list under their shared name.

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Serialize;

use crate::app::{Result, SyncError};

const TEXT_KEY: &str = "#text";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XmlValue {
    Text(String),
    Map(IndexMap<String, XmlValue>),
    List(Vec<XmlValue>),
}

impl XmlValue {
    pub fn as_map(&self) -> Option<&IndexMap<String, XmlValue>> {
        match self {
            XmlValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[XmlValue]> {
        match self {
            XmlValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Text content of this value. Maps yield their `#text` entry and lists
    /// their first element's text.
    pub fn text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(text) => Some(text),
            XmlValue::Map(map) => map.get(TEXT_KEY).and_then(XmlValue::text),
            XmlValue::List(items) => items.first().and_then(XmlValue::text),
        }
    }

    /// Text of the child `key`, ignoring empty strings.
    pub fn text_of(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(XmlValue::text)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Every text value stored under `key`, in document order.
    pub fn texts_of(&self, key: &str) -> Vec<&str> {
        match self.get(key) {
            Some(XmlValue::List(items)) => items.iter().filter_map(XmlValue::text).collect(),
            Some(value) => value.text().into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            XmlValue::Text(text) => text.is_empty(),
            XmlValue::Map(map) => map.is_empty(),
            XmlValue::List(items) => items.is_empty(),
        }
    }

    /// Finds the first key called `name`, searching depth-first, and returns
    /// the element(s) stored there. A collapsed list yields each member.
    pub fn elements(&self, name: &str) -> Vec<&XmlValue> {
        match self {
            XmlValue::Text(_) => Vec::new(),
            XmlValue::Map(map) => {
                if let Some(found) = map.get(name) {
                    return match found {
                        XmlValue::List(items) => items.iter().collect(),
                        single => vec![single],
                    };
                }
                map.values()
                    .map(|child| child.elements(name))
                    .find(|found| !found.is_empty())
                    .unwrap_or_default()
            }
            XmlValue::List(items) => items.iter().flat_map(|item| item.elements(name)).collect(),
        }
    }
}

struct Frame {
    name: String,
    children: IndexMap<String, XmlValue>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut children = IndexMap::new();

        for attr in start.attributes() {
            let attr = attr?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr.unescape_value()?.to_string();
            children.insert(key, XmlValue::Text(value));
        }

        Ok(Self {
            name,
            children,
            text: String::new(),
        })
    }

    fn close(mut self) -> (String, XmlValue) {
        if self.children.is_empty() {
            return (self.name, XmlValue::Text(self.text));
        }
        if !self.text.is_empty() {
            self.children
                .insert(TEXT_KEY.to_string(), XmlValue::Text(self.text));
        }
        (self.name, XmlValue::Map(self.children))
    }
}

fn insert_child(map: &mut IndexMap<String, XmlValue>, name: String, value: XmlValue) {
    match map.get_mut(&name) {
        Some(XmlValue::List(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, XmlValue::List(Vec::new()));
            *existing = XmlValue::List(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    root: Option<(String, XmlValue)>,
}

impl TreeBuilder {
    fn start(&mut self, start: &BytesStart<'_>) -> Result<()> {
        if self.stack.is_empty() && self.root.is_some() {
            return Err(SyncError::Parse("multiple root elements".into()));
        }
        self.stack.push(Frame::open(start)?);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| SyncError::Parse("closing tag without matching opening tag".into()))?;
        let (name, value) = frame.close();

        match self.stack.last_mut() {
            Some(parent) => insert_child(&mut parent.children, name, value),
            None => self.root = Some((name, value)),
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        match self.stack.last_mut() {
            Some(frame) => {
                frame.text.push_str(text);
                Ok(())
            }
            None => Err(SyncError::Parse("text outside of root element".into())),
        }
    }

    fn finish(self) -> Result<XmlValue> {
        if let Some(open) = self.stack.last() {
            return Err(SyncError::Parse(format!("unclosed element <{}>", open.name)));
        }
        let (name, value) = self
            .root
            .ok_or_else(|| SyncError::Parse("document has no root element".into()))?;

        let mut map = IndexMap::new();
        map.insert(name, value);
        Ok(XmlValue::Map(map))
    }
}

/// Parse a complete XML document into a `{root_name: value}` map.
///
/// Malformed input is rejected outright; no partial tree is returned.
pub fn parse_document(xml: &[u8]) -> Result<XmlValue> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut builder = TreeBuilder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => builder.start(&e)?,
            Ok(Event::Empty(e)) => {
                builder.start(&e)?;
                builder.end()?;
            }
            Ok(Event::End(_)) => builder.end()?,
            Ok(Event::Text(e)) => {
                let text = e.unescape()?;
                builder.text(&text)?;
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).to_string();
                builder.text(&text)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SyncError::Parse(format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    builder.finish()
}
