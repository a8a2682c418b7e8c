pub mod http_fetcher;

use std::borrow::Cow;

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use url::Url;

use crate::app::Result;
use crate::xml::{self, XmlValue};

/// One HTTP GET, optionally with basic-auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            username: None,
            password: None,
        }
    }

    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Attach credentials. An empty username means no authentication.
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self.password = password;
        self
    }
}

/// The completed body of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    body: Vec<u8>,
    status: u16,
    content_type: Option<String>,
}

impl FetchResult {
    pub fn new(body: Vec<u8>, status: u16, content_type: Option<String>) -> Self {
        Self {
            body,
            status,
            content_type,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Character encoding of the body.
    ///
    /// The charset comes from the `Content-Type` header, then from the XML
    /// declaration, and defaults to UTF-8. Unknown labels fall back to UTF-8.
    pub fn encoding(&self) -> &'static Encoding {
        self.content_type
            .as_deref()
            .and_then(charset_from_content_type)
            .or_else(|| charset_from_xml_declaration(&self.body))
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8)
    }

    /// Body decoded as text. Malformed sequences become U+FFFD.
    pub fn string(&self) -> Cow<'_, str> {
        let (text, _, _) = self.encoding().decode(&self.body);
        text
    }

    /// Parse the decoded text, so the XML view sees the same characters as
    /// [`string`](Self::string).
    pub fn dictionary_from_xml(&self) -> Result<XmlValue> {
        xml::parse_document(self.string().as_bytes())
    }
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

fn charset_from_xml_declaration(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let decl = head.strip_prefix("<?xml")?;
    let decl = &decl[..decl.find("?>")?];
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].to_ascii_lowercase())
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request and return the accumulated body.
    ///
    /// Dropping the returned future cancels the transfer.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult>;
}
