use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn new(source: &str, key: &str) -> Self {
        Self {
            id: Self::generate_id(source, key),
            title: None,
            link: None,
            content: None,
            excerpt: None,
            author: None,
            categories: Vec::new(),
            published_at: None,
        }
    }

    /// Generate a deterministic ID from the server path and the post's own key
    pub fn generate_id(source: &str, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    /// Get the best available content for display
    pub fn display_content(&self) -> &str {
        self.content
            .as_deref()
            .or(self.excerpt.as_deref())
            .unwrap_or("")
    }
}
