use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("XML parsing error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<quick_xml::Error> for SyncError {
    fn from(err: quick_xml::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SyncError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        SyncError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
