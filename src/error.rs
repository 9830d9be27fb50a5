//! Error types for document assembly

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinderError {
    #[error("PDF structure error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Document has no pages")]
    NoPages,

    #[error("Encrypted document: {0}")]
    Encrypted(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Fallback assembly failed: {0}")]
    Fallback(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BinderError>;
