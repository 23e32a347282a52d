use std::fmt;

use watch_core::{Classification, ProductId};

/// Raw body of a product page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    /// Address after redirects.
    pub final_url: String,
    /// `Content-Type` header, charset parameter included.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { limit: u64 },
    UnsupportedContentType { content_type: String },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { limit } => write!(f, "page larger than {limit} bytes"),
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Progress of a scan pass, reported to a [`crate::ScanSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Record is disabled and was not looked at.
    Skipped { id: ProductId },
    /// Record hit the error limit during this pass and is now disabled.
    Disabled { id: ProductId, name: String },
    /// Fetching, extracting or decoding failed; the failure counter stays raised.
    RecordFailed {
        id: ProductId,
        attempts: i32,
        reason: String,
    },
    Observed {
        id: ProductId,
        name: String,
        classification: Classification,
        standard: String,
        member: String,
    },
    /// Delivery failed; the message went to the retry queue.
    NotificationFailed { id: Option<ProductId> },
    SummarySent { delivered: bool },
}
