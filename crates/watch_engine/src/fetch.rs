//! Product page download.

use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use watch_logging::watch_debug;

use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput};

// Shops serve the priced layout to browsers only.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// Media types a product page may be served as.
const PAGE_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

/// Limits applied to every product page request.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

/// Retrieves a product page.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

/// One HTTP client shared by every product of a pass.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    max_bytes: u64,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(settings.user_agent)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }

    fn too_large(&self) -> FetchError {
        FetchError::new(
            FailureKind::TooLarge {
                limit: self.max_bytes,
            },
            "product page exceeds the size limit",
        )
    }

    /// Streams the body, stopping as soon as it passes `max_bytes`.
    async fn read_body(&self, response: Response) -> Result<Vec<u8>, FetchError> {
        if response
            .content_length()
            .is_some_and(|declared| declared > self.max_bytes)
        {
            return Err(self.too_large());
        }

        let mut body = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.try_next().await.map_err(transport_failure)? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let target = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        let content_type = page_content_type(response.headers())?;
        let final_url = response.url().to_string();

        let bytes = self.read_body(response).await?;
        watch_debug!("Product page {} is {} bytes", final_url, bytes.len());

        Ok(FetchOutput {
            bytes,
            metadata: FetchMetadata {
                final_url,
                content_type,
            },
        })
    }
}

/// A missing header is let through; the charset decoder sniffs those pages.
fn page_content_type(headers: &HeaderMap) -> Result<Option<String>, FetchError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(None);
    };
    let content_type = String::from_utf8_lossy(value.as_bytes()).into_owned();
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if PAGE_TYPES
        .iter()
        .any(|page_type| page_type.eq_ignore_ascii_case(media_type))
    {
        Ok(Some(content_type))
    } else {
        Err(FetchError::new(
            FailureKind::UnsupportedContentType {
                content_type: media_type.to_string(),
            },
            "not a product page",
        ))
    }
}

fn transport_failure(err: reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_redirect() {
        FailureKind::RedirectLimitExceeded
    } else {
        FailureKind::Network
    };
    FetchError::new(kind, err.to_string())
}
