use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::resolver::DateSelector;

const LISTINGS_PATH: &str = "tv-listings";
const DATE_PARAM: &str = "date";

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#).expect("charset pattern is valid")
});

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out: {url}")]
    Timeout { url: String },
    #[error("connection failed: {url}: {message}")]
    Connection { url: String, message: String },
    #[error("HTTP status error: {status} {url}")]
    HttpStatus { status: StatusCode, url: String },
    #[error("failed to read body of {url}: {message}")]
    Body { url: String, message: String },
    #[error("invalid listings URL: {0}")]
    InvalidUrl(String),
    #[error("date index {0} must be resolved against known dates before fetching")]
    UnresolvedIndex(usize),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error, url: &Url) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus { status, url }
        } else {
            FetchError::Connection {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// The single network boundary of the scraper.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the listings page for `selector`. Positive indexes must be
    /// resolved to a literal first.
    async fn fetch(&self, selector: &DateSelector) -> Result<String, FetchError>;
}

/// Fetches listings pages over HTTP with one shared connection pool.
pub struct HttpFetcher {
    client: Client,
    listings_url: Url,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        let listings_url = listings_url(&config.base_url)?;

        Ok(Self {
            client,
            listings_url,
        })
    }

    /// Builds the request URL; today is the bare listings path.
    fn url_for(&self, selector: &DateSelector) -> Result<Url, FetchError> {
        request_url(&self.listings_url, selector)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, selector: &DateSelector) -> Result<String, FetchError> {
        let url = self.url_for(selector)?;
        info!(url = url.as_str(), "Fetching TV listings");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, &url))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_owned);

        let bytes = response.bytes().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(decode_body(content_type.as_deref(), &bytes))
    }
}

fn listings_url(base_url: &str) -> Result<Url, FetchError> {
    let raw = format!("{}/{}", base_url.trim_end_matches('/'), LISTINGS_PATH);
    Url::parse(&raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))
}

fn request_url(listings_url: &Url, selector: &DateSelector) -> Result<Url, FetchError> {
    let mut url = listings_url.clone();
    match selector {
        DateSelector::None | DateSelector::Index(0) => {}
        DateSelector::Index(n) => return Err(FetchError::UnresolvedIndex(*n)),
        DateSelector::Literal(date) => {
            url.query_pairs_mut().append_pair(DATE_PARAM, date);
        }
    }
    Ok(url)
}

/// Decodes a response body: header charset, then `<meta>` charset, then detection.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> String {
    // 1. Charset from header
    if let Some(charset) = content_type.and_then(|ct| ct.split("charset=").nth(1)) {
        if let Some(encoding) = Encoding::for_label(charset.trim().as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }

    // 2. Charset from meta tag (ASCII-safe)
    let ascii_head = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);
    if let Some(charset) = META_CHARSET.captures(&ascii_head).and_then(|cap| cap.get(1)) {
        if let Some(encoding) = Encoding::for_label(charset.as_str().as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }

    // 3. Fallback
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}
