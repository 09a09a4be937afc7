//! Token Risk Enrichment
//!
//! Looks up a freshly created token on the QuickIntel honeypot scanner. The lookup
//! is best-effort: [`HoneypotClient::fetch`] reports every failure, while the
//! [`TokenEnricher`] implementation logs it and answers `None`.

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Honeypot lookup endpoint
pub const DEFAULT_HONEYPOT_URL: &str = "https://app.quickintel.io/api/quicki/gethoneypot";

/// Exchange identifier the scanner expects
pub const EXCHANGE: &str = "uniswap2";

/// Paired-token hint; the scanner picks the pair itself
pub const PAIRED_TOKEN: &str = "default";

const SCANNER_REFERER: &str = "https://app.quickintel.io/scanner";
const SCANNER_AUTHORITY: &str = "app.quickintel.io";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

/// Errors that can occur during a honeypot lookup
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("scanner returned HTTP {0}")]
    Status(u16),

    #[error("malformed scanner response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("scanner response has no data object")]
    MissingData,

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

/// Identity data the scanner knows about a token
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentInfo {
    #[serde(default)]
    pub token_name: Option<String>,
    #[serde(default)]
    pub token_symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HoneypotResponse {
    data: Option<EnrichmentInfo>,
}

/// Something that can attach identity data to a token address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenEnricher: Send + Sync {
    /// `None` means "nothing known", whatever the reason
    async fn lookup(&self, token: Address) -> Option<EnrichmentInfo>;
}

/// HTTP client for the QuickIntel honeypot scanner
#[derive(Debug, Clone)]
pub struct HoneypotClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HoneypotClient {
    /// Create a client against the given endpoint
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Create a client against the public scanner
    pub fn with_default_endpoint(timeout: Duration) -> Result<Self, EnrichmentError> {
        Self::new(DEFAULT_HONEYPOT_URL, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the scanner's view of a token, surfacing every failure
    pub async fn fetch(&self, token: Address) -> Result<EnrichmentInfo, EnrichmentError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .headers(scanner_headers(token)?)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        parse_honeypot_body(&body)
    }
}

#[async_trait]
impl TokenEnricher for HoneypotClient {
    async fn lookup(&self, token: Address) -> Option<EnrichmentInfo> {
        match self.fetch(token).await {
            Ok(info) => {
                debug!(
                    token = %token,
                    name = ?info.token_name,
                    symbol = ?info.token_symbol,
                    "honeypot scanner answered"
                );
                Some(info)
            }
            Err(e) => {
                warn!(
                    token = %token,
                    endpoint = %self.endpoint(),
                    error = %e,
                    "honeypot lookup failed, continuing without it"
                );
                None
            }
        }
    }
}

/// Build the header set the scanner requires; it rejects requests that do not look
/// like they come from its own web page
pub fn scanner_headers(token: Address) -> Result<HeaderMap, EnrichmentError> {
    let mut headers = HeaderMap::new();
    headers.insert("authority", HeaderValue::from_static(SCANNER_AUTHORITY));
    headers.insert("address", HeaderValue::from_str(&token.to_string())?);
    headers.insert("exchange", HeaderValue::from_static(EXCHANGE));
    headers.insert("pairedtoken", HeaderValue::from_static(PAIRED_TOKEN));
    headers.insert(REFERER, HeaderValue::from_static(SCANNER_REFERER));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    Ok(headers)
}

/// Extract the `data` object of a scanner response
pub fn parse_honeypot_body(body: &str) -> Result<EnrichmentInfo, EnrichmentError> {
    let response: HoneypotResponse = serde_json::from_str(body)?;
    response.data.ok_or(EnrichmentError::MissingData)
}
