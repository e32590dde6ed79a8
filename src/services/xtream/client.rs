//! Xtream Codes API Client
//!
//! HTTP client for the Player API v2 and the XMLTV export.

use super::types::*;
use futures::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::models::ProviderCredentials;

/// Xtream API Error types
#[derive(Debug, thiserror::Error)]
pub enum XtreamError {
    /// Server URL could not be turned into an endpoint
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
    /// Network/connection error
    #[error("Network error: {0}")]
    Network(String),
    /// Request exceeded the client timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP error (non-2xx status)
    #[error("HTTP error: {0}")]
    Http(u16),
    /// JSON parsing error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Empty response from server
    #[error("Empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for XtreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            XtreamError::Timeout
        } else if let Some(status) = e.status() {
            XtreamError::Http(status.as_u16())
        } else {
            XtreamError::Network(e.to_string())
        }
    }
}

const PROGRAMME_TAG: &[u8] = b"<programme";

/// Counts `<programme` elements across arbitrarily split chunks
#[derive(Debug, Default)]
pub struct ProgrammeCounter {
    tail: Vec<u8>,
    count: u64,
}

impl ProgrammeCounter {
    pub fn feed(&mut self, chunk: &[u8]) {
        let mut buf = std::mem::take(&mut self.tail);
        buf.extend_from_slice(chunk);

        self.count += buf
            .windows(PROGRAMME_TAG.len())
            .filter(|w| *w == PROGRAMME_TAG)
            .count() as u64;

        // Keep just enough bytes to complete a tag split across chunks
        let keep = PROGRAMME_TAG.len() - 1;
        if buf.len() > keep {
            buf.drain(..buf.len() - keep);
        }
        self.tail = buf;
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// First `max_chars` characters of a response body, for logging
fn preview(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| &text[..end])
}

/// Xtream API Client bound to one set of credentials
pub struct XtreamClient {
    http: Client,
    server: String,
    username: String,
    password: String,
    user_agent: String,
}

impl XtreamClient {
    /// Create a client over a shared `reqwest::Client`
    pub fn new(http: Client, creds: &ProviderCredentials, user_agent: &str) -> Self {
        Self {
            http,
            server: creds.base_url.trim_end_matches('/').to_string(),
            username: creds.username.clone(),
            password: creds.password.clone(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Build `{server}/{path}?username=..&password=..[&action=..]`
    fn endpoint(&self, path: &str, action: Option<&str>) -> Result<Url, XtreamError> {
        let mut url = Url::parse(&format!("{}/{}", self.server, path))
            .map_err(|e| XtreamError::InvalidUrl(format!("{}: {}", self.server, e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("username", &self.username)
                .append_pair("password", &self.password);
            if let Some(action) = action {
                query.append_pair("action", action);
            }
        }

        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, XtreamError> {
        let response = self
            .http
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(XtreamError::Http(status.as_u16()));
        }
        Ok(response)
    }

    /// Make a Player API request with optional action parameter
    async fn get<T: DeserializeOwned>(&self, action: Option<&str>) -> Result<T, XtreamError> {
        let url = self.endpoint("player_api.php", action)?;
        let label = action.unwrap_or("auth");

        debug!("Xtream API request: {}", label);

        let text = self.send(url).await?.text().await?;

        // Handle empty responses (some endpoints return empty for no results)
        if text.is_empty() || text == "[]" || text == "null" {
            return Err(XtreamError::EmptyResponse);
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse Xtream response for action '{}': {}", label, e);
            debug!("Response text: {}", preview(&text, 500));
            XtreamError::Parse(e.to_string())
        })
    }

    /// Submit credentials and get account info (user_info + server_info)
    pub async fn get_auth(&self) -> Result<XtreamAuthResponse, XtreamError> {
        self.get(None).await
    }

    /// Get live stream categories (empty when the panel has none)
    pub async fn get_live_categories(&self) -> Result<Vec<XtreamCategory>, XtreamError> {
        match self.get(Some("get_live_categories")).await {
            Err(XtreamError::EmptyResponse) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Get all live streams
    pub async fn get_live_streams(&self) -> Result<Vec<XtreamLiveStream>, XtreamError> {
        self.get(Some("get_live_streams")).await
    }

    /// Stream `xmltv.php` and count its programmes without buffering it
    pub async fn count_epg_programmes(&self) -> Result<u64, XtreamError> {
        let url = self.endpoint("xmltv.php", None)?;
        debug!("Xtream XMLTV request");

        let mut body = self.send(url).await?.bytes_stream();
        let mut counter = ProgrammeCounter::default();
        while let Some(chunk) = body.next().await {
            counter.feed(&chunk?);
        }

        Ok(counter.count())
    }
}
