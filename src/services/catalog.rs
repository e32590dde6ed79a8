//! Provider catalog client
//!
//! Fetches a playlist's channel list and EPG from its upstream panel. The
//! job runner treats the result as an opaque snapshot.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{GuideSnapshot, PlaylistConfig, ProviderCredentials};
use crate::services::xtream::{XtreamClient, XtreamError};

/// Catalog fetch failures
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("provider account for {server} is not active ({status})")]
    AccountInactive { server: String, status: String },
    #[error("provider returned no channels")]
    NoChannels,
    #[error(transparent)]
    Xtream(#[from] XtreamError),
}

#[async_trait]
pub trait ProviderCatalogClient: Send + Sync {
    /// Re-submit provider credentials, then fetch the guide
    async fn fetch_full_update(&self, playlist: &PlaylistConfig) -> Result<GuideSnapshot, CatalogError>;

    /// Fetch only the channel list and EPG
    async fn fetch_guide_only(&self, playlist: &PlaylistConfig) -> Result<GuideSnapshot, CatalogError>;
}

/// Catalog client for Xtream Codes panels
pub struct XtreamCatalogClient {
    http: Client,
    user_agent: String,
}

impl XtreamCatalogClient {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        // Reseller panels commonly run self-signed certificates
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            http,
            user_agent: user_agent.to_string(),
        })
    }

    fn client(&self, creds: &ProviderCredentials) -> XtreamClient {
        XtreamClient::new(self.http.clone(), creds, &self.user_agent)
    }

    async fn fetch_guide(&self, creds: &ProviderCredentials) -> Result<GuideSnapshot, CatalogError> {
        let client = self.client(creds);

        let (categories, channels, programmes) = tokio::try_join!(
            client.get_live_categories(),
            client.get_live_streams(),
            client.count_epg_programmes(),
        )?;

        if channels.is_empty() {
            return Err(CatalogError::NoChannels);
        }

        debug!(
            server = %creds.base_url,
            categories = categories.len(),
            channels = channels.len(),
            programmes,
            "Fetched guide"
        );

        Ok(GuideSnapshot {
            channel_count: clamp_count(channels.len() as u64),
            epg_program_count: clamp_count(programmes),
            channel_data: serde_json::json!({
                "categories": categories,
                "channels": channels,
            }),
        })
    }
}

fn clamp_count(n: u64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[async_trait]
impl ProviderCatalogClient for XtreamCatalogClient {
    async fn fetch_full_update(&self, playlist: &PlaylistConfig) -> Result<GuideSnapshot, CatalogError> {
        let auth = self.client(&playlist.provider).get_auth().await?;
        if !auth.user_info.is_active() {
            return Err(CatalogError::AccountInactive {
                server: playlist.provider.base_url.clone(),
                status: auth.user_info.status_label().to_string(),
            });
        }

        info!(
            playlist_id = %playlist.id,
            expires = auth.user_info.exp_date.as_deref().unwrap_or("never"),
            max_connections = auth.user_info.max_connections.as_deref().unwrap_or("?"),
            "Provider credentials accepted"
        );

        self.fetch_guide(&playlist.guide_credentials()).await
    }

    async fn fetch_guide_only(&self, playlist: &PlaylistConfig) -> Result<GuideSnapshot, CatalogError> {
        self.fetch_guide(&playlist.guide_credentials()).await
    }
}
