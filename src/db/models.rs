//! Database row types for PostgreSQL
//!
//! These map directly to table rows and convert into the domain models
//! in `crate::models`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{
    GuideCacheEntry, GuideCredentials, PlaylistConfig, ProviderCredentials, RunState, RunStatus,
};

/// Playlist row (registry-owned, read-only here)
#[derive(Debug, Clone, FromRow)]
pub struct PlaylistRow {
    pub id: Uuid,
    pub name: String,
    pub provider_base_url: String,
    pub provider_username: String,
    pub provider_password: String,
    pub guide_username: Option<String>,
    pub guide_password: Option<String>,
    pub auto_update_enabled: bool,
    pub schedule_interval_hours: i32,
}

impl From<PlaylistRow> for PlaylistConfig {
    fn from(row: PlaylistRow) -> Self {
        // Guide login only counts when both halves are present
        let guide = match (row.guide_username, row.guide_password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                Some(GuideCredentials { username, password })
            }
            _ => None,
        };

        PlaylistConfig {
            id: row.id,
            name: row.name,
            provider: ProviderCredentials {
                base_url: row.provider_base_url,
                username: row.provider_username,
                password: row.provider_password,
            },
            guide,
            auto_update_enabled: row.auto_update_enabled,
            schedule_interval_hours: row.schedule_interval_hours.max(1) as u32,
        }
    }
}

/// Run state row
#[derive(Debug, Clone, FromRow)]
pub struct RunStateRow {
    pub playlist_id: Uuid,
    pub status: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<RunStateRow> for RunState {
    fn from(row: RunStateRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!("Playlist {}: {}, treating as failed", row.playlist_id, e);
            RunStatus::Failed
        });

        RunState {
            playlist_id: row.playlist_id,
            status,
            last_run_at: row.last_run_at,
            last_error: row.last_error,
        }
    }
}

/// Guide cache row
#[derive(Debug, Clone, FromRow)]
pub struct GuideCacheRow {
    pub playlist_id: Uuid,
    pub channel_data: serde_json::Value,
    pub channel_count: i32,
    pub epg_program_count: i32,
    pub last_updated: DateTime<Utc>,
}

impl From<GuideCacheRow> for GuideCacheEntry {
    fn from(row: GuideCacheRow) -> Self {
        GuideCacheEntry {
            playlist_id: row.playlist_id,
            channel_data: row.channel_data,
            channel_count: row.channel_count,
            epg_program_count: row.epg_program_count,
            last_updated: row.last_updated,
        }
    }
}
