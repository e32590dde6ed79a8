use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Channel list plus EPG as returned by the provider catalog client.
///
/// `channel_data` is opaque to the scheduler; it is stored and served as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideSnapshot {
    pub channel_data: serde_json::Value,
    pub channel_count: i32,
    pub epg_program_count: i32,
}

/// Cached guide for one playlist (one row per playlist)
#[derive(Debug, Clone, PartialEq)]
pub struct GuideCacheEntry {
    pub playlist_id: Uuid,
    pub channel_data: serde_json::Value,
    pub channel_count: i32,
    pub epg_program_count: i32,
    pub last_updated: DateTime<Utc>,
}

impl GuideCacheEntry {
    pub fn from_snapshot(playlist_id: Uuid, snapshot: GuideSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            playlist_id,
            channel_data: snapshot.channel_data,
            channel_count: snapshot.channel_count,
            epg_program_count: snapshot.epg_program_count,
            last_updated: now,
        }
    }

    /// Counts for display, without the snapshot blob
    pub fn summary(&self) -> GuideSummary {
        GuideSummary {
            playlist_id: self.playlist_id,
            channel_count: self.channel_count,
            epg_program_count: self.epg_program_count,
            last_updated: self.last_updated,
        }
    }
}

/// Guide cache metadata for dashboards
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideSummary {
    pub playlist_id: Uuid,
    pub channel_count: i32,
    pub epg_program_count: i32,
    pub last_updated: DateTime<Utc>,
}
