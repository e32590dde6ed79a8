//! Xtream Codes API Types
//!
//! Response types for the Player API v2 calls used by guide updates.

use serde::{Deserialize, Serialize};

// ============================================================================
// Authentication Response Types
// ============================================================================

/// Main authentication response from player_api.php (no action)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct XtreamAuthResponse {
    pub user_info: XtreamUserInfo,
    #[serde(default)]
    pub server_info: Option<XtreamServerInfo>,
}

/// User account information
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct XtreamUserInfo {
    #[serde(default)]
    pub username: Option<String>,
    /// Panels answer bad logins with `auth: 0` and no status
    #[serde(default)]
    pub auth: Option<i32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub exp_date: Option<String>,
    #[serde(default)]
    pub max_connections: Option<String>,
}

impl XtreamUserInfo {
    /// Check if account is active
    pub fn is_active(&self) -> bool {
        self.auth != Some(0)
            && self
                .status
                .as_deref()
                .map(|s| s.eq_ignore_ascii_case("active"))
                .unwrap_or(false)
    }

    /// Status for error messages
    pub fn status_label(&self) -> &str {
        match (self.auth, self.status.as_deref()) {
            (Some(0), _) => "authentication rejected",
            (_, Some(status)) => status,
            (_, None) => "unknown",
        }
    }
}

/// Server information
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct XtreamServerInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub timestamp_now: Option<i64>,
}

// ============================================================================
// Live Types
// ============================================================================

/// Live category
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct XtreamCategory {
    pub category_id: String,
    pub category_name: String,
    #[serde(default)]
    pub parent_id: Option<i32>,
}

/// Live stream (channel) information
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct XtreamLiveStream {
    #[serde(default)]
    pub num: Option<i32>,
    pub name: String,
    pub stream_id: i64,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default)]
    pub epg_channel_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tv_archive: Option<i32>,
}
