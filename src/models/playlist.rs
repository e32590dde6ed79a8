use uuid::Uuid;

/// Credentials submitted to the upstream provider panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    /// Panel base URL (e.g., "http://example.com:8080")
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Guide (EPG) login, kept apart from the provider login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideCredentials {
    pub username: String,
    pub password: String,
}

/// Playlist configuration as held by the playlist registry.
///
/// Only administrators change these fields; this service reads them.
#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    pub id: Uuid,
    pub name: String,
    pub provider: ProviderCredentials,
    pub guide: Option<GuideCredentials>,
    pub auto_update_enabled: bool,
    pub schedule_interval_hours: u32,
}

impl PlaylistConfig {
    /// Credentials used to pull the channel list and EPG.
    ///
    /// Guide logins share the provider's panel; without one the provider
    /// login is used.
    pub fn guide_credentials(&self) -> ProviderCredentials {
        match &self.guide {
            Some(guide) => ProviderCredentials {
                base_url: self.provider.base_url.clone(),
                username: guide.username.clone(),
                password: guide.password.clone(),
            },
            None => self.provider.clone(),
        }
    }

    /// Configured interval as a chrono duration (never below one hour)
    pub fn schedule_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.schedule_interval_hours.max(1)))
    }
}
