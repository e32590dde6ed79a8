use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted status of a playlist's auto-update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RunStatus::Idle),
            "running" => Ok(RunStatus::Running),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Run state for one playlist
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub playlist_id: Uuid,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RunState {
    /// State for a playlist that has never been scheduled
    pub fn never_run(playlist_id: Uuid) -> Self {
        Self {
            playlist_id,
            status: RunStatus::Idle,
            last_run_at: None,
            last_error: None,
        }
    }

    /// Same state with the status flipped to running; history is kept
    pub fn running(&self) -> Self {
        Self {
            status: RunStatus::Running,
            ..self.clone()
        }
    }

    pub fn succeeded(playlist_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            playlist_id,
            status: RunStatus::Idle,
            last_run_at: Some(at),
            last_error: None,
        }
    }

    pub fn failed(playlist_id: Uuid, at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            playlist_id,
            status: RunStatus::Failed,
            last_run_at: Some(at),
            last_error: Some(error.into()),
        }
    }
}
