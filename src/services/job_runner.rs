//! Auto-update job runner
//!
//! Runs one update cycle for one playlist:
//! 1. take the playlist lock (a held lock is a `Conflict`, never a wait)
//! 2. persist status `running`
//! 3. fetch from the provider (cancellable on shutdown)
//! 4. on success overwrite the guide cache, then persist `idle`
//! 5. on failure persist `failed` and leave the cached guide untouched
//! 6. release the lock on every path
//!
//! A guide-only refresh follows the same lock discipline but never touches
//! the run state.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{GuideCacheEntry, GuideSnapshot, PlaylistConfig, RunState};
use crate::services::catalog::{CatalogError, ProviderCatalogClient};
use crate::services::guide_cache::GuideCacheStore;
use crate::services::metrics::{LOCK_CONFLICTS_TOTAL, RUNS_TOTAL, RUN_DURATION_SECONDS};
use crate::services::registry::PlaylistRegistry;
use crate::services::run_lock::{LockAttempt, RunLockGuard, RunLockManager};
use crate::services::run_state::RunStateStore;

/// Which fetch a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Provider credential re-submission plus guide fetch, tracked in run state
    Full,
    /// Guide fetch only; run state is left alone
    GuideOnly,
}

impl UpdateKind {
    pub fn label(&self) -> &'static str {
        match self {
            UpdateKind::Full => "full",
            UpdateKind::GuideOnly => "guide",
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub playlist_id: Uuid,
    pub updated: bool,
    pub channel_count: i32,
    pub epg_program_count: i32,
}

/// Why a run did not complete
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Another run holds the playlist lock
    #[error(
        "update already in progress: playlist {playlist_id} is currently running (lock held for {secs}s)",
        secs = .held_for.as_secs()
    )]
    Conflict { playlist_id: Uuid, held_for: Duration },
    #[error("playlist {0} not found")]
    PlaylistNotFound(Uuid),
    #[error("catalog fetch failed: {0}")]
    Fetch(#[from] CatalogError),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("lock backend unavailable: {0}")]
    Lock(String),
    #[error("update cancelled: shutting down")]
    Cancelled,
    /// The task running the update panicked
    #[error("update task crashed: {0}")]
    Crashed(String),
}

impl UpdateError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, UpdateError::Conflict { .. })
    }

    fn persistence(e: anyhow::Error) -> Self {
        UpdateError::Persistence(format!("{:#}", e))
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            UpdateError::Conflict { .. } => "conflict",
            UpdateError::PlaylistNotFound(_) => "not_found",
            UpdateError::Fetch(_) => "fetch_failed",
            UpdateError::Persistence(_) => "persistence_failed",
            UpdateError::Lock(_) => "lock_failed",
            UpdateError::Cancelled => "cancelled",
            UpdateError::Crashed(_) => "crashed",
        }
    }
}

/// Runs updates for single playlists
pub struct JobRunner {
    registry: Arc<dyn PlaylistRegistry>,
    catalog: Arc<dyn ProviderCatalogClient>,
    locks: Arc<dyn RunLockManager>,
    run_states: Arc<dyn RunStateStore>,
    guide_cache: Arc<dyn GuideCacheStore>,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(
        registry: Arc<dyn PlaylistRegistry>,
        catalog: Arc<dyn ProviderCatalogClient>,
        locks: Arc<dyn RunLockManager>,
        run_states: Arc<dyn RunStateStore>,
        guide_cache: Arc<dyn GuideCacheStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            catalog,
            locks,
            run_states,
            guide_cache,
            shutdown,
        }
    }

    /// Full provider re-sync for one playlist
    pub async fn run_once(&self, playlist_id: Uuid) -> Result<UpdateReport, UpdateError> {
        self.execute(playlist_id, UpdateKind::Full).await
    }

    /// Re-fetch only the guide; run state is not touched
    pub async fn refresh_cache_only(&self, playlist_id: Uuid) -> Result<UpdateReport, UpdateError> {
        self.execute(playlist_id, UpdateKind::GuideOnly).await
    }

    async fn execute(&self, playlist_id: Uuid, kind: UpdateKind) -> Result<UpdateReport, UpdateError> {
        let lock = match self.locks.try_acquire(playlist_id).await {
            Ok(LockAttempt::Acquired(lock)) => lock,
            Ok(LockAttempt::Busy { held_for }) => {
                LOCK_CONFLICTS_TOTAL.inc();
                RUNS_TOTAL.with_label_values(&[kind.label(), "conflict"]).inc();
                info!(
                    playlist_id = %playlist_id,
                    kind = kind.label(),
                    held_for_secs = held_for.as_secs(),
                    "Update rejected, playlist is currently running"
                );
                return Err(UpdateError::Conflict {
                    playlist_id,
                    held_for,
                });
            }
            Err(e) => {
                RUNS_TOTAL.with_label_values(&[kind.label(), "lock_failed"]).inc();
                error!(playlist_id = %playlist_id, "Failed to take playlist lock: {:#}", e);
                return Err(UpdateError::Lock(format!("{:#}", e)));
            }
        };

        let guard = RunLockGuard::new(self.locks.clone(), lock);
        let started = Instant::now();

        let result = self.execute_locked(playlist_id, kind).await;

        guard.release().await;

        RUN_DURATION_SECONDS
            .with_label_values(&[kind.label()])
            .observe(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome_label(),
        };
        RUNS_TOTAL.with_label_values(&[kind.label(), outcome]).inc();

        result
    }

    /// Everything that happens while the lock is held
    async fn execute_locked(&self, playlist_id: Uuid, kind: UpdateKind) -> Result<UpdateReport, UpdateError> {
        let playlist = match self.registry.get_playlist(playlist_id).await {
            Ok(Some(playlist)) => playlist,
            Ok(None) => return Err(UpdateError::PlaylistNotFound(playlist_id)),
            Err(e) => {
                let err = UpdateError::persistence(e);
                if kind == UpdateKind::Full {
                    self.record_failure(playlist_id, &err).await;
                }
                return Err(err);
            }
        };

        info!(
            playlist_id = %playlist_id,
            playlist = %playlist.name,
            kind = kind.label(),
            "Playlist update started"
        );

        match kind {
            UpdateKind::Full => self.full_update(&playlist).await,
            UpdateKind::GuideOnly => {
                let result = match self.fetch(&playlist, kind).await {
                    Ok(snapshot) => self.store_snapshot(playlist_id, snapshot).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &result {
                    warn!(playlist_id = %playlist_id, "Guide refresh failed, cached guide kept: {}", e);
                }
                result
            }
        }
    }

    async fn full_update(&self, playlist: &PlaylistConfig) -> Result<UpdateReport, UpdateError> {
        let playlist_id = playlist.id;

        // Persist `running` before fetching so a crash mid-fetch stays visible
        let previous = match self.run_states.get(playlist_id).await {
            Ok(state) => state.unwrap_or_else(|| RunState::never_run(playlist_id)),
            Err(e) => {
                let err = UpdateError::persistence(e);
                self.record_failure(playlist_id, &err).await;
                return Err(err);
            }
        };
        if let Err(e) = self.run_states.put(&previous.running()).await {
            let err = UpdateError::persistence(e);
            self.record_failure(playlist_id, &err).await;
            return Err(err);
        }

        let result = match self.fetch(playlist, UpdateKind::Full).await {
            Ok(snapshot) => self.store_snapshot(playlist_id, snapshot).await,
            Err(e) => Err(e),
        };

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.record_failure(playlist_id, &err).await;
                return Err(err);
            }
        };

        if let Err(e) = self
            .run_states
            .put(&RunState::succeeded(playlist_id, Utc::now()))
            .await
        {
            let err = UpdateError::persistence(e);
            self.record_failure(playlist_id, &err).await;
            return Err(err);
        }

        info!(
            playlist_id = %playlist_id,
            channels = report.channel_count,
            epg_programs = report.epg_program_count,
            "Playlist update complete"
        );

        Ok(report)
    }

    /// Call the catalog client, giving up if the process is shutting down
    async fn fetch(&self, playlist: &PlaylistConfig, kind: UpdateKind) -> Result<GuideSnapshot, UpdateError> {
        let fetch = async {
            match kind {
                UpdateKind::Full => self.catalog.fetch_full_update(playlist).await,
                UpdateKind::GuideOnly => self.catalog.fetch_guide_only(playlist).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(UpdateError::Cancelled),
            result = fetch => result.map_err(UpdateError::from),
        }
    }

    async fn store_snapshot(&self, playlist_id: Uuid, snapshot: GuideSnapshot) -> Result<UpdateReport, UpdateError> {
        let entry = GuideCacheEntry::from_snapshot(playlist_id, snapshot, Utc::now());
        self.guide_cache
            .upsert(&entry)
            .await
            .map_err(UpdateError::persistence)?;

        Ok(UpdateReport {
            playlist_id,
            updated: true,
            channel_count: entry.channel_count,
            epg_program_count: entry.epg_program_count,
        })
    }

    /// Persist `failed` for this attempt; the cached guide is left as-is
    async fn record_failure(&self, playlist_id: Uuid, err: &UpdateError) {
        error!(playlist_id = %playlist_id, "Playlist update failed: {}", err);

        let state = RunState::failed(playlist_id, Utc::now(), err.to_string());
        if let Err(e) = self.run_states.put(&state).await {
            error!(
                playlist_id = %playlist_id,
                "Could not record failed run state: {:#}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunStatus;
    use crate::services::testing::{snapshot, wait_until, Harness};

    #[tokio::test]
    async fn test_first_run_fills_cache_and_goes_idle() {
        let h = Harness::new();
        let p = h.add_playlist(24, true);
        h.catalog.set_outcome(p, Ok(snapshot(120, 4300)));

        let report = h.runner.run_once(p).await.unwrap();
        assert_eq!(report.channel_count, 120);
        assert_eq!(report.epg_program_count, 4300);
        assert!(report.updated);

        let entry = h.guide_cache.entry(p).unwrap();
        assert_eq!(entry.channel_count, 120);
        assert_eq!(entry.epg_program_count, 4300);

        let state = h.run_states.state(p).unwrap();
        assert_eq!(state.status, RunStatus::Idle);
        assert!(state.last_run_at.is_some());
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_stale_cache() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.catalog.set_outcome(p, Ok(snapshot(50, 900)));
        h.runner.run_once(p).await.unwrap();
        let before = h.guide_cache.entry(p).unwrap();

        h.catalog.set_outcome(p, Err(502));
        let err = h.runner.run_once(p).await.unwrap_err();
        assert!(matches!(err, UpdateError::Fetch(_)));

        assert_eq!(h.guide_cache.entry(p).unwrap(), before);
        assert_eq!(h.guide_cache.upserts(), 1);

        let state = h.run_states.state(p).unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.last_run_at.unwrap() >= before.last_updated);
        assert!(state.last_error.unwrap().contains("HTTP error: 502"));
    }

    #[tokio::test]
    async fn test_failed_playlist_can_run_again() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.catalog.set_outcome(p, Err(503));
        assert!(h.runner.run_once(p).await.is_err());
        assert_eq!(h.run_states.state(p).unwrap().status, RunStatus::Failed);

        h.catalog.set_outcome(p, Ok(snapshot(10, 20)));
        h.runner.run_once(p).await.unwrap();
        let state = h.run_states.state(p).unwrap();
        assert_eq!(state.status, RunStatus::Idle);
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn test_repeated_refresh_overwrites_single_entry() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);

        h.catalog.set_outcome(p, Ok(snapshot(100, 1000)));
        h.runner.run_once(p).await.unwrap();
        let first = h.guide_cache.entry(p).unwrap();

        h.catalog.set_outcome(p, Ok(snapshot(130, 1500)));
        h.runner.refresh_cache_only(p).await.unwrap();

        assert_eq!(h.guide_cache.len(), 1);
        let latest = h.guide_cache.entry(p).unwrap();
        assert_eq!(latest.channel_count, 130);
        assert_eq!(latest.epg_program_count, 1500);
        assert_eq!(latest.channel_data, snapshot(130, 1500).channel_data);
        assert!(latest.last_updated >= first.last_updated);
    }

    #[tokio::test]
    async fn test_refresh_cache_only_leaves_run_state_alone() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.catalog.set_outcome(p, Ok(snapshot(7, 70)));

        let report = h.runner.refresh_cache_only(p).await.unwrap();
        assert_eq!(report.channel_count, 7);
        assert_eq!(h.run_states.writes(), 0);
        assert!(h.run_states.state(p).is_none());
        assert_eq!(h.catalog.guide_calls(), 1);
        assert_eq!(h.catalog.full_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_run_state_alone() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.catalog.set_outcome(p, Err(500));

        assert!(matches!(
            h.runner.refresh_cache_only(p).await,
            Err(UpdateError::Fetch(_))
        ));
        assert_eq!(h.run_states.writes(), 0);
        assert!(h.guide_cache.entry(p).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_runs_for_same_playlist_conflict() {
        let h = Harness::blocked();
        let p = h.add_playlist(6, true);
        h.catalog.set_outcome(p, Ok(snapshot(5, 5)));

        let runner = h.runner.clone();
        let first = tokio::spawn(async move { runner.run_once(p).await });
        h.catalog.wait_entered(1).await;

        let err = h.runner.run_once(p).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("currently running"));

        let err = h.runner.refresh_cache_only(p).await.unwrap_err();
        assert!(err.is_conflict());

        h.catalog.release(1);
        first.await.unwrap().unwrap();

        assert_eq!(h.catalog.max_active(p), 1);
        assert_eq!(h.catalog.full_calls(), 1);
        assert_eq!(h.catalog.guide_calls(), 0);
    }

    #[tokio::test]
    async fn test_conflict_does_not_touch_run_state() {
        let h = Harness::blocked();
        let p = h.add_playlist(6, true);

        let runner = h.runner.clone();
        let first = tokio::spawn(async move { runner.run_once(p).await });
        h.catalog.wait_entered(1).await;

        let writes_before = h.run_states.writes();
        let state_before = h.run_states.state(p);
        assert_eq!(state_before.as_ref().map(|s| s.status), Some(RunStatus::Running));

        assert!(h.runner.run_once(p).await.unwrap_err().is_conflict());
        assert_eq!(h.run_states.writes(), writes_before);
        assert_eq!(h.run_states.state(p), state_before);

        h.catalog.release(1);
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.catalog.set_outcome(p, Err(500));
        assert!(h.runner.run_once(p).await.is_err());

        assert!(matches!(
            h.locks.try_acquire(p).await.unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_cache_write_failure_marks_failed() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.catalog.set_outcome(p, Ok(snapshot(9, 9)));
        h.guide_cache.fail_writes(true);

        let err = h.runner.run_once(p).await.unwrap_err();
        assert!(matches!(err, UpdateError::Persistence(_)));

        let state = h.run_states.state(p).unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.last_error.unwrap().contains("persistence failed"));
        assert!(matches!(
            h.locks.try_acquire(p).await.unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_state_write_failure_releases_lock() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.run_states.fail_writes(true);

        let err = h.runner.run_once(p).await.unwrap_err();
        assert!(matches!(err, UpdateError::Persistence(_)));
        assert_eq!(h.catalog.full_calls(), 0);
        assert!(matches!(
            h.locks.try_acquire(p).await.unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_state_read_failure_marks_failed() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.run_states.fail_reads(true);

        let err = h.runner.run_once(p).await.unwrap_err();
        assert!(matches!(err, UpdateError::Persistence(_)));
        assert_eq!(h.catalog.full_calls(), 0);

        let state = h.run_states.state(p).unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.last_error.unwrap().contains("run state table unreadable"));
    }

    #[tokio::test]
    async fn test_registry_failure_marks_full_run_failed() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.registry.fail_lookups(true);

        assert!(matches!(
            h.runner.run_once(p).await,
            Err(UpdateError::Persistence(_))
        ));
        assert_eq!(h.run_states.state(p).unwrap().status, RunStatus::Failed);
        assert!(matches!(
            h.locks.try_acquire(p).await.unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_registry_failure_on_refresh_leaves_run_state_alone() {
        let h = Harness::new();
        let p = h.add_playlist(6, true);
        h.registry.fail_lookups(true);

        assert!(h.runner.refresh_cache_only(p).await.is_err());
        assert_eq!(h.run_states.writes(), 0);
    }

    #[tokio::test]
    async fn test_unknown_playlist() {
        let h = Harness::new();
        let missing = Uuid::new_v4();

        assert!(matches!(
            h.runner.run_once(missing).await,
            Err(UpdateError::PlaylistNotFound(id)) if id == missing
        ));
        assert_eq!(h.run_states.writes(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_fetch() {
        let h = Harness::blocked();
        let p = h.add_playlist(6, true);

        let runner = h.runner.clone();
        let run = tokio::spawn(async move { runner.run_once(p).await });
        h.catalog.wait_entered(1).await;

        h.shutdown.cancel();
        assert!(matches!(run.await.unwrap(), Err(UpdateError::Cancelled)));

        let state = h.run_states.state(p).unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.last_error.unwrap().contains("shutting down"));
        assert!(matches!(
            h.locks.try_acquire(p).await.unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_aborted_task_releases_lock() {
        let h = Harness::blocked();
        let p = h.add_playlist(6, true);

        let runner = h.runner.clone();
        let run = tokio::spawn(async move { runner.run_once(p).await });
        h.catalog.wait_entered(1).await;

        run.abort();
        let _ = run.await;

        let locks = h.locks.clone();
        wait_until(|| {
            let locks = locks.clone();
            async move { matches!(locks.try_acquire(p).await, Ok(LockAttempt::Acquired(_))) }
        })
        .await;
    }
}
