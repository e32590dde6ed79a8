//! Auto-update scheduler
//!
//! A single interval drives due-ness checks. Every due playlist gets its own
//! task, so a slow provider never holds up the others; per-playlist overlap
//! is prevented by the run lock, not here. Manual "run now" and "refresh
//! cache" requests skip the due check but still go through the job runner
//! and therefore the same lock.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{GuideSummary, RunState};
use crate::services::guide_cache::GuideCacheStore;
use crate::services::job_runner::{JobRunner, UpdateError, UpdateReport};
use crate::services::registry::PlaylistRegistry;
use crate::services::run_state::RunStateStore;

/// A playlist is due when it never ran or its interval has elapsed since the
/// last attempt (successful or not)
pub fn is_due(now: DateTime<Utc>, last_run_at: Option<DateTime<Utc>>, interval: ChronoDuration) -> bool {
    match last_run_at {
        None => true,
        Some(last) => now - last >= interval,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

/// What a tick found and started
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub enabled: usize,
    pub due: usize,
    pub dispatched: Vec<Uuid>,
}

pub struct Scheduler {
    runner: Arc<JobRunner>,
    registry: Arc<dyn PlaylistRegistry>,
    run_states: Arc<dyn RunStateStore>,
    guide_cache: Arc<dyn GuideCacheStore>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        runner: Arc<JobRunner>,
        registry: Arc<dyn PlaylistRegistry>,
        run_states: Arc<dyn RunStateStore>,
        guide_cache: Arc<dyn GuideCacheStore>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            runner,
            registry,
            run_states,
            guide_cache,
            tick_interval,
        }
    }

    /// Check every enabled playlist once and spawn a run for each due one.
    ///
    /// Spawned runs land in `jobs` and are not awaited here. Their errors
    /// are logged and never affect other playlists.
    pub async fn tick(&self, jobs: &mut JoinSet<()>) -> anyhow::Result<TickSummary> {
        let playlists = self.registry.list_enabled_playlists().await?;
        let ids: Vec<Uuid> = playlists.iter().map(|p| p.id).collect();
        let states = self.run_states.get_many(&ids).await?;
        let now = Utc::now();

        let mut summary = TickSummary {
            enabled: playlists.len(),
            ..Default::default()
        };

        for playlist in playlists {
            let last_run_at = states.get(&playlist.id).and_then(|s| s.last_run_at);
            if !is_due(now, last_run_at, playlist.schedule_interval()) {
                continue;
            }
            summary.due += 1;

            debug!(
                playlist_id = %playlist.id,
                last_run_at = ?last_run_at,
                interval_hours = playlist.schedule_interval_hours,
                "Playlist due for auto-update"
            );

            let runner = self.runner.clone();
            let playlist_id = playlist.id;
            jobs.spawn(async move {
                match runner.run_once(playlist_id).await {
                    Ok(_) => {}
                    Err(e) if e.is_conflict() => {
                        debug!(playlist_id = %playlist_id, "Skipped, already running");
                    }
                    Err(e) => {
                        warn!(playlist_id = %playlist_id, "Scheduled update failed: {}", e);
                    }
                }
            });
            summary.dispatched.push(playlist_id);
        }

        Ok(summary)
    }

    /// Main loop: tick on the interval until `shutdown` fires, then wait for
    /// in-flight runs (they observe the same token and stop fetching).
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "Starting auto-update scheduler (tick: {}s)",
            self.tick_interval.as_secs()
        );

        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut jobs = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    // Reap finished runs so the set does not grow forever
                    while let Some(joined) = jobs.try_join_next() {
                        if let Err(e) = joined {
                            error!("Auto-update task panicked: {}", e);
                        }
                    }

                    match self.tick(&mut jobs).await {
                        Ok(summary) => info!(
                            enabled = summary.enabled,
                            due = summary.due,
                            dispatched = summary.dispatched.len(),
                            "Auto-update tick"
                        ),
                        Err(e) => error!("Auto-update tick failed: {:#}", e),
                    }
                }
            }
        }

        info!("Scheduler stopping, waiting for {} in-flight updates", jobs.len());
        while let Some(joined) = jobs.join_next().await {
            if let Err(e) = joined {
                error!("Auto-update task panicked: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    /// Operator-triggered full update.
    ///
    /// The run is spawned so it completes even if the caller goes away.
    pub async fn run_now(&self, playlist_id: Uuid) -> Result<UpdateReport, UpdateError> {
        let runner = self.runner.clone();
        self.spawn_manual(async move { runner.run_once(playlist_id).await })
            .await
    }

    /// Operator-triggered guide refresh (no provider re-submission)
    pub async fn refresh_cache_only(&self, playlist_id: Uuid) -> Result<UpdateReport, UpdateError> {
        let runner = self.runner.clone();
        self.spawn_manual(async move { runner.refresh_cache_only(playlist_id).await })
            .await
    }

    async fn spawn_manual<F>(&self, run: F) -> Result<UpdateReport, UpdateError>
    where
        F: std::future::Future<Output = Result<UpdateReport, UpdateError>> + Send + 'static,
    {
        match tokio::spawn(run).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!("Manual update task panicked: {}", message);
                Err(UpdateError::Crashed(message))
            }
            Err(e) => {
                warn!("Manual update task cancelled: {}", e);
                Err(UpdateError::Cancelled)
            }
        }
    }

    /// Current run state; a playlist never scheduled reads as idle
    pub async fn get_status(&self, playlist_id: Uuid) -> Result<RunState, UpdateError> {
        self.ensure_exists(playlist_id).await?;
        let state = self
            .run_states
            .get(playlist_id)
            .await
            .map_err(|e| UpdateError::Persistence(format!("{:#}", e)))?;
        Ok(state.unwrap_or_else(|| RunState::never_run(playlist_id)))
    }

    /// Cached guide counts, None before the first successful fetch
    pub async fn get_guide_summary(&self, playlist_id: Uuid) -> Result<Option<GuideSummary>, UpdateError> {
        self.ensure_exists(playlist_id).await?;
        let entry = self
            .guide_cache
            .get(playlist_id)
            .await
            .map_err(|e| UpdateError::Persistence(format!("{:#}", e)))?;
        Ok(entry.map(|e| e.summary()))
    }

    async fn ensure_exists(&self, playlist_id: Uuid) -> Result<(), UpdateError> {
        match self.registry.get_playlist(playlist_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(UpdateError::PlaylistNotFound(playlist_id)),
            Err(e) => Err(UpdateError::Persistence(format!("{:#}", e))),
        }
    }
}
