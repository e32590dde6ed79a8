//! In-memory stand-ins for the Postgres stores and the provider panel,
//! wired into a ready-to-use runner and scheduler.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{GuideCacheEntry, GuideSnapshot, PlaylistConfig, ProviderCredentials, RunState};
use crate::services::catalog::{CatalogError, ProviderCatalogClient};
use crate::services::guide_cache::GuideCacheStore;
use crate::services::job_runner::JobRunner;
use crate::services::registry::PlaylistRegistry;
use crate::services::run_lock::{MemoryRunLockManager, RunLockManager};
use crate::services::run_state::RunStateStore;
use crate::services::scheduler::Scheduler;
use crate::services::xtream::XtreamError;

/// Snapshot whose channel data is derived from the counts
pub fn snapshot(channels: i32, epg_programs: i32) -> GuideSnapshot {
    let list: Vec<serde_json::Value> = (0..channels)
        .map(|i| serde_json::json!({ "stream_id": i, "name": format!("Channel {}", i) }))
        .collect();
    GuideSnapshot {
        channel_data: serde_json::json!({ "categories": [], "channels": list }),
        channel_count: channels,
        epg_program_count: epg_programs,
    }
}

/// Poll `check` until it returns true; panics after two seconds
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Stores
// ============================================================================

#[derive(Default)]
pub struct MemoryRegistry {
    playlists: Mutex<Vec<PlaylistConfig>>,
    fail_lookups: AtomicBool,
}

impl MemoryRegistry {
    pub fn insert(&self, playlist: PlaylistConfig) {
        self.playlists.lock().unwrap().push(playlist);
    }

    /// Make `get_playlist` fail
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlaylistRegistry for MemoryRegistry {
    async fn list_enabled_playlists(&self) -> Result<Vec<PlaylistConfig>> {
        Ok(self
            .playlists
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.auto_update_enabled)
            .cloned()
            .collect())
    }

    async fn get_playlist(&self, playlist_id: Uuid) -> Result<Option<PlaylistConfig>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            bail!("playlist table unavailable");
        }
        Ok(self
            .playlists
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == playlist_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryRunStateStore {
    states: Mutex<HashMap<Uuid, RunState>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryRunStateStore {
    pub fn state(&self, playlist_id: Uuid) -> Option<RunState> {
        self.states.lock().unwrap().get(&playlist_id).cloned()
    }

    /// Insert without counting as a write
    pub fn seed(&self, state: RunState) {
        self.states.lock().unwrap().insert(state.playlist_id, state);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make single-row `get` fail; batch reads keep working
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RunStateStore for MemoryRunStateStore {
    async fn get(&self, playlist_id: Uuid) -> Result<Option<RunState>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("run state table unreadable");
        }
        Ok(self.state(playlist_id))
    }

    async fn get_many(&self, playlist_ids: &[Uuid]) -> Result<HashMap<Uuid, RunState>> {
        let states = self.states.lock().unwrap();
        Ok(playlist_ids
            .iter()
            .filter_map(|id| states.get(id).map(|s| (*id, s.clone())))
            .collect())
    }

    async fn put(&self, state: &RunState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("run state table unavailable");
        }
        self.states
            .lock()
            .unwrap()
            .insert(state.playlist_id, state.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGuideCache {
    entries: Mutex<HashMap<Uuid, GuideCacheEntry>>,
    upserts: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryGuideCache {
    pub fn entry(&self, playlist_id: Uuid) -> Option<GuideCacheEntry> {
        self.entries.lock().unwrap().get(&playlist_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GuideCacheStore for MemoryGuideCache {
    async fn upsert(&self, entry: &GuideCacheEntry) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("guide cache table unavailable");
        }
        self.entries
            .lock()
            .unwrap()
            .insert(entry.playlist_id, entry.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, playlist_id: Uuid) -> Result<Option<GuideCacheEntry>> {
        Ok(self.entry(playlist_id))
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Scripted provider. When gated, every fetch parks until `release` hands
/// it a permit.
pub struct FakeCatalog {
    outcomes: Mutex<HashMap<Uuid, Result<GuideSnapshot, u16>>>,
    panics: Mutex<HashSet<Uuid>>,
    gate: Option<Semaphore>,
    entered: AtomicUsize,
    active: Mutex<HashMap<Uuid, (usize, usize)>>,
    full_calls: AtomicUsize,
    guide_calls: AtomicUsize,
}

struct ActiveFetch<'a> {
    catalog: &'a FakeCatalog,
    playlist_id: Uuid,
}

impl Drop for ActiveFetch<'_> {
    fn drop(&mut self) {
        if let Some((current, _)) = self.catalog.active.lock().unwrap().get_mut(&self.playlist_id) {
            *current -= 1;
        }
    }
}

impl FakeCatalog {
    fn new(gated: bool) -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            panics: Mutex::new(HashSet::new()),
            gate: gated.then(|| Semaphore::new(0)),
            entered: AtomicUsize::new(0),
            active: Mutex::new(HashMap::new()),
            full_calls: AtomicUsize::new(0),
            guide_calls: AtomicUsize::new(0),
        }
    }

    /// `Err(status)` makes the panel answer with that HTTP status
    pub fn set_outcome(&self, playlist_id: Uuid, outcome: Result<GuideSnapshot, u16>) {
        self.outcomes.lock().unwrap().insert(playlist_id, outcome);
    }

    /// Fetches for `playlist_id` panic instead of answering
    pub fn panic_on(&self, playlist_id: Uuid) {
        self.panics.lock().unwrap().insert(playlist_id);
    }

    pub async fn wait_entered(&self, n: usize) {
        wait_until(move || async move { self.entered.load(Ordering::SeqCst) >= n }).await;
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Highest number of simultaneous fetches seen for one playlist
    pub fn max_active(&self, playlist_id: Uuid) -> usize {
        self.active
            .lock()
            .unwrap()
            .get(&playlist_id)
            .map(|(_, max)| *max)
            .unwrap_or(0)
    }

    pub fn full_calls(&self) -> usize {
        self.full_calls.load(Ordering::SeqCst)
    }

    pub fn guide_calls(&self) -> usize {
        self.guide_calls.load(Ordering::SeqCst)
    }

    fn enter(&self, playlist_id: Uuid) -> ActiveFetch<'_> {
        {
            let mut active = self.active.lock().unwrap();
            let (current, max) = active.entry(playlist_id).or_insert((0, 0));
            *current += 1;
            *max = (*max).max(*current);
        }
        self.entered.fetch_add(1, Ordering::SeqCst);
        ActiveFetch {
            catalog: self,
            playlist_id,
        }
    }

    async fn respond(&self, playlist_id: Uuid) -> Result<GuideSnapshot, CatalogError> {
        let _active = self.enter(playlist_id);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let should_panic = self.panics.lock().unwrap().contains(&playlist_id);
        if should_panic {
            panic!("provider client exploded for {}", playlist_id);
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&playlist_id)
            .cloned()
            .unwrap_or_else(|| Ok(snapshot(1, 1)));
        outcome.map_err(|status| CatalogError::Xtream(XtreamError::Http(status)))
    }
}

#[async_trait]
impl ProviderCatalogClient for FakeCatalog {
    async fn fetch_full_update(&self, playlist: &PlaylistConfig) -> Result<GuideSnapshot, CatalogError> {
        self.full_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(playlist.id).await
    }

    async fn fetch_guide_only(&self, playlist: &PlaylistConfig) -> Result<GuideSnapshot, CatalogError> {
        self.guide_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(playlist.id).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub registry: Arc<MemoryRegistry>,
    pub catalog: Arc<FakeCatalog>,
    pub run_states: Arc<MemoryRunStateStore>,
    pub guide_cache: Arc<MemoryGuideCache>,
    pub locks: Arc<dyn RunLockManager>,
    pub shutdown: CancellationToken,
    pub runner: Arc<JobRunner>,
    pub scheduler: Arc<Scheduler>,
}

impl Harness {
    /// Fetches complete immediately
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Fetches park until `catalog.release` is called
    pub fn blocked() -> Self {
        Self::build(true)
    }

    fn build(gated: bool) -> Self {
        let registry = Arc::new(MemoryRegistry::default());
        let catalog = Arc::new(FakeCatalog::new(gated));
        let run_states = Arc::new(MemoryRunStateStore::default());
        let guide_cache = Arc::new(MemoryGuideCache::default());
        let locks: Arc<dyn RunLockManager> =
            Arc::new(MemoryRunLockManager::new(Duration::from_secs(1800)));
        let shutdown = CancellationToken::new();

        let runner = Arc::new(JobRunner::new(
            registry.clone(),
            catalog.clone(),
            locks.clone(),
            run_states.clone(),
            guide_cache.clone(),
            shutdown.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            runner.clone(),
            registry.clone(),
            run_states.clone(),
            guide_cache.clone(),
            Duration::from_secs(60),
        ));

        Self {
            registry,
            catalog,
            run_states,
            guide_cache,
            locks,
            shutdown,
            runner,
            scheduler,
        }
    }

    pub fn add_playlist(&self, interval_hours: u32, enabled: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.registry.insert(PlaylistConfig {
            id,
            name: format!("playlist-{}", &id.to_string()[..8]),
            provider: ProviderCredentials {
                base_url: "http://panel.test:8080".to_string(),
                username: "reseller".to_string(),
                password: "secret".to_string(),
            },
            guide: None,
            auto_update_enabled: enabled,
            schedule_interval_hours: interval_hours,
        });
        id
    }
}
