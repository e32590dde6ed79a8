//! Per-playlist run locks
//!
//! At most one full update or guide refresh may be in flight for a playlist.
//! A lock older than the staleness threshold is assumed to belong to a
//! crashed or hung holder and is taken over by the next caller; the old
//! holder's late release then matches nothing and is a no-op.
//!
//! Two backends:
//! - [`RedisRunLockManager`]: shared by every instance, survives restarts.
//! - [`MemoryRunLockManager`]: process-local. Only correct for a single
//!   instance; a restart forgets every lock.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::metrics::LOCK_RECLAIMS_TOTAL;
use crate::services::redis::RedisService;

/// An acquired lock. The token identifies this holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLock {
    pub playlist_id: Uuid,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl RunLock {
    fn new(playlist_id: Uuid) -> Self {
        Self {
            playlist_id,
            token: Uuid::new_v4(),
            acquired_at: Utc::now(),
        }
    }

    /// Age of the lock at `now` (zero if the clock went backwards)
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Outcome of a lock attempt
#[derive(Debug)]
pub enum LockAttempt {
    Acquired(RunLock),
    /// Someone else holds a fresh lock; `held_for` is its age
    Busy { held_for: Duration },
}

#[async_trait]
pub trait RunLockManager: Send + Sync {
    /// Try to take the lock for `playlist_id`. Never waits or queues.
    async fn try_acquire(&self, playlist_id: Uuid) -> Result<LockAttempt>;

    /// Release `lock`. Returns false when the lock was already reclaimed
    /// by someone else (nothing is released in that case).
    async fn release(&self, lock: &RunLock) -> Result<bool>;
}

fn log_reclaim(playlist_id: Uuid, age: Duration, stale_after: Duration) {
    LOCK_RECLAIMS_TOTAL.inc();
    warn!(
        playlist_id = %playlist_id,
        lock_age_secs = age.as_secs(),
        stale_after_secs = stale_after.as_secs(),
        "Reclaiming stale playlist lock; previous holder crashed or hung"
    );
}

// ============================================================================
// In-process backend
// ============================================================================

/// Process-local lock table
pub struct MemoryRunLockManager {
    stale_after: Duration,
    locks: Mutex<HashMap<Uuid, RunLock>>,
}

impl MemoryRunLockManager {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, RunLock>> {
        // A panic while holding this guard cannot leave the map half-written
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RunLockManager for MemoryRunLockManager {
    async fn try_acquire(&self, playlist_id: Uuid) -> Result<LockAttempt> {
        let mut locks = self.table();
        let now = Utc::now();

        if let Some(existing) = locks.get(&playlist_id) {
            let age = existing.age_at(now);
            if age < self.stale_after {
                return Ok(LockAttempt::Busy { held_for: age });
            }
            log_reclaim(playlist_id, age, self.stale_after);
        }

        let lock = RunLock::new(playlist_id);
        locks.insert(playlist_id, lock.clone());
        Ok(LockAttempt::Acquired(lock))
    }

    async fn release(&self, lock: &RunLock) -> Result<bool> {
        let mut locks = self.table();
        match locks.get(&lock.playlist_id) {
            Some(current) if current.token == lock.token => {
                locks.remove(&lock.playlist_id);
                Ok(true)
            }
            _ => {
                debug!(playlist_id = %lock.playlist_id, "Lock already reclaimed, release skipped");
                Ok(false)
            }
        }
    }
}

// ============================================================================
// Redis backend
// ============================================================================

/// Durable lock in Redis.
///
/// Key `guide-sync:lock:{playlist_id}`, value `{token}:{acquired_at_ms}`.
/// Keys also carry a hard expiry of twice the staleness threshold so an
/// abandoned key eventually disappears even if nobody reclaims it.
pub struct RedisRunLockManager {
    redis: RedisService,
    stale_after: Duration,
}

impl RedisRunLockManager {
    pub fn new(redis: RedisService, stale_after: Duration) -> Self {
        Self { redis, stale_after }
    }

    fn key(playlist_id: Uuid) -> String {
        format!("guide-sync:lock:{}", playlist_id)
    }

    fn hard_ttl_ms(&self) -> u64 {
        (self.stale_after.as_millis() as u64).saturating_mul(2).max(1)
    }
}

/// Encode a lock as its Redis value
fn encode_lock(lock: &RunLock) -> String {
    format!("{}:{}", lock.token, lock.acquired_at.timestamp_millis())
}

/// Decode a Redis value back into a lock for `playlist_id`
fn decode_lock(playlist_id: Uuid, value: &str) -> Option<RunLock> {
    let (token, millis) = value.split_once(':')?;
    let token = Uuid::parse_str(token).ok()?;
    let acquired_at = Utc.timestamp_millis_opt(millis.parse().ok()?).single()?;
    Some(RunLock {
        playlist_id,
        token,
        acquired_at,
    })
}

#[async_trait]
impl RunLockManager for RedisRunLockManager {
    async fn try_acquire(&self, playlist_id: Uuid) -> Result<LockAttempt> {
        let key = Self::key(playlist_id);
        let ttl_ms = self.hard_ttl_ms();

        // Second pass only happens when the key expired between SET and GET
        for _ in 0..2 {
            let lock = RunLock::new(playlist_id);
            let value = encode_lock(&lock);

            if self.redis.set_nx_px(&key, &value, ttl_ms).await? {
                return Ok(LockAttempt::Acquired(lock));
            }

            let existing = match self.redis.get(&key).await? {
                Some(v) => v,
                None => continue,
            };

            // Unreadable values are treated as infinitely old
            let age = decode_lock(playlist_id, &existing)
                .map(|held| held.age_at(Utc::now()))
                .unwrap_or(Duration::MAX);

            if age < self.stale_after {
                return Ok(LockAttempt::Busy { held_for: age });
            }

            if self
                .redis
                .compare_and_swap(&key, &existing, &value, ttl_ms)
                .await?
            {
                log_reclaim(playlist_id, age, self.stale_after);
                return Ok(LockAttempt::Acquired(lock));
            }

            // Another caller reclaimed it first
            return Ok(LockAttempt::Busy {
                held_for: Duration::ZERO,
            });
        }

        Ok(LockAttempt::Busy {
            held_for: Duration::ZERO,
        })
    }

    async fn release(&self, lock: &RunLock) -> Result<bool> {
        let released = self
            .redis
            .compare_and_delete(&Self::key(lock.playlist_id), &encode_lock(lock))
            .await?;
        if !released {
            debug!(playlist_id = %lock.playlist_id, "Lock already reclaimed, release skipped");
        }
        Ok(released)
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Holds an acquired lock until released.
///
/// Call [`RunLockGuard::release`] on every normal path. If the owning task is
/// aborted first, `Drop` spawns a best-effort release; failing that, the
/// staleness threshold frees the playlist.
pub struct RunLockGuard {
    manager: Arc<dyn RunLockManager>,
    lock: Option<RunLock>,
}

impl RunLockGuard {
    pub fn new(manager: Arc<dyn RunLockManager>, lock: RunLock) -> Self {
        Self {
            manager,
            lock: Some(lock),
        }
    }

    pub async fn release(mut self) {
        if let Some(lock) = self.lock.take() {
            if let Err(e) = self.manager.release(&lock).await {
                warn!(
                    playlist_id = %lock.playlist_id,
                    "Failed to release playlist lock, it will expire as stale: {:#}", e
                );
            }
        }
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = self.manager.clone();
                handle.spawn(async move {
                    if let Err(e) = manager.release(&lock).await {
                        warn!(playlist_id = %lock.playlist_id, "Deferred lock release failed: {:#}", e);
                    }
                });
            }
            Err(_) => {
                warn!(
                    playlist_id = %lock.playlist_id,
                    "Lock dropped outside a runtime; left to expire as stale"
                );
            }
        }
    }
}
