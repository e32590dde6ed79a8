//! Shared guide cache
//!
//! One cached channel/EPG snapshot per playlist, shared by every subscriber
//! account on that playlist. Rows are overwritten on each successful refresh
//! and never deleted here, so the last good guide keeps being served when a
//! refresh fails. Deleting the playlist cascades to its cache row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::repository::guide_cache;
use crate::models::GuideCacheEntry;

#[async_trait]
pub trait GuideCacheStore: Send + Sync {
    /// Insert or overwrite the playlist's entry
    async fn upsert(&self, entry: &GuideCacheEntry) -> Result<()>;

    async fn get(&self, playlist_id: Uuid) -> Result<Option<GuideCacheEntry>>;
}

/// PostgreSQL-backed guide cache
#[derive(Clone)]
pub struct PgGuideCacheStore {
    pool: PgPool,
}

impl PgGuideCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuideCacheStore for PgGuideCacheStore {
    async fn upsert(&self, entry: &GuideCacheEntry) -> Result<()> {
        guide_cache::upsert(&self.pool, entry)
            .await
            .with_context(|| format!("failed to write guide cache for playlist {}", entry.playlist_id))
    }

    async fn get(&self, playlist_id: Uuid) -> Result<Option<GuideCacheEntry>> {
        let row = guide_cache::find_by_playlist(&self.pool, playlist_id)
            .await
            .with_context(|| format!("failed to read guide cache for playlist {}", playlist_id))?;
        Ok(row.map(Into::into))
    }
}
