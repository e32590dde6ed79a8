//! Run state persistence

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::repository::run_states;
use crate::models::RunState;

#[async_trait]
pub trait RunStateStore: Send + Sync {
    /// Stored state, or None if the playlist was never scheduled
    async fn get(&self, playlist_id: Uuid) -> Result<Option<RunState>>;

    /// Stored states for several playlists, keyed by playlist id
    async fn get_many(&self, playlist_ids: &[Uuid]) -> Result<HashMap<Uuid, RunState>>;

    /// Create or overwrite
    async fn put(&self, state: &RunState) -> Result<()>;
}

/// PostgreSQL-backed run state store
#[derive(Clone)]
pub struct PgRunStateStore {
    pool: PgPool,
}

impl PgRunStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStateStore for PgRunStateStore {
    async fn get(&self, playlist_id: Uuid) -> Result<Option<RunState>> {
        let row = run_states::find_by_playlist(&self.pool, playlist_id)
            .await
            .with_context(|| format!("failed to read run state for playlist {}", playlist_id))?;
        Ok(row.map(Into::into))
    }

    async fn get_many(&self, playlist_ids: &[Uuid]) -> Result<HashMap<Uuid, RunState>> {
        let rows = run_states::find_many(&self.pool, playlist_ids)
            .await
            .context("failed to read run states")?;
        Ok(rows
            .into_iter()
            .map(|row| (row.playlist_id, RunState::from(row)))
            .collect())
    }

    async fn put(&self, state: &RunState) -> Result<()> {
        run_states::upsert(&self.pool, state)
            .await
            .with_context(|| format!("failed to write run state for playlist {}", state.playlist_id))
    }
}
