//! Read access to playlist configuration
//!
//! Playlists are created and edited by the administration layer; the
//! scheduler only lists and looks them up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::repository::playlists;
use crate::models::PlaylistConfig;

#[async_trait]
pub trait PlaylistRegistry: Send + Sync {
    async fn list_enabled_playlists(&self) -> Result<Vec<PlaylistConfig>>;

    async fn get_playlist(&self, playlist_id: Uuid) -> Result<Option<PlaylistConfig>>;
}

/// Registry backed by the shared `playlists` table
#[derive(Clone)]
pub struct PgPlaylistRegistry {
    pool: PgPool,
}

impl PgPlaylistRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaylistRegistry for PgPlaylistRegistry {
    async fn list_enabled_playlists(&self) -> Result<Vec<PlaylistConfig>> {
        let rows = playlists::list_auto_update_enabled(&self.pool)
            .await
            .context("failed to list auto-update playlists")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_playlist(&self, playlist_id: Uuid) -> Result<Option<PlaylistConfig>> {
        let row = playlists::find_by_id(&self.pool, playlist_id)
            .await
            .with_context(|| format!("failed to load playlist {}", playlist_id))?;
        Ok(row.map(Into::into))
    }
}
