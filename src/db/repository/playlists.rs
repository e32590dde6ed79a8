//! Playlist registry queries
//!
//! The `playlists` table belongs to the administration layer; this service
//! only reads it.

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::PlaylistRow;

const PLAYLIST_COLUMNS: &str = r#"
    id, name, provider_base_url, provider_username, provider_password,
    guide_username, guide_password, auto_update_enabled, schedule_interval_hours
"#;

/// List every playlist with auto-update switched on
pub async fn list_auto_update_enabled(pool: &PgPool) -> Result<Vec<PlaylistRow>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM playlists WHERE auto_update_enabled = TRUE ORDER BY name",
        PLAYLIST_COLUMNS
    );

    sqlx::query_as::<_, PlaylistRow>(&query)
        .fetch_all(pool)
        .await
}

/// Find playlist by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PlaylistRow>, sqlx::Error> {
    let query = format!("SELECT {} FROM playlists WHERE id = $1", PLAYLIST_COLUMNS);

    sqlx::query_as::<_, PlaylistRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}
