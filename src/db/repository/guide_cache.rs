//! Guide cache repository (one row per playlist)

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::GuideCacheRow;
use crate::models::GuideCacheEntry;

/// Insert or overwrite the cached guide for a playlist
pub async fn upsert(pool: &PgPool, entry: &GuideCacheEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO playlist_guide_cache (playlist_id, channel_data, channel_count, epg_program_count, last_updated)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (playlist_id) DO UPDATE SET
            channel_data = EXCLUDED.channel_data,
            channel_count = EXCLUDED.channel_count,
            epg_program_count = EXCLUDED.epg_program_count,
            last_updated = EXCLUDED.last_updated
        "#,
    )
    .bind(entry.playlist_id)
    .bind(&entry.channel_data)
    .bind(entry.channel_count)
    .bind(entry.epg_program_count)
    .bind(entry.last_updated)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the cached guide for a playlist
pub async fn find_by_playlist(
    pool: &PgPool,
    playlist_id: Uuid,
) -> Result<Option<GuideCacheRow>, sqlx::Error> {
    sqlx::query_as::<_, GuideCacheRow>(
        r#"
        SELECT playlist_id, channel_data, channel_count, epg_program_count, last_updated
        FROM playlist_guide_cache
        WHERE playlist_id = $1
        "#,
    )
    .bind(playlist_id)
    .fetch_optional(pool)
    .await
}
