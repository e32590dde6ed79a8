//! Run state repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::RunStateRow;
use crate::models::RunState;

/// Get the run state for a playlist (None until first scheduled)
pub async fn find_by_playlist(
    pool: &PgPool,
    playlist_id: Uuid,
) -> Result<Option<RunStateRow>, sqlx::Error> {
    sqlx::query_as::<_, RunStateRow>(
        r#"
        SELECT playlist_id, status, last_run_at, last_error
        FROM playlist_run_state
        WHERE playlist_id = $1
        "#,
    )
    .bind(playlist_id)
    .fetch_optional(pool)
    .await
}

/// Get run states for many playlists at once (one query per scheduler tick)
pub async fn find_many(
    pool: &PgPool,
    playlist_ids: &[Uuid],
) -> Result<Vec<RunStateRow>, sqlx::Error> {
    if playlist_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, RunStateRow>(
        r#"
        SELECT playlist_id, status, last_run_at, last_error
        FROM playlist_run_state
        WHERE playlist_id = ANY($1)
        "#,
    )
    .bind(playlist_ids)
    .fetch_all(pool)
    .await
}

/// Create or overwrite the run state for a playlist
pub async fn upsert(pool: &PgPool, state: &RunState) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO playlist_run_state (playlist_id, status, last_run_at, last_error, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (playlist_id) DO UPDATE SET
            status = EXCLUDED.status,
            last_run_at = EXCLUDED.last_run_at,
            last_error = EXCLUDED.last_error,
            updated_at = NOW()
        "#,
    )
    .bind(state.playlist_id)
    .bind(state.status.as_str())
    .bind(state.last_run_at)
    .bind(&state.last_error)
    .execute(pool)
    .await?;

    Ok(())
}
