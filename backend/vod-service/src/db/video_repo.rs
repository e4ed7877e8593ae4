/// Video repository - database operations for videos
///
/// The consumer-facing operations (`VideoStore`) are idempotent by
/// construction: single keyed writes where repeated application converges
/// on the same row state. `status` only ever moves forward; `input_key` is
/// set once and a later delivery carrying a different key is reported as a
/// conflict instead of silently overwriting.
use crate::models::Video;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of applying an upload-completion transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTransition {
    /// Row updated, or an identical delivery re-applied (no-op).
    Applied { owner_id: String, input_key: String },
    /// Row exists but a prior delivery recorded a different input key.
    Conflict { existing: String },
    /// No video with that id. Benign: the object may predate record
    /// creation or belong to an unrelated upload.
    NotFound,
}

/// Store operations shared by the queue consumers. Injected explicitly so
/// handlers can be exercised against an in-memory double.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn mark_uploaded(
        &self,
        video_id: &str,
        input_key: &str,
    ) -> Result<UploadTransition, StoreError>;

    /// Apply a transcode-completion transition. Returns `false` when no
    /// video with that id exists.
    async fn mark_ready(
        &self,
        video_id: &str,
        output_prefix: &str,
        thumb_key: Option<&str>,
        duration: Option<f64>,
    ) -> Result<bool, StoreError>;

    async fn get(&self, video_id: &str) -> Result<Option<Video>, StoreError>;
}

pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn mark_uploaded(
        &self,
        video_id: &str,
        input_key: &str,
    ) -> Result<UploadTransition, StoreError> {
        // Forward-only: 'ready' is never regressed, 'input_key' is never
        // replaced. The returned key tells us whether this delivery's
        // payload matched what a previous one persisted.
        let row = sqlx::query_as::<_, (String, Option<String>)>(
            "UPDATE videos \
             SET status = CASE WHEN status = 'pending' THEN 'uploaded' ELSE status END, \
                 input_key = COALESCE(input_key, $2), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING owner_id, input_key",
        )
        .bind(video_id)
        .bind(input_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => UploadTransition::NotFound,
            Some((owner_id, persisted)) => {
                let persisted = persisted.unwrap_or_default();
                if persisted == input_key {
                    UploadTransition::Applied {
                        owner_id,
                        input_key: persisted,
                    }
                } else {
                    UploadTransition::Conflict { existing: persisted }
                }
            }
        })
    }

    async fn mark_ready(
        &self,
        video_id: &str,
        output_prefix: &str,
        thumb_key: Option<&str>,
        duration: Option<f64>,
    ) -> Result<bool, StoreError> {
        // Unconditional field-set write keyed by id: 'ready' is terminal
        // and its fields are written by this handler only, so repeated
        // application converges.
        let row = sqlx::query_as::<_, (String,)>(
            "UPDATE videos \
             SET status = 'ready', \
                 output_prefix = $2, \
                 thumb_key = $3, \
                 duration = $4, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING id",
        )
        .bind(video_id)
        .bind(output_prefix)
        .bind(thumb_key)
        .bind(duration)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn get(&self, video_id: &str) -> Result<Option<Video>, StoreError> {
        Ok(get_video(&self.pool, video_id).await?)
    }
}

// ========================================
// CRUD used by the HTTP handlers
// ========================================

pub async fn create_video(
    pool: &PgPool,
    owner_id: &str,
    title: &str,
    tags: &[String],
) -> Result<Video, sqlx::Error> {
    let video_id = Uuid::new_v4().to_string();
    sqlx::query_as::<_, Video>(
        "INSERT INTO videos (id, owner_id, title, tags, status, visibility, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, 'pending', 'private', NOW(), NOW()) \
         RETURNING id, owner_id, title, tags, status, visibility, input_key, \
         output_prefix, thumb_key, duration, created_at, updated_at",
    )
    .bind(video_id)
    .bind(owner_id)
    .bind(title)
    .bind(tags)
    .fetch_one(pool)
    .await
}

pub async fn get_video(pool: &PgPool, video_id: &str) -> Result<Option<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>(
        "SELECT id, owner_id, title, tags, status, visibility, input_key, \
         output_prefix, thumb_key, duration, created_at, updated_at \
         FROM videos WHERE id = $1",
    )
    .bind(video_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_videos_by_owner(
    pool: &PgPool,
    owner_id: &str,
) -> Result<Vec<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>(
        "SELECT id, owner_id, title, tags, status, visibility, input_key, \
         output_prefix, thumb_key, duration, created_at, updated_at \
         FROM videos WHERE owner_id = $1 \
         ORDER BY created_at DESC LIMIT 100",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub async fn set_visibility(
    pool: &PgPool,
    video_id: &str,
    visibility: &str,
) -> Result<Option<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>(
        "UPDATE videos SET visibility = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, owner_id, title, tags, status, visibility, input_key, \
         output_prefix, thumb_key, duration, created_at, updated_at",
    )
    .bind(video_id)
    .bind(visibility)
    .fetch_optional(pool)
    .await
}
