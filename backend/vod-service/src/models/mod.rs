/// Data models for vod-service
///
/// - Video: metadata record owned by the relational store
/// - User: account record referenced by video ownership
/// - Request/response DTOs for the HTTP API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========================================
// Video Models
// ========================================

/// Video status in the pipeline lifecycle. Forward-only: a video never
/// moves backward, and repeated transitions converge on the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Uploaded,
    Ready,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Ready => "ready",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "uploaded" => Some(Self::Uploaded),
            "ready" => Some(Self::Ready),
            _ => None,
        }
    }
}

/// Video visibility, mutated only by the explicit publish action and
/// independent of pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// Video database entity. Ids are opaque strings: new records get UUID
/// renderings, but lookups accept whatever the object key carried.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub status: String,
    pub visibility: String,
    pub input_key: Option<String>,
    pub output_prefix: Option<String>,
    pub thumb_key: Option<String>,
    pub duration: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn get_status(&self) -> VideoStatus {
        VideoStatus::from_str(&self.status).unwrap_or(VideoStatus::Pending)
    }

    pub fn get_visibility(&self) -> Visibility {
        Visibility::from_str(&self.visibility).unwrap_or(Visibility::Private)
    }
}

/// User database entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ========================================
// API DTOs
// ========================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateVideoRequest {
    pub title: String,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub visibility: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub status: String,
    pub visibility: String,
    pub input_key: Option<String>,
    pub output_prefix: Option<String>,
    pub thumb_key: Option<String>,
    pub duration: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<Video> for VideoResponse {
    fn from(video: Video) -> Self {
        Self {
            id: video.id,
            owner_id: video.owner_id,
            title: video.title,
            tags: video.tags,
            status: video.status,
            visibility: video.visibility,
            input_key: video.input_key,
            output_prefix: video.output_prefix,
            thumb_key: video.thumb_key,
            duration: video.duration,
            created_at: video.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlRequest {
    pub video_id: String,
    pub content_type: String,
    pub file_size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlResponse {
    pub url: String,
    pub bucket: String,
    pub key: String,
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [VideoStatus::Pending, VideoStatus::Uploaded, VideoStatus::Ready] {
            assert_eq!(VideoStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(VideoStatus::from_str("transcoding"), None);
    }

    #[test]
    fn visibility_rejects_unknown_values() {
        assert_eq!(Visibility::from_str("public"), Some(Visibility::Public));
        assert_eq!(Visibility::from_str("unlisted"), None);
    }
}
