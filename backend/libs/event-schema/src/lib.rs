//! Event schemas for the VOD pipeline.
//!
//! Defines the wire shape of every message that crosses the broker: the raw
//! bucket notification emitted by object storage and the two domain events
//! (`video.uploaded`, `video.ready`) exchanged between the backend and the
//! transcoder. Bodies are UTF-8 JSON with camelCase field names.
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// A message body that cannot be decoded. Terminal for that message: the
/// consumer discards it rather than requeueing (poison message).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A well-formed event that is missing a required field. Unlike
/// [`DecodeError`] this is assumed to be a producer bug or a transient
/// issue, so consumers requeue instead of discarding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Decode a JSON message body.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Encode an event for publishing.
pub fn encode<T: Serialize>(event: &T) -> Result<Vec<u8>, DecodeError> {
    Ok(serde_json::to_vec(event)?)
}

// ============================================================================
// DOMAIN EVENTS
// ============================================================================

/// Published by the backend once an uploaded object has been resolved to a
/// video record. Consumed by the transcoder. Carries a `"type"` tag on the
/// wire so unrelated consumers on the same exchange can dispatch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "video.uploaded", rename_all = "camelCase")]
pub struct VideoUploaded {
    pub video_id: String,
    pub owner_id: String,
    pub input_key: String,
    pub ts: DateTime<Utc>,
}

/// `video.ready` as it arrives from the transcoder. All fields are lenient:
/// a body with missing members still decodes, so the consumer can tell a
/// validation failure (requeue) from a malformed body (discard).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoReadyEvent {
    pub video_id: Option<String>,
    pub output_prefix: Option<String>,
    pub thumb_key: Option<String>,
    pub duration: Option<f64>,
}

/// A validated `video.ready` event.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoReady {
    pub video_id: String,
    pub output_prefix: String,
    pub thumb_key: Option<String>,
    pub duration: Option<f64>,
}

impl VideoReadyEvent {
    /// Check required fields. An empty string counts as missing — some
    /// producers serialize absent values that way.
    pub fn validate(self) -> Result<VideoReady, ValidationError> {
        let video_id = match self.video_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ValidationError::MissingField("videoId")),
        };
        let output_prefix = match self.output_prefix {
            Some(prefix) if !prefix.is_empty() => prefix,
            _ => return Err(ValidationError::MissingField("outputPrefix")),
        };
        Ok(VideoReady {
            video_id,
            output_prefix,
            thumb_key: self.thumb_key.filter(|k| !k.is_empty()),
            duration: self.duration,
        })
    }
}

// ============================================================================
// RAW STORAGE NOTIFICATIONS
// ============================================================================

/// Bucket notification batch in the S3/MinIO shape. Ephemeral: only used to
/// derive a video id and republish a domain event, never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    /// Absent on records that do not describe an object operation; such
    /// records are skipped by the consumer.
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketInfo,
    pub object: ObjectInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketInfo {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
}

impl StorageRecord {
    /// The object key, if this record describes an object operation.
    pub fn object_key(&self) -> Option<&str> {
        self.s3.as_ref().map(|s3| s3.object.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn video_uploaded_carries_type_tag() {
        let event = VideoUploaded {
            video_id: "abc123".to_string(),
            owner_id: "owner-1".to_string(),
            input_key: "uploads/abc123/input.mp4".to_string(),
            ts: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&encode(&event).unwrap()).unwrap();
        assert_eq!(value["type"], "video.uploaded");
        assert_eq!(value["videoId"], "abc123");
        assert_eq!(value["ownerId"], "owner-1");
        assert_eq!(value["inputKey"], "uploads/abc123/input.mp4");

        let decoded: VideoUploaded = decode(&encode(&event).unwrap()).unwrap();
        assert_eq!(decoded.video_id, event.video_id);
        assert_eq!(decoded.ts, event.ts);
    }

    #[test]
    fn video_ready_validates_required_fields() {
        let body = br#"{"videoId":"abc123","outputPrefix":"vod/hls/abc123/","thumbKey":"thumb.jpg","duration":125}"#;
        let event: VideoReadyEvent = decode(body).unwrap();
        let ready = event.validate().unwrap();
        assert_eq!(ready.video_id, "abc123");
        assert_eq!(ready.output_prefix, "vod/hls/abc123/");
        assert_eq!(ready.thumb_key.as_deref(), Some("thumb.jpg"));
        assert_eq!(ready.duration, Some(125.0));
    }

    #[test]
    fn video_ready_missing_fields_fail_validation() {
        let event: VideoReadyEvent = decode(br#"{"outputPrefix":"vod/x/"}"#).unwrap();
        assert_eq!(
            event.validate().unwrap_err(),
            ValidationError::MissingField("videoId")
        );

        let event: VideoReadyEvent = decode(br#"{"videoId":"abc123"}"#).unwrap();
        assert_eq!(
            event.validate().unwrap_err(),
            ValidationError::MissingField("outputPrefix")
        );
    }

    #[test]
    fn video_ready_empty_string_counts_as_missing() {
        let event: VideoReadyEvent =
            decode(br#"{"videoId":"","outputPrefix":"vod/x/"}"#).unwrap();
        assert_eq!(
            event.validate().unwrap_err(),
            ValidationError::MissingField("videoId")
        );
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(decode::<VideoReadyEvent>(b"not json").is_err());
        assert!(decode::<StorageNotification>(b"[1,2,3]").is_err());
    }

    #[test]
    fn storage_notification_parses_minio_shape() {
        let body = br#"{
            "Records": [{
                "eventName": "s3:ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "uploads"},
                    "object": {"key": "uploads/abc123/input.mp4", "size": 1024, "contentType": "video/mp4"}
                }
            }]
        }"#;
        let notification: StorageNotification = decode(body).unwrap();
        assert_eq!(notification.records.len(), 1);
        let record = &notification.records[0];
        assert_eq!(record.event_name, "s3:ObjectCreated:Put");
        assert_eq!(record.object_key(), Some("uploads/abc123/input.mp4"));
        assert_eq!(record.s3.as_ref().unwrap().object.size, Some(1024));
    }

    #[test]
    fn storage_notification_tolerates_missing_records() {
        let notification: StorageNotification = decode(b"{}").unwrap();
        assert!(notification.records.is_empty());

        let notification: StorageNotification =
            decode(br#"{"Records":[{"eventName":"s3:TestEvent"}]}"#).unwrap();
        assert_eq!(notification.records[0].object_key(), None);
    }
}
