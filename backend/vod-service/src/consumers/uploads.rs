//! Upload-completion consumer.
//!
//! Consumes raw bucket notifications, resolves each object key to a video,
//! applies the `pending -> uploaded` transition and republishes a
//! normalized `video.uploaded` domain event for the transcoder.
use crate::amqp::{Disposition, EventPublisher, MessageHandler, QueueError};
use crate::db::{StoreError, UploadTransition, VideoStore};
use async_trait::async_trait;
use chrono::Utc;
use event_schema::{DecodeError, StorageNotification, VideoUploaded};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
enum UploadProcessingError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("publish error: {0}")]
    Publish(#[from] QueueError),
    #[error("encode error: {0}")]
    Encode(#[from] DecodeError),
    #[error("undecodable object key: {0}")]
    Key(#[from] std::string::FromUtf8Error),
}

pub struct UploadsConsumer {
    store: Arc<dyn VideoStore>,
    publisher: Arc<dyn EventPublisher>,
    events_exchange: String,
    uploaded_routing_key: String,
}

impl UploadsConsumer {
    pub fn new(
        store: Arc<dyn VideoStore>,
        publisher: Arc<dyn EventPublisher>,
        events_exchange: impl Into<String>,
        uploaded_routing_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            events_exchange: events_exchange.into(),
            uploaded_routing_key: uploaded_routing_key.into(),
        }
    }

    /// Records are processed sequentially within one message. A record that
    /// cannot be resolved is skipped without aborting the batch; only an
    /// unexpected store/publish failure aborts.
    async fn process(&self, notification: StorageNotification) -> Result<(), UploadProcessingError> {
        for record in &notification.records {
            let Some(raw_key) = record.object_key() else {
                continue;
            };
            let input_key = urlencoding::decode(raw_key)?.into_owned();
            let Some(video_id) = extract_video_id(&input_key) else {
                warn!(key = %input_key, "no video id in object key, skipping record");
                continue;
            };

            match self.store.mark_uploaded(video_id, &input_key).await? {
                UploadTransition::NotFound => {
                    warn!(%video_id, key = %input_key, "video not found for uploaded object, skipping");
                }
                UploadTransition::Conflict { existing } => {
                    warn!(
                        %video_id,
                        key = %input_key,
                        %existing,
                        "redelivery carries a conflicting input key, skipping"
                    );
                }
                UploadTransition::Applied {
                    owner_id,
                    input_key: persisted_key,
                } => {
                    let event = VideoUploaded {
                        video_id: video_id.to_string(),
                        owner_id,
                        input_key: persisted_key,
                        ts: Utc::now(),
                    };
                    let payload = event_schema::encode(&event)?;
                    self.publisher
                        .publish(
                            &self.events_exchange,
                            &self.uploaded_routing_key,
                            &payload,
                            true,
                        )
                        .await?;
                    info!(video_id = %event.video_id, "video.uploaded published");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for UploadsConsumer {
    async fn handle(&self, payload: &[u8]) -> Disposition {
        let notification: StorageNotification = match event_schema::decode(payload) {
            Ok(notification) => notification,
            Err(err) => {
                error!(error = ?err, "malformed storage notification, discarding");
                return Disposition::Discard;
            }
        };
        match self.process(notification).await {
            Ok(()) => Disposition::Ack,
            // Discard, not requeue: a batch with a persistently failing
            // record would otherwise redeliver forever. Operators route
            // discards to a dead-letter queue at the broker level.
            Err(err) => {
                error!(error = ?err, "storage notification processing failed, discarding");
                Disposition::Discard
            }
        }
    }
}

/// The video id is the first path segment of the object key, or the second
/// when the key sits under a literal `uploads/` prefix.
fn extract_video_id(key: &str) -> Option<&str> {
    let mut segments = key.trim_start_matches('/').split('/');
    let first = segments.next()?;
    let id = if first == "uploads" {
        segments.next()?
    } else {
        first
    };
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::testing::{
        pending_video, FailingStore, InMemoryStore, RecordingPublisher,
    };

    fn consumer(
        store: Arc<dyn VideoStore>,
        publisher: Arc<RecordingPublisher>,
    ) -> UploadsConsumer {
        UploadsConsumer::new(store, publisher, "app.events", "video.uploaded")
    }

    fn notification(keys: &[&str]) -> Vec<u8> {
        let records: Vec<serde_json::Value> = keys
            .iter()
            .map(|key| {
                serde_json::json!({
                    "eventName": "s3:ObjectCreated:Put",
                    "s3": { "bucket": { "name": "uploads" }, "object": { "key": key } }
                })
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({ "Records": records })).unwrap()
    }

    #[test]
    fn extracts_video_id_from_object_keys() {
        assert_eq!(extract_video_id("uploads/abc123/input.mp4"), Some("abc123"));
        assert_eq!(extract_video_id("abc123/input.mp4"), Some("abc123"));
        assert_eq!(extract_video_id("/abc123/input.mp4"), Some("abc123"));
        assert_eq!(extract_video_id("uploads/abc123"), Some("abc123"));
        assert_eq!(extract_video_id("uploads"), None);
        assert_eq!(extract_video_id("uploads/"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[tokio::test]
    async fn applies_transition_and_republishes() {
        let store = InMemoryStore::with_video(pending_video("abc123", "owner-1"));
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(store.clone(), publisher.clone());

        let disposition = handler
            .handle(&notification(&["uploads/abc123/input.mp4"]))
            .await;

        assert_eq!(disposition, Disposition::Ack);
        let video = store.get_sync("abc123").unwrap();
        assert_eq!(video.status, "uploaded");
        assert_eq!(video.input_key.as_deref(), Some("uploads/abc123/input.mp4"));

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "app.events");
        assert_eq!(published[0].routing_key, "video.uploaded");
        assert!(published[0].persistent);
        let value: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(value["type"], "video.uploaded");
        assert_eq!(value["videoId"], "abc123");
        assert_eq!(value["ownerId"], "owner-1");
        assert_eq!(value["inputKey"], "uploads/abc123/input.mp4");
    }

    #[tokio::test]
    async fn identical_redelivery_is_a_no_op() {
        let store = InMemoryStore::with_video(pending_video("abc123", "owner-1"));
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(store.clone(), publisher.clone());
        let body = notification(&["uploads/abc123/input.mp4"]);

        assert_eq!(handler.handle(&body).await, Disposition::Ack);
        let first = store.get_sync("abc123").unwrap();

        assert_eq!(handler.handle(&body).await, Disposition::Ack);
        let second = store.get_sync("abc123").unwrap();

        assert_eq!(second.status, first.status);
        assert_eq!(second.input_key, first.input_key);
    }

    #[tokio::test]
    async fn conflicting_redelivery_is_reported_not_applied() {
        let store = InMemoryStore::with_video(pending_video("abc123", "owner-1"));
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(store.clone(), publisher.clone());

        assert_eq!(
            handler
                .handle(&notification(&["uploads/abc123/input.mp4"]))
                .await,
            Disposition::Ack
        );
        assert_eq!(
            handler
                .handle(&notification(&["uploads/abc123/other.mp4"]))
                .await,
            Disposition::Ack
        );

        let video = store.get_sync("abc123").unwrap();
        assert_eq!(video.input_key.as_deref(), Some("uploads/abc123/input.mp4"));
        // The conflicting delivery does not republish.
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn unextractable_key_is_acknowledged_without_writes() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(store.clone(), publisher.clone());

        let disposition = handler.handle(&notification(&["uploads"])).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(store.is_empty());
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn missing_video_is_skipped_and_batch_continues() {
        let store = InMemoryStore::with_video(pending_video("abc123", "owner-1"));
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(store.clone(), publisher.clone());

        let disposition = handler
            .handle(&notification(&[
                "uploads/nosuchvideo/input.mp4",
                "uploads/abc123/input.mp4",
            ]))
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(store.get_sync("abc123").unwrap().status, "uploaded");
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn percent_encoded_keys_are_decoded() {
        let store = InMemoryStore::with_video(pending_video("abc123", "owner-1"));
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(store.clone(), publisher.clone());

        let disposition = handler
            .handle(&notification(&["uploads/abc123/my%20video.mp4"]))
            .await;

        assert_eq!(disposition, Disposition::Ack);
        let video = store.get_sync("abc123").unwrap();
        assert_eq!(
            video.input_key.as_deref(),
            Some("uploads/abc123/my video.mp4")
        );
    }

    #[tokio::test]
    async fn malformed_body_is_discarded() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(store, publisher);

        assert_eq!(handler.handle(b"not json").await, Disposition::Discard);
    }

    #[tokio::test]
    async fn store_failure_discards_the_batch() {
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = consumer(Arc::new(FailingStore), publisher.clone());

        let disposition = handler
            .handle(&notification(&["uploads/abc123/input.mp4"]))
            .await;

        assert_eq!(disposition, Disposition::Discard);
        assert!(publisher.published().is_empty());
    }
}
