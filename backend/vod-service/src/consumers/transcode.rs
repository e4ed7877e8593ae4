//! Transcode-completion consumer.
//!
//! Consumes `video.ready` events, applies the terminal transition to the
//! video record and reflects the change into the search index. The
//! relational write is the source of truth: store failures requeue, index
//! failures never block acknowledgment.
use crate::amqp::{Disposition, MessageHandler};
use crate::db::{StoreError, VideoStore};
use crate::services::{SearchIndex, VideoDocument};
use async_trait::async_trait;
use event_schema::{VideoReady, VideoReadyEvent};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct TranscodeConsumer {
    store: Arc<dyn VideoStore>,
    index: Arc<dyn SearchIndex>,
}

impl TranscodeConsumer {
    pub fn new(store: Arc<dyn VideoStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    async fn process(&self, ready: VideoReady) -> Result<(), StoreError> {
        let updated = self
            .store
            .mark_ready(
                &ready.video_id,
                &ready.output_prefix,
                ready.thumb_key.as_deref(),
                ready.duration,
            )
            .await?;
        if !updated {
            warn!(video_id = %ready.video_id, "video.ready for unknown video, skipping");
            return Ok(());
        }

        // Read the full record back and upsert the denormalized projection.
        let Some(video) = self.store.get(&ready.video_id).await? else {
            warn!(video_id = %ready.video_id, "video disappeared after update, skipping index");
            return Ok(());
        };
        let document = VideoDocument::from(&video);
        if let Err(err) = self.index.upsert_video(&document).await {
            // Eventual consistency: a later event or a full re-index will
            // catch the document up.
            warn!(video_id = %video.id, error = ?err, "search index upsert failed");
        }
        info!(video_id = %video.id, "video.ready applied");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for TranscodeConsumer {
    async fn handle(&self, payload: &[u8]) -> Disposition {
        let event: VideoReadyEvent = match event_schema::decode(payload) {
            Ok(event) => event,
            Err(err) => {
                error!(error = ?err, "malformed video.ready event, discarding");
                return Disposition::Discard;
            }
        };
        let ready = match event.validate() {
            Ok(ready) => ready,
            // A well-formed event missing required fields points at a
            // producer bug or a transient issue, not a poison message.
            Err(err) => {
                warn!(error = %err, "invalid video.ready event, requeueing");
                return Disposition::Requeue;
            }
        };
        match self.process(ready).await {
            Ok(()) => Disposition::Ack,
            Err(err) => {
                error!(error = ?err, "video.ready processing failed, requeueing");
                Disposition::Requeue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::testing::{
        uploaded_video, FailingIndex, FailingStore, InMemoryStore, RecordingIndex,
    };

    fn ready_body() -> Vec<u8> {
        br#"{"videoId":"abc123","outputPrefix":"vod/hls/abc123/","thumbKey":"thumb.jpg","duration":125}"#
            .to_vec()
    }

    #[tokio::test]
    async fn applies_transition_and_indexes_projection() {
        let store = InMemoryStore::with_video(uploaded_video("abc123", "owner-1"));
        let index = Arc::new(RecordingIndex::default());
        let handler = TranscodeConsumer::new(store.clone(), index.clone());

        let disposition = handler.handle(&ready_body()).await;

        assert_eq!(disposition, Disposition::Ack);
        let video = store.get_sync("abc123").unwrap();
        assert_eq!(video.status, "ready");
        assert_eq!(video.output_prefix.as_deref(), Some("vod/hls/abc123/"));
        assert_eq!(video.thumb_key.as_deref(), Some("thumb.jpg"));
        assert_eq!(video.duration, Some(125.0));

        let documents = index.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "abc123");
        assert_eq!(documents[0].status, "ready");
        assert_eq!(documents[0].owner_id, "owner-1");
    }

    #[tokio::test]
    async fn missing_required_fields_requeue() {
        let store = InMemoryStore::with_video(uploaded_video("abc123", "owner-1"));
        let index = Arc::new(RecordingIndex::default());
        let handler = TranscodeConsumer::new(store.clone(), index.clone());

        assert_eq!(
            handler
                .handle(br#"{"outputPrefix":"vod/hls/abc123/"}"#)
                .await,
            Disposition::Requeue
        );
        assert_eq!(
            handler.handle(br#"{"videoId":"abc123"}"#).await,
            Disposition::Requeue
        );

        assert_eq!(store.get_sync("abc123").unwrap().status, "uploaded");
        assert!(index.documents().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_discarded() {
        let handler = TranscodeConsumer::new(
            InMemoryStore::new(),
            Arc::new(RecordingIndex::default()),
        );
        assert_eq!(handler.handle(b"{{{").await, Disposition::Discard);
    }

    #[tokio::test]
    async fn unknown_video_is_acknowledged() {
        let store = InMemoryStore::new();
        let index = Arc::new(RecordingIndex::default());
        let handler = TranscodeConsumer::new(store, index.clone());

        assert_eq!(handler.handle(&ready_body()).await, Disposition::Ack);
        assert!(index.documents().is_empty());
    }

    #[tokio::test]
    async fn index_failure_never_blocks_acknowledgment() {
        let store = InMemoryStore::with_video(uploaded_video("abc123", "owner-1"));
        let handler = TranscodeConsumer::new(store.clone(), Arc::new(FailingIndex));

        assert_eq!(handler.handle(&ready_body()).await, Disposition::Ack);
        assert_eq!(store.get_sync("abc123").unwrap().status, "ready");
    }

    #[tokio::test]
    async fn redelivery_converges_on_the_same_state() {
        let store = InMemoryStore::with_video(uploaded_video("abc123", "owner-1"));
        let index = Arc::new(RecordingIndex::default());
        let handler = TranscodeConsumer::new(store.clone(), index);

        assert_eq!(handler.handle(&ready_body()).await, Disposition::Ack);
        let first = store.get_sync("abc123").unwrap();
        assert_eq!(handler.handle(&ready_body()).await, Disposition::Ack);
        let second = store.get_sync("abc123").unwrap();

        assert_eq!(second.status, first.status);
        assert_eq!(second.output_prefix, first.output_prefix);
        assert_eq!(second.thumb_key, first.thumb_key);
        assert_eq!(second.duration, first.duration);
    }

    #[tokio::test]
    async fn store_failure_requeues() {
        let handler =
            TranscodeConsumer::new(Arc::new(FailingStore), Arc::new(RecordingIndex::default()));
        assert_eq!(handler.handle(&ready_body()).await, Disposition::Requeue);
    }
}
