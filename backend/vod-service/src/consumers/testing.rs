//! In-memory doubles for consumer tests. They mirror the keyed-write
//! semantics of the Postgres store so the idempotency contract can be
//! asserted without a database.
use crate::amqp::{EventPublisher, QueueError};
use crate::db::{StoreError, UploadTransition, VideoStore};
use crate::models::Video;
use crate::services::{SearchError, SearchIndex, VideoDocument};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn pending_video(id: &str, owner_id: &str) -> Video {
    Video {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: "A test video".to_string(),
        tags: vec!["test".to_string()],
        status: "pending".to_string(),
        visibility: "private".to_string(),
        input_key: None,
        output_prefix: None,
        thumb_key: None,
        duration: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn uploaded_video(id: &str, owner_id: &str) -> Video {
    let mut video = pending_video(id, owner_id);
    video.status = "uploaded".to_string();
    video.input_key = Some(format!("uploads/{id}/input.mp4"));
    video
}

pub struct InMemoryStore {
    videos: Mutex<HashMap<String, Video>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            videos: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_video(video: Video) -> Arc<Self> {
        let store = Self::new();
        store
            .videos
            .lock()
            .unwrap()
            .insert(video.id.clone(), video);
        store
    }

    pub fn get_sync(&self, id: &str) -> Option<Video> {
        self.videos.lock().unwrap().get(id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl VideoStore for InMemoryStore {
    async fn mark_uploaded(
        &self,
        video_id: &str,
        input_key: &str,
    ) -> Result<UploadTransition, StoreError> {
        let mut videos = self.videos.lock().unwrap();
        let Some(video) = videos.get_mut(video_id) else {
            return Ok(UploadTransition::NotFound);
        };
        if video.status == "pending" {
            video.status = "uploaded".to_string();
        }
        if video.input_key.is_none() {
            video.input_key = Some(input_key.to_string());
        }
        video.updated_at = Utc::now();
        let persisted = video.input_key.clone().unwrap_or_default();
        if persisted == input_key {
            Ok(UploadTransition::Applied {
                owner_id: video.owner_id.clone(),
                input_key: persisted,
            })
        } else {
            Ok(UploadTransition::Conflict { existing: persisted })
        }
    }

    async fn mark_ready(
        &self,
        video_id: &str,
        output_prefix: &str,
        thumb_key: Option<&str>,
        duration: Option<f64>,
    ) -> Result<bool, StoreError> {
        let mut videos = self.videos.lock().unwrap();
        let Some(video) = videos.get_mut(video_id) else {
            return Ok(false);
        };
        video.status = "ready".to_string();
        video.output_prefix = Some(output_prefix.to_string());
        video.thumb_key = thumb_key.map(str::to_string);
        video.duration = duration;
        video.updated_at = Utc::now();
        Ok(true)
    }

    async fn get(&self, video_id: &str) -> Result<Option<Video>, StoreError> {
        Ok(self.get_sync(video_id))
    }
}

/// Fails every operation, for exercising the unexpected-error policies.
pub struct FailingStore;

#[async_trait]
impl VideoStore for FailingStore {
    async fn mark_uploaded(&self, _: &str, _: &str) -> Result<UploadTransition, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn mark_ready(
        &self,
        _: &str,
        _: &str,
        _: Option<&str>,
        _: Option<f64>,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn get(&self, _: &str) -> Result<Option<Video>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }
}

#[derive(Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub persistent: bool,
}

#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), QueueError> {
        self.messages.lock().unwrap().push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
            persistent,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingIndex {
    documents: Mutex<Vec<VideoDocument>>,
}

impl RecordingIndex {
    pub fn documents(&self) -> Vec<VideoDocument> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchIndex for RecordingIndex {
    async fn upsert_video(&self, document: &VideoDocument) -> Result<(), SearchError> {
        self.documents.lock().unwrap().push(document.clone());
        Ok(())
    }
}

/// Rejects every upsert, for the index-failure-never-blocks-ack property.
pub struct FailingIndex;

#[async_trait]
impl SearchIndex for FailingIndex {
    async fn upsert_video(&self, _: &VideoDocument) -> Result<(), SearchError> {
        Err(SearchError::Rejected(500))
    }
}
