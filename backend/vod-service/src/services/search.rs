//! Search index client.
//!
//! Holds the denormalized video projection and the queries the public
//! search endpoint serves. Indexing is best-effort from the consumers'
//! point of view: an upsert failure is reported to the caller, which logs
//! it and moves on (the relational store stays the source of truth).
use crate::models::Video;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elasticsearch::{
    http::transport::{BuildError, SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    Elasticsearch, IndexParts, SearchParts,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build transport: {0}")]
    TransportBuild(#[from] BuildError),
    #[error("transport error: {0}")]
    Transport(#[from] elasticsearch::Error),
    #[error("index rejected request with status {0}")]
    Rejected(u16),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Denormalized projection of a video kept in the search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDocument {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub visibility: String,
    pub status: String,
}

impl From<&Video> for VideoDocument {
    fn from(video: &Video) -> Self {
        Self {
            id: video.id.clone(),
            title: video.title.clone(),
            tags: video.tags.clone(),
            owner_id: video.owner_id.clone(),
            created_at: video.created_at,
            visibility: video.visibility.clone(),
            status: video.status.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub hits: Vec<VideoDocument>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Indexing operations needed by the consumers, split out so they can be
/// exercised against an in-memory double.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert_video(&self, document: &VideoDocument) -> Result<(), SearchError>;
}

#[derive(Clone)]
pub struct ElasticsearchIndex {
    client: Elasticsearch,
    index: String,
}

impl ElasticsearchIndex {
    pub fn new(url: &str, index: &str) -> Result<Self, SearchError> {
        let parsed = Url::parse(url)?;
        let pool = SingleNodeConnectionPool::new(parsed);
        let transport = TransportBuilder::new(pool).build()?;
        Ok(Self {
            client: Elasticsearch::new(transport),
            index: index.to_string(),
        })
    }

    /// Create the videos index unless it already exists.
    pub async fn ensure_index(&self) -> Result<(), SearchError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index.as_str()]))
            .send()
            .await?;
        if exists.status_code().is_success() {
            return Ok(());
        }

        let body = json!({
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "title": { "type": "text" },
                    "tags": { "type": "keyword" },
                    "ownerId": { "type": "keyword" },
                    "createdAt": { "type": "date" },
                    "visibility": { "type": "keyword" },
                    "status": { "type": "keyword" }
                }
            }
        });

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(body)
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(SearchError::Rejected(response.status_code().as_u16()));
        }
        Ok(())
    }

    /// Query publicly visible, ready videos, newest first.
    pub async fn search(
        &self,
        query: &str,
        page: u64,
        page_size: u64,
    ) -> Result<SearchResults, SearchError> {
        let text_query = if query.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "multi_match": { "query": query, "fields": ["title^2", "tags"] } })
        };
        let body = json!({
            "query": {
                "bool": {
                    "must": text_query,
                    "filter": [
                        { "term": { "visibility": "public" } },
                        { "term": { "status": "ready" } }
                    ]
                }
            },
            "sort": [{ "createdAt": { "order": "desc" } }],
            "from": (page - 1) * page_size,
            "size": page_size
        });

        let response = self
            .client
            .search(SearchParts::Index(&[self.index.as_str()]))
            .body(body)
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(SearchError::Rejected(response.status_code().as_u16()));
        }

        let value = response.json::<serde_json::Value>().await?;
        let total = value["hits"]["total"]["value"].as_u64().unwrap_or(0);
        let hits = value["hits"]["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| {
                        serde_json::from_value::<VideoDocument>(hit["_source"].clone()).ok()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResults {
            hits,
            total,
            page,
            page_size,
        })
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn upsert_video(&self, document: &VideoDocument) -> Result<(), SearchError> {
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index, &document.id))
            .body(document)
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(SearchError::Rejected(response.status_code().as_u16()));
        }
        Ok(())
    }
}
