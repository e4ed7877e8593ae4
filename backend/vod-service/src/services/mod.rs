pub mod search;
pub mod storage;

pub use search::{ElasticsearchIndex, SearchError, SearchIndex, SearchResults, VideoDocument};
pub use storage::{StorageError, StoragePresigner};
