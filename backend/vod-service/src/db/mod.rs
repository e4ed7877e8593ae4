pub mod user_repo;
pub mod video_repo;

pub use video_repo::{PgVideoStore, StoreError, UploadTransition, VideoStore};
