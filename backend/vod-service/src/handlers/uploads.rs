/// Upload handlers - presigned upload URL issuance
use actix_web::web;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{SignedUrlRequest, SignedUrlResponse};
use crate::services::StoragePresigner;

const ALLOWED_CONTENT_TYPES: &[&str] = &["video/mp4", "video/quicktime"];
const MAX_UPLOAD_BYTES: i64 = 10 * 1024 * 1024 * 1024;

/// Issue a presigned PUT URL for a video's input object. The key shape
/// `uploads/<videoId>/input.mp4` is what the upload consumer later derives
/// the video id from.
pub async fn signed_url(
    presigner: web::Data<Arc<StoragePresigner>>,
    body: web::Json<SignedUrlRequest>,
) -> Result<actix_web::HttpResponse> {
    if body.video_id.is_empty() {
        return Err(AppError::BadRequest("videoId is required".to_string()));
    }
    if !ALLOWED_CONTENT_TYPES.contains(&body.content_type.as_str()) {
        return Err(AppError::BadRequest("Unsupported content type".to_string()));
    }
    if body.file_size <= 0 || body.file_size > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest("Invalid file size".to_string()));
    }

    let key = format!("uploads/{}/input.mp4", body.video_id);
    let url = presigner.presigned_put(&key, &body.content_type).await?;

    Ok(actix_web::HttpResponse::Ok().json(SignedUrlResponse {
        url,
        bucket: presigner.bucket().to_string(),
        key,
        expires_in: presigner.expiry_secs(),
    }))
}
