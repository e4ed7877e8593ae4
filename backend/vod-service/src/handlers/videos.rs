/// Video handlers - HTTP endpoints for video metadata
use actix_web::{web, HttpRequest};
use sqlx::PgPool;

use crate::auth;
use crate::config::Config;
use crate::db::video_repo;
use crate::error::{AppError, Result};
use crate::models::{CreateVideoRequest, PublishRequest, VideoResponse, Visibility};

/// Create a new video in `pending`, owned by the caller. The record is the
/// anchor the upload and transcode pipeline stages key their writes on.
pub async fn create_video(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    body: web::Json<CreateVideoRequest>,
) -> Result<actix_web::HttpResponse> {
    let claims = auth::authenticate(&req, &config.auth)?;
    if body.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let tags = body.tags.clone().unwrap_or_default();
    let video = video_repo::create_video(pool.get_ref(), &claims.sub, &body.title, &tags).await?;

    Ok(actix_web::HttpResponse::Created().json(VideoResponse::from(video)))
}

/// Get a specific video
pub async fn get_video(
    pool: web::Data<PgPool>,
    video_id: web::Path<String>,
) -> Result<actix_web::HttpResponse> {
    let video = video_repo::get_video(pool.get_ref(), &video_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    Ok(actix_web::HttpResponse::Ok().json(VideoResponse::from(video)))
}

/// List the caller's videos, newest first
pub async fn list_videos(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> Result<actix_web::HttpResponse> {
    let claims = auth::authenticate(&req, &config.auth)?;
    let videos = video_repo::list_videos_by_owner(pool.get_ref(), &claims.sub).await?;
    let responses: Vec<VideoResponse> = videos.into_iter().map(VideoResponse::from).collect();

    Ok(actix_web::HttpResponse::Ok().json(responses))
}

/// Set a video's visibility. Independent of pipeline status: a video can be
/// published before transcoding finishes, it just stays out of search
/// results until it is both public and ready.
pub async fn publish_video(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    video_id: web::Path<String>,
    body: web::Json<PublishRequest>,
) -> Result<actix_web::HttpResponse> {
    let claims = auth::authenticate(&req, &config.auth)?;
    let visibility = Visibility::from_str(&body.visibility)
        .ok_or_else(|| AppError::BadRequest("Visibility must be public or private".to_string()))?;

    let existing = video_repo::get_video(pool.get_ref(), &video_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;
    if existing.owner_id != claims.sub {
        return Err(AppError::Forbidden("Not the video owner".to_string()));
    }

    let updated = video_repo::set_visibility(pool.get_ref(), &video_id, visibility.as_str())
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    Ok(actix_web::HttpResponse::Ok().json(VideoResponse::from(updated)))
}
