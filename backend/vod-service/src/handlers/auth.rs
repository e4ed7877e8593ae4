/// Auth handlers - HTTP endpoints for account login
use actix_web::web;
use sqlx::PgPool;

use crate::auth;
use crate::config::Config;
use crate::db::user_repo;
use crate::error::{AppError, Result};
use crate::models::{LoginRequest, LoginResponse, UserSummary};

/// Log in by email, creating the account on first use.
pub async fn login(
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    req: web::Json<LoginRequest>,
) -> Result<actix_web::HttpResponse> {
    if req.email.is_empty() || !req.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email".to_string()));
    }

    let user = user_repo::upsert_by_email(pool.get_ref(), &req.email, req.name.as_deref()).await?;
    let token = auth::issue_token(&config.auth, &user)?;

    Ok(actix_web::HttpResponse::Ok().json(LoginResponse {
        token,
        user: UserSummary {
            id: user.id,
            email: user.email,
        },
    }))
}
