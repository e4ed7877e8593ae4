//! Token issuance and verification.
//!
//! Login is an email upsert; the token carries the user id as `sub` and is
//! checked per-request by the handlers that need an owner.
use crate::config::AuthConfig;
use crate::error::AppError;
use crate::models::User;
use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

pub fn issue_token(cfg: &AuthConfig, user: &User) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::days(cfg.token_ttl_days)).timestamp() as usize;
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
    .map_err(|err| AppError::Internal(format!("token issuance failed: {err}")))
}

/// Extract and verify the bearer token on a request.
pub fn authenticate(req: &HttpRequest, cfg: &AuthConfig) -> Result<Claims, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("invalid token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_days: 7,
        }
    }

    fn test_user() -> User {
        User {
            id: "user-1".to_string(),
            email: "demo@example.com".to_string(),
            name: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_round_trips() {
        let cfg = test_config();
        let token = issue_token(&cfg, &test_user()).unwrap();
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, format!("Bearer {token}")))
            .to_http_request();

        let claims = authenticate(&req, &cfg).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "demo@example.com");
    }

    #[test]
    fn missing_or_mangled_tokens_are_rejected() {
        let cfg = test_config();

        let req = TestRequest::default().to_http_request();
        assert!(authenticate(&req, &cfg).is_err());

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer garbage"))
            .to_http_request();
        assert!(authenticate(&req, &cfg).is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let cfg = test_config();
        let other = AuthConfig {
            jwt_secret: "different".to_string(),
            token_ttl_days: 7,
        };
        let token = issue_token(&other, &test_user()).unwrap();
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, format!("Bearer {token}")))
            .to_http_request();
        assert!(authenticate(&req, &cfg).is_err());
    }
}
