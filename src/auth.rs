//! JWT issuance/verification and password hashing. Handlers that need
//! a caller identity take a [`CurrentUser`] extractor, which reads the
//! `Authorization: Bearer` header and rejects with 401 on anything
//! short of a valid, unexpired token.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::User,
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub is_producer: bool,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(config: &Config, user: &User) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        is_producer: user.is_producer,
        iat: now.timestamp(),
        exp: (now + Duration::hours(config.jwt_lifetime_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(AppError::internal)
}

pub fn decode_token(config: &Config, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(AppError::internal)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Identity of the authenticated caller, decoded from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub is_producer: bool,
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims = decode_token(&state.config, token)?;
        Ok(CurrentUser {
            id: claims.sub,
            email: claims.email,
            is_producer: claims.is_producer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheTtls;
    use chrono::DateTime;

    fn test_config() -> Config {
        Config {
            port: 0,
            database_url: "sqlite::memory:".into(),
            redis_url: None,
            media_dir: "media".into(),
            jwt_secret: "unit-test-secret".into(),
            jwt_lifetime_hours: 1,
            page_size: 20,
            max_upload_bytes: 1024,
            allowed_image_extensions: vec!["jpg".into()],
            ttl: CacheTtls {
                producers_list: 300,
                producers_nearby: 300,
                producer_detail: 600,
                categories_list: 3600,
            },
        }
    }

    fn test_user() -> User {
        User {
            id: 7,
            email: "ferme@example.org".into(),
            password_hash: String::new(),
            is_producer: true,
            created_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let config = test_config();
        let token = issue_token(&config, &test_user()).unwrap();
        let claims = decode_token(&config, &token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "ferme@example.org");
        assert!(claims.is_producer);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = test_config();
        let token = issue_token(&config, &test_user()).unwrap();

        let mut other = test_config();
        other.jwt_secret = "another-secret".into();
        assert!(decode_token(&other, &token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(decode_token(&test_config(), "not-a-jwt").is_err());
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }
}
