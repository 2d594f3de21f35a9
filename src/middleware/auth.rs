use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::{
    error::AppError,
    models::auth::{Actor, Claims},
    services::users::UserService,
    AppState,
};

/// Resolve the calling [`Actor`] from the bearer token.
///
/// The token only proves identity; role and managed clinic are reloaded from
/// the database on every request so revocations apply immediately.
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".into()))?;

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("JWT secret not configured")))?;

        let claims = decode_access_token(token, &secret.0)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        UserService::resolve_actor(&state.db, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User account is disabled or missing".into()))
    }
}

/// Extension type to carry the JWT secret through request extensions.
#[derive(Clone)]
pub struct JwtSecret(pub String);

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::{Role, User},
        services::auth::AuthService,
    };

    fn user() -> User {
        User {
            id: 42,
            email: "t@clinic.test".into(),
            password_hash: String::new(),
            first_name: "Tess".into(),
            last_name: "Ng".into(),
            role_name: Some("therapist".into()),
            is_active: true,
            is_superuser: false,
            password_reset_required: false,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn access_tokens_round_trip_with_the_same_secret() {
        let token = AuthService::generate_access_token(&user(), "secret", 60).unwrap();
        let claims = decode_access_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, Some(Role::Therapist));
    }

    #[test]
    fn a_foreign_secret_is_rejected() {
        let token = AuthService::generate_access_token(&user(), "secret", 60).unwrap();
        assert!(decode_access_token(&token, "other").is_err());
    }
}
