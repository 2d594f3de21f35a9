use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        auth::{Claims, RefreshClaims},
        user::{ChangePasswordRequest, LoginResponse, RefreshToken, ResetPasswordRequest, User},
    },
    services::{metrics, users::USER_SELECT},
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub enum LoginOutcome {
    Authenticated(LoginResponse),
    /// Credentials are valid but the account still holds a temporary password.
    PasswordResetRequired { email: String },
}

pub struct AuthService;

impl AuthService {
    pub async fn login(
        pool: &PgPool,
        config: &Config,
        email: &str,
        password: &str,
    ) -> AppResult<LoginOutcome> {
        let user = match Self::verify_credentials(pool, email, password).await {
            Ok(user) => user,
            Err(e) => {
                metrics::LOGINS_COUNTER.with_label_values(&["failure"]).inc();
                return Err(e);
            }
        };

        if user.password_reset_required {
            metrics::LOGINS_COUNTER.with_label_values(&["reset_required"]).inc();
            return Ok(LoginOutcome::PasswordResetRequired { email: user.email });
        }

        let response = Self::issue_tokens(pool, config, user).await?;
        metrics::LOGINS_COUNTER.with_label_values(&["success"]).inc();
        info!(user_id = response.user.id, "login");
        Ok(LoginOutcome::Authenticated(response))
    }

    async fn verify_credentials(pool: &PgPool, email: &str, password: &str) -> AppResult<User> {
        let invalid = || AppError::Unauthorized("Invalid email or password.".into());

        let user = sqlx::query_as::<_, User>(&format!(
            "{USER_SELECT} WHERE LOWER(u.email) = LOWER($1)"
        ))
        .bind(email.trim())
        .fetch_optional(pool)
        .await?
        .ok_or_else(invalid)?;

        if !bcrypt::verify(password, &user.password_hash).unwrap_or(false) {
            return Err(invalid());
        }
        if !user.is_active {
            return Err(AppError::Unauthorized("User account is disabled.".into()));
        }
        Ok(user)
    }

    /// Issue an access/refresh pair and persist the hashed refresh token.
    pub async fn issue_tokens(pool: &PgPool, config: &Config, user: User) -> AppResult<LoginResponse> {
        let access = Self::generate_access_token(&user, &config.jwt_secret, config.jwt_expiry_seconds)?;
        let (refresh, refresh_id) = Self::generate_refresh_token(
            user.id,
            &config.jwt_refresh_secret,
            config.jwt_refresh_expiry_days,
        )?;

        let hash = bcrypt::hash(&refresh, 8).map_err(anyhow::Error::from)?;
        let expires_at = Utc::now() + chrono::Duration::days(config.jwt_refresh_expiry_days as i64);
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(refresh_id)
        .bind(user.id)
        .bind(hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(LoginResponse {
            access,
            refresh,
            user: user.into(),
        })
    }

    pub fn generate_access_token(user: &User, secret: &str, ttl_seconds: u64) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role(),
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    fn generate_refresh_token(user_id: i64, secret: &str, ttl_days: u64) -> anyhow::Result<(String, Uuid)> {
        let now = Utc::now().timestamp() as usize;
        let jti = Uuid::new_v4();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            iat: now,
            exp: now + (ttl_days * 86400) as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok((token, jti))
    }

    fn decode_refresh_token(token: &str, secret: &str) -> AppResult<RefreshClaims> {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode::<RefreshClaims>(token, &key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token.".into()))
    }

    /// Rotate refresh token: revoke old, issue new pair.
    pub async fn refresh(pool: &PgPool, config: &Config, token: &str) -> AppResult<LoginResponse> {
        let claims = Self::decode_refresh_token(token, &config.jwt_refresh_secret)?;
        let invalid = || AppError::Unauthorized("Invalid or expired refresh token.".into());
        let jti: Uuid = claims.jti.parse().map_err(|_| invalid())?;
        let user_id: i64 = claims.sub.parse().map_err(|_| invalid())?;

        let stored: RefreshToken =
            sqlx::query_as("SELECT * FROM refresh_tokens WHERE id = $1 AND revoked = FALSE")
                .bind(jti)
                .fetch_optional(pool)
                .await?
                .ok_or_else(invalid)?;

        if stored.user_id != user_id || stored.expires_at < Utc::now() {
            return Err(invalid());
        }
        if !bcrypt::verify(token, &stored.token_hash).unwrap_or(false) {
            return Err(invalid());
        }

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(jti)
            .execute(pool)
            .await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "{USER_SELECT} WHERE u.id = $1 AND u.is_active = TRUE"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(invalid)?;

        Self::issue_tokens(pool, config, user).await
    }

    /// Revoke a refresh token. Unknown or malformed tokens are ignored.
    pub async fn logout(pool: &PgPool, config: &Config, token: &str) -> AppResult<()> {
        if let Ok(claims) = Self::decode_refresh_token(token, &config.jwt_refresh_secret) {
            if let Ok(jti) = claims.jti.parse::<Uuid>() {
                sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
                    .bind(jti)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn change_password(pool: &PgPool, user_id: i64, req: &ChangePasswordRequest) -> AppResult<()> {
        validate_new_password(&req.new_password)?;
        if req.new_password != req.confirm_password {
            return Err(AppError::validation("New passwords don't match."));
        }

        let password_hash: String =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1 AND is_active = TRUE")
                .bind(user_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::not_found("User not found."))?;

        if !bcrypt::verify(&req.old_password, &password_hash).unwrap_or(false) {
            return Err(AppError::validation("Old password is incorrect."));
        }

        Self::set_password(pool, user_id, &req.new_password).await?;
        info!(user_id, "password changed");
        Ok(())
    }

    /// First-login flow: exchange the emailed temporary password for a real one.
    pub async fn reset_password(
        pool: &PgPool,
        config: &Config,
        req: &ResetPasswordRequest,
    ) -> AppResult<LoginResponse> {
        validate_new_password(&req.new_password)?;
        let user = Self::verify_credentials(pool, &req.email, &req.temp_password).await?;
        if !user.password_reset_required {
            return Err(AppError::validation("Password reset is not required for this account."));
        }
        if req.new_password == req.temp_password {
            return Err(AppError::validation(
                "New password must differ from the temporary password.",
            ));
        }

        Self::set_password(pool, user.id, &req.new_password).await?;
        info!(user_id = user.id, "temporary password replaced");

        let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(user.id)
            .fetch_one(pool)
            .await?;
        Self::issue_tokens(pool, config, user).await
    }

    /// Store a new password, clear the reset flag and revoke every refresh token.
    async fn set_password(pool: &PgPool, user_id: i64, password: &str) -> AppResult<()> {
        let hash = hash_password(password)?;
        sqlx::query(
            "UPDATE users SET password_hash = $1, password_reset_required = FALSE WHERE id = $2",
        )
        .bind(&hash)
        .bind(user_id)
        .execute(pool)
        .await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    Ok(bcrypt::hash(password, 12)?)
}

pub fn validate_new_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn user() -> User {
        User {
            id: 42,
            email: "t@x".into(),
            password_hash: String::new(),
            first_name: "Tom".into(),
            last_name: "Hart".into(),
            role_name: Some("therapist".into()),
            is_active: true,
            is_superuser: false,
            password_reset_required: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_carries_user_and_role() {
        let token = AuthService::generate_access_token(&user(), "secret", 60).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "42");
        assert_eq!(data.claims.role, Some(Role::Therapist));
    }

    #[test]
    fn refresh_token_round_trips_its_id() {
        let (token, jti) = AuthService::generate_refresh_token(42, "refresh", 1).unwrap();
        let claims = AuthService::decode_refresh_token(&token, "refresh").unwrap();
        assert_eq!(claims.jti, jti.to_string());
        assert!(AuthService::decode_refresh_token(&token, "other").is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("longenough").is_ok());
    }
}
