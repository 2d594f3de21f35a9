use std::sync::Arc;

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        auth::{Actor, ActorRole},
        user::{CreateUserRequest, RoleRow, UpdateUserRequest, User},
    },
    policy::{EntityKind, Operation, PolicyEngine},
    services::{email::EmailService, identity::IdentityService},
};

/// Projection shared by every query returning a [`User`].
pub const USER_SELECT: &str = "SELECT u.id, u.email, u.password_hash, u.first_name, u.last_name,
        r.name AS role_name, u.is_active, u.is_superuser, u.password_reset_required, u.created_at
     FROM users u
     LEFT JOIN roles r ON r.id = u.role_id";

pub struct UserService;

impl UserService {
    /// Build the request's actor from a token subject. Inactive or missing
    /// accounts yield `None`; a clinic admin without a clinic keeps the role
    /// with no clinic attached.
    pub async fn resolve_actor(pool: &PgPool, user_id: i64) -> AppResult<Option<Actor>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "{USER_SELECT} WHERE u.id = $1 AND u.is_active = TRUE"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        let Some(user) = user else {
            return Ok(None);
        };

        let role = user.role();
        let managed_clinic = match role {
            Some(crate::models::user::Role::ClinicAdmin) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM clinics WHERE clinic_admin_id = $1 ORDER BY id LIMIT 1",
                )
                .bind(user.id)
                .fetch_optional(pool)
                .await?
            }
            _ => None,
        };

        Ok(Some(Actor {
            user_id: user.id,
            email: user.email,
            is_superuser: user.is_superuser,
            role: ActorRole::from_role(role, managed_clinic),
        }))
    }

    pub async fn me(pool: &PgPool, actor: &Actor) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(actor.user_id)
            .fetch_one(pool)
            .await?;
        Ok(user)
    }

    pub async fn list(pool: &PgPool, actor: &Actor) -> AppResult<Vec<User>> {
        let scope = PolicyEngine::scope(actor, EntityKind::User);
        let mut qb = QueryBuilder::<Postgres>::new(format!("{USER_SELECT} WHERE "));
        scope.push_filter(&mut qb, &EntityKind::User.columns());
        qb.push(" ORDER BY u.last_name, u.first_name, u.email");
        let users = qb.build_query_as::<User>().fetch_all(pool).await?;
        Ok(users)
    }

    pub async fn get(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        PolicyEngine::authorize(actor, EntityKind::User, Operation::Read, Some(&user.ownership()))?;
        Ok(user)
    }

    pub async fn create(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        actor: &Actor,
        req: &CreateUserRequest,
    ) -> AppResult<User> {
        PolicyEngine::authorize(actor, EntityKind::User, Operation::Add, None)?;
        let email = req.email.trim();
        if email.is_empty() {
            return Err(AppError::validation("Email is required"));
        }
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
            .bind(email)
            .fetch_one(pool)
            .await?;
        if taken {
            return Err(AppError::Integrity("A user with this email already exists.".into()));
        }

        let id = IdentityService::provision_account(
            pool,
            config,
            email_svc,
            email,
            &req.first_name,
            &req.last_name,
            req.role,
            None,
        )
        .await?
        .ok_or_else(|| AppError::Integrity("A user with this email already exists.".into()))?;
        Self::get(pool, actor, id).await
    }

    pub async fn update(pool: &PgPool, actor: &Actor, id: i64, req: &UpdateUserRequest) -> AppResult<User> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::User, Operation::Change, Some(&current.ownership()))?;
        if req.touches_privileged_fields() && !actor.has_full_access() {
            return Err(AppError::forbidden("Only a superuser can change roles or activation"));
        }

        let role_id: Option<i64> = match req.role {
            Some(role) => Some(
                sqlx::query_scalar("SELECT id FROM roles WHERE LOWER(name) = LOWER($1)")
                    .bind(role.as_name())
                    .fetch_optional(pool)
                    .await?
                    .ok_or_else(|| AppError::validation(format!("Role \"{role}\" does not exist.")))?,
            ),
            None => None,
        };

        sqlx::query(
            "UPDATE users
             SET first_name = COALESCE($1, first_name),
                 last_name  = COALESCE($2, last_name),
                 role_id    = COALESCE($3, role_id),
                 is_active  = COALESCE($4, is_active)
             WHERE id = $5",
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(role_id)
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;

        Self::get(pool, actor, id).await
    }

    pub async fn delete(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<()> {
        let target = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::User, Operation::Delete, Some(&target.ownership()))?;
        if target.id == actor.user_id {
            return Err(AppError::validation("You cannot delete your own account"));
        }
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn roles(pool: &PgPool) -> AppResult<Vec<RoleRow>> {
        let roles = sqlx::query_as::<_, RoleRow>("SELECT id, name FROM roles ORDER BY id")
            .fetch_all(pool)
            .await?;
        Ok(roles)
    }

    /// Whether `user_id` holds the clinic admin role.
    pub async fn is_clinic_admin(pool: &PgPool, user_id: i64) -> AppResult<bool> {
        let yes: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM users u JOIN roles r ON r.id = u.role_id
                WHERE u.id = $1 AND LOWER(r.name) = 'clinic admin')",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(yes)
    }
}
