//! Per-operation access policy.
//!
//! Roles are totally ordered `USER < MANAGER < ADMIN`. Every mutating
//! operation carries a configured minimum role, consulted here before any
//! repository access. The thresholds live in one table instead of being
//! repeated at each call site.

use axum::{http::StatusCode, Json};
use diesel::prelude::*;
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::error::{ApiError, ApiResult};
use crate::models::{User, UserRole};
use crate::schema::users;

/// Mutating operations gated by a minimum role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateProject,
    UpdateProject,
    DeleteProject,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateProject => "create_project",
            Operation::UpdateProject => "update_project",
            Operation::DeleteProject => "delete_project",
        }
    }
}

/// How author ids supplied to create/update are treated when they do not
/// resolve to existing rows: dropped (`Lenient`, the default) or rejected
/// (`Strict`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorIdValidation {
    Lenient,
    Strict,
}

/// Single source of truth mapping operations to minimum roles.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    create_project: UserRole,
    update_project: UserRole,
    delete_project: UserRole,
    pub author_id_validation: AuthorIdValidation,
    pub registration_role: UserRole,
}

impl AccessPolicy {
    pub fn from_config(config: &crate::config::PolicyConfig) -> Self {
        Self {
            create_project: config.create_project_min_role,
            update_project: config.update_project_min_role,
            delete_project: config.delete_project_min_role,
            author_id_validation: config.author_id_validation,
            registration_role: config.registration_role,
        }
    }

    pub fn minimum_role(&self, operation: Operation) -> UserRole {
        match operation {
            Operation::CreateProject => self.create_project,
            Operation::UpdateProject => self.update_project,
            Operation::DeleteProject => self.delete_project,
        }
    }

    /// Returns true iff `acting_role` meets the configured minimum for
    /// `operation`.
    pub fn authorize(&self, acting_role: UserRole, operation: Operation) -> bool {
        acting_role >= self.minimum_role(operation)
    }
}

/// Resolves the acting user from verified claims and checks the operation's
/// minimum role. "No session" (401) and "under-privileged" (403) are
/// distinct failures; the denial message never says which check failed
/// beyond that.
pub fn require_operation(
    policy: &AccessPolicy,
    claims: &Claims,
    conn: &mut PgConnection,
    operation: Operation,
) -> ApiResult<User> {
    let user = resolve_user(claims, conn)?;

    if !policy.authorize(user.role, operation) {
        tracing::warn!(
            user_id = %user.id,
            operation = operation.as_str(),
            "Operation denied by role policy"
        );
        return Err(ApiError::forbidden("Not authorized", "NOT_AUTHORIZED"));
    }

    Ok(user)
}

/// Loads the user row behind a verified token. A token whose subject no
/// longer resolves to a user counts as an unauthenticated session.
pub fn resolve_user(
    claims: &Claims,
    conn: &mut PgConnection,
) -> Result<User, (StatusCode, Json<ApiError>)> {
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Authentication required", "AUTH_REQUIRED"))?;

    users::table
        .filter(users::id.eq(user_id))
        .first(conn)
        .map_err(|_| ApiError::unauthorized("Authentication required", "AUTH_REQUIRED"))
}
