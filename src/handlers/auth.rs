//! Authentication handlers.

use axum::{extract::State, Extension, Json};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{jwt::Claims, password::PasswordService},
    error::{get_db_conn, ApiError, ApiResult},
    models::{NewAuthor, NewUser, User, UserRole},
    schema::{authors, users},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    #[schema(example = "Amina Diop")]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "amina@example.com")]
    pub email: String,
    #[schema(example = "motdepasse123", min_length = 6)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "amina@example.com")]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "motdepasse123")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub access_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    #[schema(example = "Amina Diop")]
    pub name: String,
    #[schema(example = "amina@example.com")]
    pub email: String,
    pub role: UserRole,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Default)]
pub struct ErrorResponse {
    #[schema(example = "Invalid credentials")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "INVALID_CREDENTIALS")]
    #[serde(default)]
    pub code: Option<String>,
}

/// Registers a user and, as a side effect, a matching author row with the
/// same name and email. The default role for new accounts is configured,
/// not hardcoded.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.password, state.password_hash_cost)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    let email = payload.email.to_lowercase();
    let mut conn = get_db_conn(&state.db_pool)?;

    let existing: Option<Uuid> = users::table
        .filter(users::email.eq(&email))
        .select(users::id)
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?;

    if existing.is_some() {
        warn!(email = %email, "Registration attempt for existing email");
        return Err(ApiError::conflict(
            "Email already registered",
            "EMAIL_EXISTS",
        ));
    }

    let user: User = conn
        .transaction(|conn| {
            let user: User = diesel::insert_into(users::table)
                .values(&NewUser {
                    name: payload.name.clone(),
                    email: email.clone(),
                    password_hash,
                    role: state.policy.registration_role,
                })
                .get_result(conn)?;

            // Registration mirrors the account into the authors table so
            // the new user can be associated with projects.
            diesel::insert_into(authors::table)
                .values(&NewAuthor {
                    name: payload.name.clone(),
                    email: email.clone(),
                })
                .execute(conn)?;

            Ok::<_, diesel::result::Error>(user)
        })
        .map_err(|e| {
            warn!(error = %e, email = %email, "Failed to register user");
            ApiError::conflict("Email already registered", "EMAIL_EXISTS")
        })?;

    let access_token = state.jwt_config.generate_access_token(&user).map_err(|e| {
        error!(error = %e, "Token generation failed");
        ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
    })?;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "User registered");

    Ok(Json(AuthResponse {
        user: user.into(),
        access_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    // Same denial for unknown email and wrong password.
    let user: User = users::table
        .filter(users::email.eq(payload.email.to_lowercase()))
        .first(&mut conn)
        .map_err(|_| {
            warn!(email = %payload.email, "Login attempt for non-existent user");
            ApiError::unauthorized("Invalid credentials", "INVALID_CREDENTIALS")
        })?;

    let is_valid = PasswordService::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt - invalid password");
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    }

    let access_token = state.jwt_config.generate_access_token(&user).map_err(|e| {
        error!(error = %e, "Token generation failed");
        ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
    })?;

    info!(user_id = %user.id, email = %user.email, "User logged in");

    Ok(Json(AuthResponse {
        user: user.into(),
        access_token,
    }))
}

/// Returns the currently authenticated user's information.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user information", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid user ID in token", "INVALID_USER_ID"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    Ok(Json(user.into()))
}
