//! Author listing handlers.

use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{get_db_conn, ApiError, ApiResult},
    models::Author,
    schema::authors,
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorsListResponse {
    pub data: Vec<Author>,
}

/// Lists contributor records, for association pickers.
#[utoipa::path(
    get,
    path = "/authors",
    tag = "Authors",
    responses(
        (status = 200, description = "List of authors", body = AuthorsListResponse),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_authors(State(state): State<AppState>) -> ApiResult<Json<AuthorsListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let data: Vec<Author> = authors::table
        .order(authors::name.asc())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(AuthorsListResponse { data }))
}
