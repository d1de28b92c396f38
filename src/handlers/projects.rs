//! Project management handlers.

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult},
    models::{NewProject, Project, ProjectStatus},
    policy::{self, Operation},
    query::{self, search::SearchPlan, AuthorIdError, ProjectWithAuthors, REST_SEARCH_LIMIT},
    schema::{project_authors, projects},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    #[schema(example = "Portail de paiement local")]
    pub title: String,
    #[schema(example = "Mobile-money integration for intra-team transfers")]
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    #[schema(example = "2025-03-01")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub author_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    #[schema(example = "Portail de paiement local")]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    #[schema(example = "2025-03-01")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub author_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub data: Vec<ProjectWithAuthors>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Free search text over title, description and due date.
    pub search: Option<String>,
    /// Exact status filter; "all" or omitted means unfiltered.
    pub status: Option<String>,
}

fn parse_status_param(raw: Option<&str>) -> ApiResult<Option<ProjectStatus>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => ProjectStatus::from_str(s).map(Some).map_err(|_| {
            // Fail closed before anything reaches the repository.
            ApiError::bad_request(format!("Unknown status \"{}\"", s), "INVALID_STATUS")
        }),
    }
}

fn map_author_id_error(e: AuthorIdError) -> (StatusCode, Json<ApiError>) {
    match e {
        AuthorIdError::Unknown(ids) => ApiError::bad_request(
            format!(
                "Unknown author ids: {}",
                ids.iter()
                    .map(Uuid::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            "UNKNOWN_AUTHOR_IDS",
        ),
        AuthorIdError::Db(_) => ApiError::db_error(),
    }
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 200, description = "Project created successfully", body = ProjectWithAuthors),
        (status = 400, description = "Invalid request", body = crate::handlers::auth::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::handlers::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<Json<ProjectWithAuthors>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let actor = policy::require_operation(
        &state.policy,
        &claims,
        &mut conn,
        Operation::CreateProject,
    )?;

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request(
            "Title must not be empty",
            "TITLE_REQUIRED",
        ));
    }

    let author_ids = query::resolve_author_ids(
        &mut conn,
        &payload.author_ids,
        state.policy.author_id_validation,
    )
    .map_err(map_author_id_error)?;

    let project: Project = conn
        .transaction(|conn| {
            let project: Project = diesel::insert_into(projects::table)
                .values(&NewProject {
                    title,
                    description: payload.description.clone(),
                    status: payload.status.unwrap_or(ProjectStatus::Idea),
                    due_date: payload.due_date,
                    owner_id: actor.id,
                })
                .get_result(conn)?;

            query::replace_authors(conn, project.id, &author_ids)?;

            Ok::<_, diesel::result::Error>(project)
        })
        .map_err(|e| {
            tracing::error!(error = %e, "Project creation failed");
            ApiError::internal("Project creation failed", "CREATE_FAILED")
        })?;

    info!(project_id = %project.id, owner_id = %actor.id, "Created project");

    let detailed = query::with_authors(&mut conn, vec![project])
        .map_err(|_| ApiError::db_error())?
        .pop()
        .ok_or_else(|| ApiError::internal("Project load failed", "CREATE_FAILED"))?;

    Ok(Json(detailed))
}

/// Full field replacement, including a delete-then-recreate of the author
/// associations. Writes are role-gated, not ownership-gated: any
/// sufficiently privileged user may edit any project.
#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    request_body = UpdateProjectRequest,
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project updated", body = ProjectWithAuthors),
        (status = 400, description = "Invalid request", body = crate::handlers::auth::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<ProjectWithAuthors>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let actor = policy::require_operation(
        &state.policy,
        &claims,
        &mut conn,
        Operation::UpdateProject,
    )?;

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request(
            "Title must not be empty",
            "TITLE_REQUIRED",
        ));
    }

    let author_ids = query::resolve_author_ids(
        &mut conn,
        &payload.author_ids,
        state.policy.author_id_validation,
    )
    .map_err(map_author_id_error)?;

    let now = Utc::now().naive_utc();

    let project: Project = conn
        .transaction(|conn| {
            let project: Project =
                diesel::update(projects::table.filter(projects::id.eq(project_id)))
                    .set((
                        projects::title.eq(title.clone()),
                        projects::description.eq(payload.description.clone()),
                        projects::status.eq(payload.status.unwrap_or(ProjectStatus::Idea)),
                        projects::due_date.eq(payload.due_date),
                        projects::updated_at.eq(now),
                    ))
                    .get_result(conn)?;

            query::replace_authors(conn, project.id, &author_ids)?;

            Ok::<_, diesel::result::Error>(project)
        })
        .map_err(|e| match e {
            diesel::result::Error::NotFound => {
                ApiError::not_found("Project not found", "PROJECT_NOT_FOUND")
            }
            e => {
                tracing::error!(error = %e, "Project update failed");
                ApiError::internal("Project update failed", "UPDATE_FAILED")
            }
        })?;

    info!(project_id = %project.id, user_id = %actor.id, "Updated project");

    let detailed = query::with_authors(&mut conn, vec![project])
        .map_err(|_| ApiError::db_error())?
        .pop()
        .ok_or_else(|| ApiError::internal("Project load failed", "UPDATE_FAILED"))?;

    Ok(Json(detailed))
}

/// Hard delete. Author associations are removed first to satisfy
/// referential integrity; a second delete of the same id reports
/// not-found.
#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let actor = policy::require_operation(
        &state.policy,
        &claims,
        &mut conn,
        Operation::DeleteProject,
    )?;

    let deleted = conn
        .transaction(|conn| {
            diesel::delete(
                project_authors::table.filter(project_authors::project_id.eq(project_id)),
            )
            .execute(conn)?;

            diesel::delete(projects::table.filter(projects::id.eq(project_id))).execute(conn)
        })
        .map_err(|e| {
            tracing::error!(error = %e, "Project deletion failed");
            ApiError::internal("Project deletion failed", "DELETE_FAILED")
        })?;

    if deleted == 0 {
        return Err(ApiError::not_found(
            "Project not found",
            "PROJECT_NOT_FOUND",
        ));
    }

    info!(project_id = %project_id, user_id = %actor.id, "Deleted project");

    Ok(StatusCode::NO_CONTENT)
}

/// Plain listing of the acting user's projects, most recently updated
/// first.
#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses(
        (status = 200, description = "Projects owned by the current user", body = ProjectListResponse),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ProjectListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = policy::resolve_user(&claims, &mut conn)?;

    let rows = query::list_visible(&mut conn, actor.id).map_err(|_| ApiError::db_error())?;
    let data = query::with_authors(&mut conn, rows).map_err(|_| ApiError::db_error())?;

    Ok(Json(ProjectListResponse { data }))
}

/// Search over the acting user's projects. Free text matching a status
/// keyword becomes a status filter; text parseable as a date also matches
/// the due date.
#[utoipa::path(
    get,
    path = "/projects/search",
    tag = "Projects",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching projects", body = [ProjectWithAuthors]),
        (status = 400, description = "Unknown status filter", body = crate::handlers::auth::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn search_projects(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<ProjectWithAuthors>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = policy::resolve_user(&claims, &mut conn)?;

    let status = parse_status_param(params.status.as_deref())?;
    let plan = SearchPlan::compose(params.search.as_deref(), status, None);

    let rows = query::search_visible(&mut conn, actor.id, &plan, REST_SEARCH_LIMIT)
        .map_err(|_| ApiError::db_error())?;
    let data = query::with_authors(&mut conn, rows).map_err(|_| ApiError::db_error())?;

    Ok(Json(data))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = ProjectWithAuthors),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectWithAuthors>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = policy::resolve_user(&claims, &mut conn)?;

    let project = query::find_visible_by_id(&mut conn, actor.id, project_id)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Project not found", "PROJECT_NOT_FOUND"))?;

    let detailed = query::with_authors(&mut conn, vec![project])
        .map_err(|_| ApiError::db_error())?
        .pop()
        .ok_or_else(|| ApiError::internal("Project load failed", "LOAD_FAILED"))?;

    Ok(Json(detailed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_param_accepts_all_and_empty() {
        assert_eq!(parse_status_param(None).unwrap(), None);
        assert_eq!(parse_status_param(Some("")).unwrap(), None);
        assert_eq!(parse_status_param(Some("all")).unwrap(), None);
        assert_eq!(parse_status_param(Some("ALL")).unwrap(), None);
    }

    #[test]
    fn test_parse_status_param_accepts_known_statuses() {
        assert_eq!(
            parse_status_param(Some("IN_PROGRESS")).unwrap(),
            Some(ProjectStatus::InProgress)
        );
        assert_eq!(
            parse_status_param(Some("done")).unwrap(),
            Some(ProjectStatus::Done)
        );
    }

    #[test]
    fn test_parse_status_param_fails_closed() {
        let err = parse_status_param(Some("CANCELLED")).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
