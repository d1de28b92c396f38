//! OpenAPI documentation configuration.
//!
//! Generates the OpenAPI specification via `utoipa` and serves it through
//! Swagger UI. The chat stream endpoint is documented in prose only — SSE
//! responses do not fit the schema model.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::auth::{
    AuthResponse, ErrorResponse, LoginRequest, RegisterRequest, UserResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Atelier API",
        version = "1.0.0",
        description = "Team project tracker with a conversational assistant.\n\n\
        ## Features\n\
        - Credential registration and login with JWT bearer sessions\n\
        - Role-gated project management (USER < MANAGER < ADMIN)\n\
        - Ownership-scoped project search with status and date disambiguation\n\
        - A POST /chat endpoint streaming assistant turns and tool calls over SSE\n\n\
        ## Authentication\n\
        Most endpoints require a JWT bearer token.\n\
        1. Register or login to get an access token\n\
        2. Include the token in requests: `Authorization: Bearer <token>`",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "User registration and sessions"),
        (name = "Projects", description = "Project management and search"),
        (name = "Authors", description = "Contributor records")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::get_current_user,

        crate::handlers::projects::create_project,
        crate::handlers::projects::update_project,
        crate::handlers::projects::delete_project,
        crate::handlers::projects::list_projects,
        crate::handlers::projects::search_projects,
        crate::handlers::projects::get_project,

        crate::handlers::authors::list_authors,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            UserResponse,
            ErrorResponse,

            crate::models::Project,
            crate::models::Author,
            crate::models::ProjectStatus,
            crate::models::UserRole,
            crate::query::ProjectWithAuthors,
            crate::handlers::projects::CreateProjectRequest,
            crate::handlers::projects::UpdateProjectRequest,
            crate::handlers::projects::ProjectListResponse,
            crate::handlers::authors::AuthorsListResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from /auth/login or /auth/register.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
