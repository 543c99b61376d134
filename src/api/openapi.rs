//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, issues, libraries, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LMS API",
        version = "0.3.0",
        description = "Multi-tenant Library Management REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        // Libraries
        libraries::list_libraries,
        libraries::create_library,
        // Users
        users::register_owner,
        users::register_admin,
        users::register_user,
        // Books
        books::add_book,
        books::update_book,
        books::remove_book,
        books::search_books,
        // Issues
        issues::list_requests,
        issues::request_issue,
        issues::request_return,
        issues::status_issue,
        issues::my_issues,
        issues::approve_request,
        issues::disapprove_request,
        issues::issue_book,
        issues::return_book,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::UserInfo,
            crate::models::user::Role,
            // Libraries
            crate::models::library::Library,
            crate::models::library::CreateLibrary,
            // Users
            crate::models::user::CreateOwner,
            crate::models::user::CreateMember,
            // Books
            crate::models::book::Book,
            crate::models::book::BookMetadata,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::BookSearchResult,
            books::RemoveBookResponse,
            // Issues
            crate::models::issue::IssueRequest,
            crate::models::issue::IssueRecord,
            crate::models::issue::RequestType,
            crate::models::issue::RequestStatus,
            crate::models::issue::IssueStatus,
            crate::models::issue::CreateIssueRequest,
            crate::models::issue::ReaderCopy,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "libraries", description = "Library management"),
        (name = "users", description = "Owner, admin and reader registration"),
        (name = "books", description = "Book inventory and search"),
        (name = "issues", description = "Issue requests, hand-over and returns")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme used by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
