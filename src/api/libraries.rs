//! Library endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::library::{CreateLibrary, Library},
};

use super::AuthenticatedUser;

/// List every library
#[utoipa::path(
    get,
    path = "/libraries",
    tag = "libraries",
    responses(
        (status = 200, description = "All libraries", body = Vec<Library>)
    )
)]
pub async fn list_libraries(State(state): State<crate::AppState>) -> AppResult<Json<Vec<Library>>> {
    let libraries = state.services.accounts.list_libraries().await?;
    Ok(Json(libraries))
}

/// Create a library (owner only)
#[utoipa::path(
    post,
    path = "/libraries",
    tag = "libraries",
    security(("bearer_auth" = [])),
    request_body = CreateLibrary,
    responses(
        (status = 201, description = "Library created", body = Library),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Caller is not an owner")
    )
)]
pub async fn create_library(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateLibrary>,
) -> AppResult<(StatusCode, Json<Library>)> {
    let library = state
        .services
        .accounts
        .create_library(&user.principal(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(library)))
}
