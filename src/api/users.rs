//! Account registration endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::user::{CreateMember, CreateOwner},
};

use super::{auth::UserInfo, AuthenticatedUser};

/// Register another owner
#[utoipa::path(
    post,
    path = "/owners",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateOwner,
    responses(
        (status = 201, description = "Owner created", body = UserInfo),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Caller is not an owner"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn register_owner(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateOwner>,
) -> AppResult<(StatusCode, Json<UserInfo>)> {
    let created = state
        .services
        .accounts
        .register_owner(&user.principal(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Register an admin for one or more libraries
#[utoipa::path(
    post,
    path = "/admins",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateMember,
    responses(
        (status = 201, description = "Admin created", body = UserInfo),
        (status = 400, description = "Invalid input or unknown library"),
        (status = 403, description = "Caller is not an owner"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn register_admin(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateMember>,
) -> AppResult<(StatusCode, Json<UserInfo>)> {
    let created = state
        .services
        .accounts
        .register_admin(&user.principal(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Register a reader in libraries the calling admin manages
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateMember,
    responses(
        (status = 201, description = "User created", body = UserInfo),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Library not managed by the caller"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn register_user(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateMember>,
) -> AppResult<(StatusCode, Json<UserInfo>)> {
    let created = state
        .services
        .accounts
        .register_user(&user.principal(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}
