//! Issue request and hand-over endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::issue::{CreateIssueRequest, IssueRecord, IssueRequest, ReaderCopy},
};

use super::AuthenticatedUser;

/// List requests for every library the admin manages
#[utoipa::path(
    get,
    path = "/issues",
    tag = "issues",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Issue and return requests, newest first", body = Vec<IssueRequest>),
        (status = 403, description = "Caller manages no library")
    )
)]
pub async fn list_requests(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<IssueRequest>>> {
    let requests = state
        .services
        .ledger
        .list_issue_requests(&user.principal())
        .await?;
    Ok(Json(requests))
}

/// Ask to borrow a book
#[utoipa::path(
    post,
    path = "/issues",
    tag = "issues",
    security(("bearer_auth" = [])),
    request_body = CreateIssueRequest,
    responses(
        (status = 201, description = "Request created", body = IssueRequest),
        (status = 400, description = "Book not available"),
        (status = 403, description = "Caller is not registered in the library"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "A request is already pending")
    )
)]
pub async fn request_issue(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateIssueRequest>,
) -> AppResult<(StatusCode, Json<IssueRequest>)> {
    let request = state
        .services
        .ledger
        .request_issue(&user.principal(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Announce the return of a borrowed book
#[utoipa::path(
    post,
    path = "/issues/returns",
    tag = "issues",
    security(("bearer_auth" = [])),
    request_body = CreateIssueRequest,
    responses(
        (status = 201, description = "Return request created", body = IssueRequest),
        (status = 404, description = "No open issue of this book"),
        (status = 409, description = "A return is already pending")
    )
)]
pub async fn request_return(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateIssueRequest>,
) -> AppResult<(StatusCode, Json<IssueRequest>)> {
    let request = state
        .services
        .ledger
        .request_return(&user.principal(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// The caller's own requests
#[utoipa::path(
    get,
    path = "/issues/status",
    tag = "issues",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Requests, newest first", body = Vec<IssueRequest>)
    )
)]
pub async fn status_issue(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<IssueRequest>>> {
    let requests = state.services.ledger.status_issue(&user.principal()).await?;
    Ok(Json(requests))
}

/// The caller's issue records, open and returned
#[utoipa::path(
    get,
    path = "/issues/records",
    tag = "issues",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Issue records, newest first", body = Vec<IssueRecord>)
    )
)]
pub async fn my_issues(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<IssueRecord>>> {
    let records = state.services.ledger.my_issues(&user.principal()).await?;
    Ok(Json(records))
}

/// Approve a pending request
#[utoipa::path(
    put,
    path = "/issues/{id}/approve",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request approved", body = IssueRequest),
        (status = 400, description = "Request already processed"),
        (status = 403, description = "Library not managed by the caller"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn approve_request(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<IssueRequest>> {
    let request = state.services.ledger.approve_issue(&user.principal(), id).await?;
    Ok(Json(request))
}

/// Disapprove a pending request
#[utoipa::path(
    put,
    path = "/issues/{id}/disapprove",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request disapproved", body = IssueRequest),
        (status = 400, description = "Request already processed"),
        (status = 403, description = "Library not managed by the caller"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn disapprove_request(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<IssueRequest>> {
    let request = state
        .services
        .ledger
        .disapprove_issue(&user.principal(), id)
        .await?;
    Ok(Json(request))
}

/// Hand a copy of a book to a reader
#[utoipa::path(
    post,
    path = "/issues/books/{isbn}",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "Book ISBN")
    ),
    request_body = ReaderCopy,
    responses(
        (status = 201, description = "Copy issued", body = IssueRecord),
        (status = 400, description = "No copy available"),
        (status = 403, description = "Library not managed by the caller"),
        (status = 404, description = "Reader or book not found"),
        (status = 409, description = "Reader already holds this book")
    )
)]
pub async fn issue_book(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(isbn): Path<String>,
    Json(input): Json<ReaderCopy>,
) -> AppResult<(StatusCode, Json<IssueRecord>)> {
    let record = state
        .services
        .ledger
        .issue_book_to_user(&user.principal(), &isbn, input)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Take a copy back from a reader
#[utoipa::path(
    post,
    path = "/issues/books/{isbn}/return",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "Book ISBN")
    ),
    request_body = ReaderCopy,
    responses(
        (status = 200, description = "Copy returned", body = IssueRecord),
        (status = 403, description = "Library not managed by the caller"),
        (status = 404, description = "No open issue of this book for the reader")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(isbn): Path<String>,
    Json(input): Json<ReaderCopy>,
) -> AppResult<Json<IssueRecord>> {
    let record = state
        .services
        .ledger
        .return_book(&user.principal(), &isbn, input)
        .await?;
    Ok(Json(record))
}
