//! Book inventory and search endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::book::{Book, BookQuery, BookSearchResult, CreateBook, RemovedCopy, UpdateBook},
    services::ledger::Stocked,
};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LibraryParam {
    pub library_id: i32,
}

/// Result of removing a copy. `book` is absent when the last copy went away.
#[derive(Serialize, ToSchema)]
pub struct RemoveBookResponse {
    pub message: String,
    pub book: Option<Book>,
}

/// Add a book to a library, or add copies when it already exists
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 200, description = "Existing book restocked", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Library not managed by the caller")
    )
)]
pub async fn add_book(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let stocked = state
        .services
        .ledger
        .add_or_restock_book(&user.principal(), input)
        .await?;

    Ok(match stocked {
        Stocked::Created(book) => (StatusCode::CREATED, Json(book)),
        Stocked::Restocked(book) => (StatusCode::OK, Json(book)),
    })
}

/// Update a book's metadata and total copies
#[utoipa::path(
    put,
    path = "/books/{isbn}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "Book ISBN")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Total copies below issued copies"),
        (status = 403, description = "Library not managed by the caller"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(isbn): Path<String>,
    Json(input): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    let book = state
        .services
        .ledger
        .update_book(&user.principal(), &isbn, input)
        .await?;
    Ok(Json(book))
}

/// Remove one copy of a book
#[utoipa::path(
    delete,
    path = "/books/{isbn}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "Book ISBN"),
        LibraryParam
    ),
    responses(
        (status = 200, description = "Copy removed", body = RemoveBookResponse),
        (status = 400, description = "Every copy is issued"),
        (status = 403, description = "Library not managed by the caller"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn remove_book(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(isbn): Path<String>,
    Query(params): Query<LibraryParam>,
) -> AppResult<Json<RemoveBookResponse>> {
    let removed = state
        .services
        .ledger
        .remove_book(&user.principal(), &isbn, params.library_id)
        .await?;

    let response = match removed {
        RemovedCopy::Decremented(book) => RemoveBookResponse {
            message: "One copy of the book removed".to_string(),
            book: Some(book),
        },
        RemovedCopy::Deleted => RemoveBookResponse {
            message: "Book removed from the library".to_string(),
            book: None,
        },
    };
    Ok(Json(response))
}

/// Search books in the caller's libraries
#[utoipa::path(
    get,
    path = "/books/search",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<BookSearchResult>),
        (status = 403, description = "Caller is not a reader")
    )
)]
pub async fn search_books(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Vec<BookSearchResult>>> {
    let results = state
        .services
        .ledger
        .search_books(&user.principal(), &query)
        .await?;
    Ok(Json(results))
}
