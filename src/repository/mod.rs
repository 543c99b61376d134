//! Repository layer for persistence
//!
//! Services talk to storage through the [`Store`] traits. [`Repository`]
//! implements them on PostgreSQL; [`memory::MemoryStore`] keeps everything
//! in process. Methods that read a copy count and write a value derived from
//! it run as one atomic unit in both implementations.

pub mod books;
pub mod issues;
pub mod libraries;
pub mod memory;
pub mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookMetadata, BookQuery, RemovedCopy},
        issue::{
            CopyReturn, IssueRecord, IssueRequest, NewIssueRecord, NewIssueRequest,
            RequestDecision, RequestType,
        },
        library::Library,
        user::{NewUser, Role, User},
    },
};

pub use memory::MemoryStore;

/// Libraries and memberships
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn libraries_create(&self, name: &str, location: &str) -> AppResult<Library>;

    async fn libraries_list(&self) -> AppResult<Vec<Library>>;

    async fn libraries_get(&self, id: i32) -> AppResult<Option<Library>>;

    async fn memberships_exists(&self, user_id: i32, library_id: i32) -> AppResult<bool>;

    async fn memberships_library_ids(&self, user_id: i32) -> AppResult<Vec<i32>>;
}

/// Accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn users_get(&self, id: i32) -> AppResult<Option<User>>;

    /// Case-insensitive email lookup
    async fn users_get_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn users_any_with_role(&self, role: Role) -> AppResult<bool>;

    /// Create the account and its memberships as one unit.
    /// A duplicate email fails with `Conflict`.
    async fn users_create(&self, user: &NewUser, library_ids: &[i32]) -> AppResult<User>;
}

/// Book inventory
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn books_get(&self, isbn: &str, library_id: i32) -> AppResult<Option<Book>>;

    /// Insert a new book; an existing `(isbn, library_id)` fails with `Conflict`
    async fn books_create(&self, book: &Book) -> AppResult<Book>;

    /// Atomically add `delta` to both total and available copies
    async fn books_restock(&self, isbn: &str, library_id: i32, delta: i32) -> AppResult<Option<Book>>;

    /// Overwrite metadata and total copies, keeping the issued count.
    /// Returns `None` when the book is missing or `total_copies` is below
    /// the number of copies currently issued.
    async fn books_update(
        &self,
        isbn: &str,
        library_id: i32,
        total_copies: i32,
        metadata: &BookMetadata,
    ) -> AppResult<Option<Book>>;

    /// Remove one copy from the shelf, deleting the book with its last copy.
    /// Fails with `Validation` when every copy is issued.
    async fn books_remove_copy(&self, isbn: &str, library_id: i32) -> AppResult<Option<RemovedCopy>>;

    /// Books of the given libraries passing every filter, by title
    async fn books_search(&self, library_ids: &[i32], query: &BookQuery) -> AppResult<Vec<Book>>;
}

/// Issue requests and issue records
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Create a Pending request. A Pending request of the same type by the
    /// same reader for the same book and library fails with `Conflict`.
    async fn requests_create(&self, request: &NewIssueRequest) -> AppResult<IssueRequest>;

    async fn requests_get(&self, id: i32) -> AppResult<Option<IssueRequest>>;

    async fn requests_find_pending(
        &self,
        reader_id: i32,
        isbn: &str,
        library_id: i32,
        request_type: RequestType,
    ) -> AppResult<Option<IssueRequest>>;

    /// Apply the decision only if the request is still `Pending`
    async fn requests_decide(&self, id: i32, decision: RequestDecision) -> AppResult<Option<IssueRequest>>;

    /// Newest first
    async fn requests_for_libraries(&self, library_ids: &[i32]) -> AppResult<Vec<IssueRequest>>;

    /// Newest first
    async fn requests_for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRequest>>;

    /// The reader's unreturned record for this ISBN, if any
    async fn records_find_open(&self, isbn: &str, reader_id: i32) -> AppResult<Option<IssueRecord>>;

    /// Earliest expected return among unreturned copies of the book
    async fn records_next_return(&self, isbn: &str, library_id: i32) -> AppResult<Option<DateTime<Utc>>>;

    /// Newest first
    async fn records_for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRecord>>;

    /// Hand over one copy as a single unit: decrement availability
    /// (`Validation` when none is left), refuse a second open record for the
    /// same reader and ISBN (`Conflict`), insert the record and mark the
    /// reader's outstanding issue requests `Issued`.
    async fn issue_copy(&self, record: &NewIssueRecord) -> AppResult<IssueRecord>;

    /// Take back one copy as a single unit: close the open record
    /// (`NotFound` when there is none), put the copy back on the shelf and
    /// approve the reader's pending return requests.
    async fn return_copy(&self, copy: &CopyReturn) -> AppResult<IssueRecord>;
}

/// Everything the services need from storage
#[async_trait]
pub trait Store: LibraryStore + UserStore + BookStore + IssueStore {
    /// Check the backing storage is reachable
    async fn ping(&self) -> AppResult<()>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for Repository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
