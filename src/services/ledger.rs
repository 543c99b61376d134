//! Lending ledger: book copy accounting and the request → issue → return pipeline
//!
//! Every operation takes the authenticated caller and fails fast on the
//! first unmet precondition. Copy counts only move through atomic store
//! methods, so `0 <= available_copies <= total_copies` holds under
//! concurrent requests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use validator::Validate;

use super::access::AccessControl;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, BookSearchResult, CreateBook, NextAvailable, RemovedCopy, UpdateBook},
        issue::{
            CopyReturn, CreateIssueRequest, IssueRecord, IssueRequest, NewIssueRecord,
            NewIssueRequest, ReaderCopy, RequestDecision, RequestStatus, RequestType,
        },
        user::{Principal, Role},
    },
    repository::Store,
};

/// Result of adding books to a library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stocked {
    Created(Book),
    Restocked(Book),
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
    access: AccessControl,
    loan_period: Duration,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>, access: AccessControl, loan_period_days: i64) -> Self {
        Self {
            store,
            access,
            loan_period: Duration::days(loan_period_days),
        }
    }

    // ---------------------------------------------------------------------
    // Inventory
    // ---------------------------------------------------------------------

    /// Add a new book, or add copies to the one already in the library
    pub async fn add_or_restock_book(&self, principal: &Principal, input: CreateBook) -> AppResult<Stocked> {
        self.access.require_library_admin(principal, input.library_id).await?;
        input.validate()?;

        if input.total_copies <= 0 {
            return Err(AppError::Validation(
                "Number of copies must be greater than zero".to_string(),
            ));
        }

        if let Some(book) = self
            .store
            .books_restock(&input.isbn, input.library_id, input.total_copies)
            .await?
        {
            tracing::info!(
                "Restocked {} in library {}: {} total, {} available",
                book.isbn,
                book.library_id,
                book.total_copies,
                book.available_copies
            );
            return Ok(Stocked::Restocked(book));
        }

        let new_book = Book {
            isbn: input.isbn.clone(),
            library_id: input.library_id,
            title: input.metadata.title,
            authors: input.metadata.authors,
            publisher: input.metadata.publisher,
            version: input.metadata.version,
            total_copies: input.total_copies,
            available_copies: input.total_copies,
        };

        match self.store.books_create(&new_book).await {
            Ok(book) => {
                tracing::info!(
                    "Added {} to library {} with {} copies",
                    book.isbn,
                    book.library_id,
                    book.total_copies
                );
                Ok(Stocked::Created(book))
            }
            // Created concurrently between the restock attempt and the insert
            Err(AppError::Conflict(_)) => self
                .store
                .books_restock(&input.isbn, input.library_id, input.total_copies)
                .await?
                .map(Stocked::Restocked)
                .ok_or_else(|| AppError::Internal("Book vanished while restocking".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Overwrite metadata and set the total copy count, keeping issued copies out
    pub async fn update_book(&self, principal: &Principal, isbn: &str, input: UpdateBook) -> AppResult<Book> {
        self.access.require_library_admin(principal, input.library_id).await?;

        let book = self
            .store
            .books_get(isbn, input.library_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found in the specified library".to_string()))?;

        if input.total_copies < 0 {
            return Err(AppError::Validation("Total copies cannot be negative".to_string()));
        }

        let issued = book.issued_copies();
        if input.total_copies < issued {
            return Err(AppError::Validation(format!(
                "Total copies cannot be less than issued copies ({})",
                issued
            )));
        }

        let updated = self
            .store
            .books_update(isbn, input.library_id, input.total_copies, &input.metadata)
            .await?
            // Copies were issued between the read and the update
            .ok_or_else(|| {
                AppError::Validation("Total copies cannot be less than issued copies".to_string())
            })?;

        tracing::info!(
            "Updated {} in library {}: {} total, {} available",
            updated.isbn,
            updated.library_id,
            updated.total_copies,
            updated.available_copies
        );
        Ok(updated)
    }

    /// Remove one physical copy; the book goes away with its last copy
    pub async fn remove_book(&self, principal: &Principal, isbn: &str, library_id: i32) -> AppResult<RemovedCopy> {
        self.access.require_library_admin(principal, library_id).await?;

        let outcome = self
            .store
            .books_remove_copy(isbn, library_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found in the specified library".to_string()))?;

        match &outcome {
            RemovedCopy::Decremented(book) => tracing::info!(
                "Removed one copy of {} from library {}: {} left",
                isbn,
                library_id,
                book.total_copies
            ),
            RemovedCopy::Deleted => {
                tracing::info!("Removed {} from library {}", isbn, library_id)
            }
        }
        Ok(outcome)
    }

    /// Books in the caller's libraries matching every filter. Unavailable
    /// books carry the earliest expected return date, or "Unknown".
    pub async fn search_books(&self, principal: &Principal, query: &BookQuery) -> AppResult<Vec<BookSearchResult>> {
        principal.require_role(Role::User)?;

        let library_ids = self.access.member_libraries(principal).await?;
        if library_ids.is_empty() {
            return Ok(Vec::new());
        }

        let books = self.store.books_search(&library_ids, query).await?;

        let mut results = Vec::with_capacity(books.len());
        for book in books {
            let next_available = if book.available_copies == 0 {
                let next = self.store.records_next_return(&book.isbn, book.library_id).await?;
                Some(next.map(NextAvailable::Expected).unwrap_or(NextAvailable::Unknown))
            } else {
                None
            };
            results.push(BookSearchResult::new(book, next_available));
        }
        Ok(results)
    }

    // ---------------------------------------------------------------------
    // Requests
    // ---------------------------------------------------------------------

    /// Ask to borrow a book
    pub async fn request_issue(&self, principal: &Principal, input: CreateIssueRequest) -> AppResult<IssueRequest> {
        principal.require_role(Role::User)?;
        input.validate()?;

        let book = self
            .store
            .books_get(&input.isbn, input.library_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found in the specified library".to_string()))?;

        if book.available_copies == 0 {
            return Err(AppError::Validation("Book not available for issue".to_string()));
        }

        self.access.require_library_member(principal, input.library_id).await?;

        if self
            .store
            .requests_find_pending(principal.user_id, &input.isbn, input.library_id, RequestType::Issue)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "You already have a pending request for this book in this library".to_string(),
            ));
        }

        let request = self
            .store
            .requests_create(&NewIssueRequest {
                book_id: input.isbn,
                library_id: input.library_id,
                reader_id: principal.user_id,
                request_date: Utc::now(),
                request_type: RequestType::Issue,
            })
            .await?;

        tracing::info!(
            "Reader {} requested {} from library {} (request {})",
            request.reader_id,
            request.book_id,
            request.library_id,
            request.id
        );
        Ok(request)
    }

    /// Announce that a borrowed copy is being brought back
    pub async fn request_return(&self, principal: &Principal, input: CreateIssueRequest) -> AppResult<IssueRequest> {
        principal.require_role(Role::User)?;
        input.validate()?;

        self.store
            .records_find_open(&input.isbn, principal.user_id)
            .await?
            .filter(|record| record.library_id == input.library_id)
            .ok_or_else(|| {
                AppError::NotFound("You have no open issue of this book in this library".to_string())
            })?;

        if self
            .store
            .requests_find_pending(principal.user_id, &input.isbn, input.library_id, RequestType::Return)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "You already have a pending return for this book".to_string(),
            ));
        }

        let request = self
            .store
            .requests_create(&NewIssueRequest {
                book_id: input.isbn,
                library_id: input.library_id,
                reader_id: principal.user_id,
                request_date: Utc::now(),
                request_type: RequestType::Return,
            })
            .await?;

        tracing::info!(
            "Reader {} announced return of {} to library {} (request {})",
            request.reader_id,
            request.book_id,
            request.library_id,
            request.id
        );
        Ok(request)
    }

    /// Approve a pending request. Copies are only handed over by `issue_book_to_user`.
    pub async fn approve_issue(&self, principal: &Principal, request_id: i32) -> AppResult<IssueRequest> {
        let decision = RequestDecision::Approve {
            approver_id: principal.user_id,
            at: Utc::now(),
        };
        let request = self.decide(principal, request_id, decision).await?;
        tracing::info!("Admin {} approved request {}", principal.user_id, request.id);
        Ok(request)
    }

    /// Disapprove a pending request; the request is kept for audit
    pub async fn disapprove_issue(&self, principal: &Principal, request_id: i32) -> AppResult<IssueRequest> {
        let decision = RequestDecision::Disapprove {
            approver_id: principal.user_id,
        };
        let request = self.decide(principal, request_id, decision).await?;
        tracing::info!("Admin {} disapproved request {}", principal.user_id, request.id);
        Ok(request)
    }

    async fn decide(&self, principal: &Principal, request_id: i32, decision: RequestDecision) -> AppResult<IssueRequest> {
        principal.require_role(Role::Admin)?;

        let request = self
            .store
            .requests_get(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Issue request not found".to_string()))?;

        if request.status != RequestStatus::Pending {
            return Err(AppError::Validation(format!(
                "Request is already processed ({})",
                request.status
            )));
        }

        self.access.require_library_admin(principal, request.library_id).await?;

        self.store
            .requests_decide(request_id, decision)
            .await?
            // Another admin decided first
            .ok_or_else(|| AppError::Validation("Request is already processed".to_string()))
    }

    /// Requests for every library the admin manages, newest first
    pub async fn list_issue_requests(&self, principal: &Principal) -> AppResult<Vec<IssueRequest>> {
        principal.require_role(Role::Admin)?;

        let library_ids = self.access.member_libraries(principal).await?;
        if library_ids.is_empty() {
            return Err(AppError::Authorization(
                "Admin is not associated with any library".to_string(),
            ));
        }

        self.store.requests_for_libraries(&library_ids).await
    }

    /// The caller's own requests, newest first
    pub async fn status_issue(&self, principal: &Principal) -> AppResult<Vec<IssueRequest>> {
        principal.require_role(Role::User)?;
        self.store.requests_for_reader(principal.user_id).await
    }

    // ---------------------------------------------------------------------
    // Physical hand-over
    // ---------------------------------------------------------------------

    /// Hand one copy to a reader
    pub async fn issue_book_to_user(&self, principal: &Principal, isbn: &str, input: ReaderCopy) -> AppResult<IssueRecord> {
        self.access.require_library_admin(principal, input.library_id).await?;

        self.store
            .users_get(input.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reader {} not found", input.user_id)))?;

        let book = self
            .store
            .books_get(isbn, input.library_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found in this library".to_string()))?;

        if book.available_copies == 0 {
            return Err(AppError::Validation("No available copies to issue".to_string()));
        }

        if self.store.records_find_open(isbn, input.user_id).await?.is_some() {
            return Err(AppError::Conflict(
                "This book is already issued to this reader".to_string(),
            ));
        }

        let issue_date = Utc::now();
        let record = self
            .store
            .issue_copy(&NewIssueRecord {
                isbn: isbn.to_string(),
                library_id: input.library_id,
                reader_id: input.user_id,
                issue_approver_id: principal.user_id,
                issue_date,
                expected_return_date: issue_date + self.loan_period,
            })
            .await?;

        tracing::info!(
            "Issued {} from library {} to reader {}, due {}",
            record.isbn,
            record.library_id,
            record.reader_id,
            record.expected_return_date
        );
        Ok(record)
    }

    /// Take a copy back from a reader
    pub async fn return_book(&self, principal: &Principal, isbn: &str, input: ReaderCopy) -> AppResult<IssueRecord> {
        self.access.require_library_admin(principal, input.library_id).await?;

        let record = self
            .store
            .return_copy(&CopyReturn {
                isbn: isbn.to_string(),
                library_id: input.library_id,
                reader_id: input.user_id,
                return_approver_id: principal.user_id,
                return_date: Utc::now(),
            })
            .await?;

        tracing::info!(
            "Reader {} returned {} to library {}",
            record.reader_id,
            record.isbn,
            record.library_id
        );
        Ok(record)
    }

    /// The caller's issue records, newest first
    pub async fn my_issues(&self, principal: &Principal) -> AppResult<Vec<IssueRecord>> {
        principal.require_role(Role::User)?;
        self.store.records_for_reader(principal.user_id).await
    }
}
