//! In-process store
//!
//! Holds all tables behind a single async mutex, so every trait method is
//! atomic. Methods check all their preconditions before writing anything.
//! Selected with `database.url = "memory://"` and used by the test suite.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BookStore, IssueStore, LibraryStore, Store, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookMetadata, BookQuery, RemovedCopy},
        issue::{
            CopyReturn, IssueRecord, IssueRequest, IssueStatus, NewIssueRecord, NewIssueRequest,
            RequestDecision, RequestStatus, RequestType,
        },
        library::Library,
        user::{NewUser, Role, User},
    },
};

#[derive(Default)]
struct Tables {
    libraries: BTreeMap<i32, Library>,
    users: BTreeMap<i32, User>,
    memberships: BTreeSet<(i32, i32)>,
    books: BTreeMap<(String, i32), Book>,
    requests: BTreeMap<i32, IssueRequest>,
    records: BTreeMap<i32, IssueRecord>,
    next_library_id: i32,
    next_user_id: i32,
    next_request_id: i32,
    next_record_id: i32,
}

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

fn book_key(isbn: &str, library_id: i32) -> (String, i32) {
    (isbn.to_string(), library_id)
}

/// Newest first, ties broken by id
fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

impl Tables {
    fn open_record(&self, isbn: &str, reader_id: i32) -> Option<&IssueRecord> {
        self.records
            .values()
            .find(|r| r.isbn == isbn && r.reader_id == reader_id && r.is_open())
    }
}

/// Store keeping every table in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn libraries_create(&self, name: &str, location: &str) -> AppResult<Library> {
        let mut tables = self.tables.lock().await;
        let library = Library {
            id: next_id(&mut tables.next_library_id),
            name: name.to_string(),
            location: location.to_string(),
        };
        tables.libraries.insert(library.id, library.clone());
        Ok(library)
    }

    async fn libraries_list(&self) -> AppResult<Vec<Library>> {
        let tables = self.tables.lock().await;
        let mut libraries: Vec<Library> = tables.libraries.values().cloned().collect();
        libraries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(libraries)
    }

    async fn libraries_get(&self, id: i32) -> AppResult<Option<Library>> {
        Ok(self.tables.lock().await.libraries.get(&id).cloned())
    }

    async fn memberships_exists(&self, user_id: i32, library_id: i32) -> AppResult<bool> {
        Ok(self.tables.lock().await.memberships.contains(&(user_id, library_id)))
    }

    async fn memberships_library_ids(&self, user_id: i32) -> AppResult<Vec<i32>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .memberships
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, library)| *library)
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn users_get(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn users_get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email.to_lowercase())
            .cloned())
    }

    async fn users_any_with_role(&self, role: Role) -> AppResult<bool> {
        Ok(self.tables.lock().await.users.values().any(|u| u.role == role))
    }

    async fn users_create(&self, user: &NewUser, library_ids: &[i32]) -> AppResult<User> {
        let mut tables = self.tables.lock().await;

        let email = user.email.to_lowercase();
        if tables.users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        if let Some(missing) = library_ids.iter().find(|id| !tables.libraries.contains_key(*id)) {
            return Err(AppError::NotFound(format!("Library {} not found", missing)));
        }

        let created = User {
            id: next_id(&mut tables.next_user_id),
            name: user.name.clone(),
            email: user.email.clone(),
            password: user.password_hash.clone(),
            contact: user.contact.clone(),
            role: user.role,
        };
        tables.users.insert(created.id, created.clone());
        for library_id in library_ids {
            tables.memberships.insert((created.id, *library_id));
        }
        Ok(created)
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn books_get(&self, isbn: &str, library_id: i32) -> AppResult<Option<Book>> {
        Ok(self.tables.lock().await.books.get(&book_key(isbn, library_id)).cloned())
    }

    async fn books_create(&self, book: &Book) -> AppResult<Book> {
        let mut tables = self.tables.lock().await;
        let key = book_key(&book.isbn, book.library_id);
        if tables.books.contains_key(&key) {
            return Err(AppError::Conflict("Book already exists in this library".to_string()));
        }
        if !tables.libraries.contains_key(&book.library_id) {
            return Err(AppError::NotFound(format!("Library {} not found", book.library_id)));
        }
        tables.books.insert(key, book.clone());
        Ok(book.clone())
    }

    async fn books_restock(&self, isbn: &str, library_id: i32, delta: i32) -> AppResult<Option<Book>> {
        let mut tables = self.tables.lock().await;
        let Some(book) = tables.books.get_mut(&book_key(isbn, library_id)) else {
            return Ok(None);
        };

        let (Some(total), Some(available)) = (
            book.total_copies.checked_add(delta),
            book.available_copies.checked_add(delta),
        ) else {
            return Err(AppError::Validation("Too many copies for one book".to_string()));
        };
        book.total_copies = total;
        book.available_copies = available;
        Ok(Some(book.clone()))
    }

    async fn books_update(
        &self,
        isbn: &str,
        library_id: i32,
        total_copies: i32,
        metadata: &BookMetadata,
    ) -> AppResult<Option<Book>> {
        let mut tables = self.tables.lock().await;
        let Some(book) = tables.books.get_mut(&book_key(isbn, library_id)) else {
            return Ok(None);
        };

        let issued = book.issued_copies();
        if total_copies < issued {
            return Ok(None);
        }

        book.title = metadata.title.clone();
        book.authors = metadata.authors.clone();
        book.publisher = metadata.publisher.clone();
        book.version = metadata.version.clone();
        book.total_copies = total_copies;
        book.available_copies = total_copies - issued;
        Ok(Some(book.clone()))
    }

    async fn books_remove_copy(&self, isbn: &str, library_id: i32) -> AppResult<Option<RemovedCopy>> {
        let mut tables = self.tables.lock().await;
        let key = book_key(isbn, library_id);
        let Some(book) = tables.books.get_mut(&key) else {
            return Ok(None);
        };

        let outcome = if book.available_copies == 0 {
            return Err(AppError::Validation(
                "Every copy of this book is currently issued".to_string(),
            ));
        } else if book.total_copies > 1 {
            book.total_copies -= 1;
            book.available_copies -= 1;
            RemovedCopy::Decremented(book.clone())
        } else {
            tables.books.remove(&key);
            RemovedCopy::Deleted
        };
        Ok(Some(outcome))
    }

    async fn books_search(&self, library_ids: &[i32], query: &BookQuery) -> AppResult<Vec<Book>> {
        let tables = self.tables.lock().await;
        let mut books: Vec<Book> = tables
            .books
            .values()
            .filter(|b| library_ids.contains(&b.library_id) && query.matches(b))
            .cloned()
            .collect();
        books.sort_by(|a, b| {
            a.title
                .cmp(&b.title)
                .then_with(|| a.isbn.cmp(&b.isbn))
                .then(a.library_id.cmp(&b.library_id))
        });
        Ok(books)
    }
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn requests_create(&self, request: &NewIssueRequest) -> AppResult<IssueRequest> {
        let mut tables = self.tables.lock().await;
        if tables.requests.values().any(|r| {
            r.reader_id == request.reader_id
                && r.book_id == request.book_id
                && r.library_id == request.library_id
                && r.request_type == request.request_type
                && r.status == RequestStatus::Pending
        }) {
            return Err(AppError::Conflict(
                "A pending request for this book already exists".to_string(),
            ));
        }

        let created = IssueRequest {
            id: next_id(&mut tables.next_request_id),
            book_id: request.book_id.clone(),
            library_id: request.library_id,
            reader_id: request.reader_id,
            request_date: request.request_date,
            approval_date: None,
            approver_id: None,
            request_type: request.request_type,
            status: RequestStatus::Pending,
        };
        tables.requests.insert(created.id, created.clone());
        Ok(created)
    }

    async fn requests_get(&self, id: i32) -> AppResult<Option<IssueRequest>> {
        Ok(self.tables.lock().await.requests.get(&id).cloned())
    }

    async fn requests_find_pending(
        &self,
        reader_id: i32,
        isbn: &str,
        library_id: i32,
        request_type: RequestType,
    ) -> AppResult<Option<IssueRequest>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .requests
            .values()
            .find(|r| {
                r.reader_id == reader_id
                    && r.book_id == isbn
                    && r.library_id == library_id
                    && r.request_type == request_type
                    && r.status == RequestStatus::Pending
            })
            .cloned())
    }

    async fn requests_decide(&self, id: i32, decision: RequestDecision) -> AppResult<Option<IssueRequest>> {
        let mut tables = self.tables.lock().await;
        let Some(request) = tables
            .requests
            .get_mut(&id)
            .filter(|r| r.status == RequestStatus::Pending)
        else {
            return Ok(None);
        };

        match decision {
            RequestDecision::Approve { approver_id, at } => {
                request.status = RequestStatus::Approved;
                request.approver_id = Some(approver_id);
                request.approval_date = Some(at);
            }
            RequestDecision::Disapprove { approver_id } => {
                request.status = RequestStatus::Disapproved;
                request.approver_id = Some(approver_id);
            }
        }
        Ok(Some(request.clone()))
    }

    async fn requests_for_libraries(&self, library_ids: &[i32]) -> AppResult<Vec<IssueRequest>> {
        let tables = self.tables.lock().await;
        let mut requests: Vec<IssueRequest> = tables
            .requests
            .values()
            .filter(|r| library_ids.contains(&r.library_id))
            .cloned()
            .collect();
        newest_first(&mut requests, |r| (r.request_date, r.id));
        Ok(requests)
    }

    async fn requests_for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRequest>> {
        let tables = self.tables.lock().await;
        let mut requests: Vec<IssueRequest> = tables
            .requests
            .values()
            .filter(|r| r.reader_id == reader_id)
            .cloned()
            .collect();
        newest_first(&mut requests, |r| (r.request_date, r.id));
        Ok(requests)
    }

    async fn records_find_open(&self, isbn: &str, reader_id: i32) -> AppResult<Option<IssueRecord>> {
        Ok(self.tables.lock().await.open_record(isbn, reader_id).cloned())
    }

    async fn records_next_return(&self, isbn: &str, library_id: i32) -> AppResult<Option<DateTime<Utc>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .records
            .values()
            .filter(|r| r.isbn == isbn && r.library_id == library_id && r.is_open())
            .map(|r| r.expected_return_date)
            .min())
    }

    async fn records_for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<IssueRecord> = tables
            .records
            .values()
            .filter(|r| r.reader_id == reader_id)
            .cloned()
            .collect();
        newest_first(&mut records, |r| (r.issue_date, r.id));
        Ok(records)
    }

    async fn issue_copy(&self, record: &NewIssueRecord) -> AppResult<IssueRecord> {
        let mut tables = self.tables.lock().await;
        let key = book_key(&record.isbn, record.library_id);

        match tables.books.get(&key) {
            Some(book) if book.available_copies > 0 => {}
            _ => return Err(AppError::Validation("No available copies to issue".to_string())),
        }
        if tables.open_record(&record.isbn, record.reader_id).is_some() {
            return Err(AppError::Conflict(
                "This book is already issued to this reader".to_string(),
            ));
        }

        if let Some(book) = tables.books.get_mut(&key) {
            book.available_copies -= 1;
        }

        let created = IssueRecord {
            id: next_id(&mut tables.next_record_id),
            isbn: record.isbn.clone(),
            library_id: record.library_id,
            reader_id: record.reader_id,
            issue_approver_id: record.issue_approver_id,
            issue_status: IssueStatus::Issued,
            issue_date: record.issue_date,
            expected_return_date: record.expected_return_date,
            return_date: None,
            return_approver_id: None,
        };
        tables.records.insert(created.id, created.clone());

        for request in tables.requests.values_mut().filter(|r| {
            r.reader_id == record.reader_id
                && r.book_id == record.isbn
                && r.library_id == record.library_id
                && r.request_type == RequestType::Issue
                && matches!(r.status, RequestStatus::Pending | RequestStatus::Approved)
        }) {
            request.status = RequestStatus::Issued;
        }

        Ok(created)
    }

    async fn return_copy(&self, copy: &CopyReturn) -> AppResult<IssueRecord> {
        let mut tables = self.tables.lock().await;

        let record = tables
            .records
            .values_mut()
            .find(|r| {
                r.isbn == copy.isbn
                    && r.library_id == copy.library_id
                    && r.reader_id == copy.reader_id
                    && r.is_open()
            })
            .ok_or_else(|| {
                AppError::NotFound("No open issue of this book for this reader".to_string())
            })?;

        record.return_date = Some(copy.return_date);
        record.return_approver_id = Some(copy.return_approver_id);
        record.issue_status = IssueStatus::Returned;
        let closed = record.clone();

        match tables.books.get_mut(&book_key(&copy.isbn, copy.library_id)) {
            Some(book) if book.available_copies < book.total_copies => {
                book.available_copies += 1;
            }
            _ => tracing::warn!(
                "Returned copy of {} in library {} had no slot to go back to",
                copy.isbn,
                copy.library_id
            ),
        }

        for request in tables.requests.values_mut().filter(|r| {
            r.reader_id == copy.reader_id
                && r.book_id == copy.isbn
                && r.library_id == copy.library_id
                && r.request_type == RequestType::Return
                && r.status == RequestStatus::Pending
        }) {
            request.status = RequestStatus::Approved;
            request.approval_date = Some(copy.return_date);
            request.approver_id = Some(copy.return_approver_id);
        }

        Ok(closed)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
