//! Book model and search types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Book held by one library. Keyed by `(isbn, library_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub isbn: String,
    pub library_id: i32,
    pub title: String,
    pub authors: String,
    pub publisher: String,
    pub version: String,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl Book {
    /// Copies currently out with readers
    pub fn issued_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }
}

/// Title, authors, publisher and version of a book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookMetadata {
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub version: String,
}

/// Add a book, or restock it when it already exists in the library
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    pub library_id: i32,
    /// New copies; must be greater than zero
    pub total_copies: i32,
    #[serde(flatten)]
    pub metadata: BookMetadata,
}

/// Replace a book's metadata and total copy count
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateBook {
    pub library_id: i32,
    pub total_copies: i32,
    #[serde(flatten)]
    pub metadata: BookMetadata,
}

/// Outcome of removing one copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedCopy {
    Decremented(Book),
    Deleted,
}

/// Search filters; each present filter is a case-insensitive substring match
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
}

impl BookQuery {
    fn matches_field(filter: &Option<String>, value: &str) -> bool {
        match filter.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => value.to_lowercase().contains(&needle.to_lowercase()),
        }
    }

    /// True when the book passes every present filter
    pub fn matches(&self, book: &Book) -> bool {
        Self::matches_field(&self.title, &book.title)
            && Self::matches_field(&self.author, &book.authors)
            && Self::matches_field(&self.publisher, &book.publisher)
    }

    /// Non-empty filters as SQL `ILIKE` patterns: title, author, publisher
    pub fn like_patterns(&self) -> [Option<String>; 3] {
        let pattern = |f: &Option<String>| {
            f.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("%{}%", escape_like(s)))
        };
        [
            pattern(&self.title),
            pattern(&self.author),
            pattern(&self.publisher),
        ]
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// When an unavailable book is expected back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAvailable {
    Expected(DateTime<Utc>),
    Unknown,
}

impl Serialize for NextAvailable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NextAvailable::Expected(date) => date.serialize(serializer),
            NextAvailable::Unknown => serializer.serialize_str("Unknown"),
        }
    }
}

/// Search hit
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookSearchResult {
    pub isbn: String,
    pub title: String,
    /// Authors, or "Unknown" when not recorded
    pub author: String,
    pub publisher: String,
    pub available_copies: i32,
    pub library_id: i32,
    /// Only present when no copy is available: a date, or "Unknown"
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub next_available_date: Option<NextAvailable>,
}

impl BookSearchResult {
    pub fn new(book: Book, next_available_date: Option<NextAvailable>) -> Self {
        let author = if book.authors.trim().is_empty() {
            "Unknown".to_string()
        } else {
            book.authors
        };
        Self {
            isbn: book.isbn,
            title: book.title,
            author,
            publisher: book.publisher,
            available_copies: book.available_copies,
            library_id: book.library_id,
            next_available_date,
        }
    }
}
