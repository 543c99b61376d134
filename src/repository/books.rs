//! Book inventory on PostgreSQL

use async_trait::async_trait;

use super::{BookStore, Repository};
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookMetadata, BookQuery, RemovedCopy},
};

#[async_trait]
impl BookStore for Repository {
    async fn books_get(&self, isbn: &str, library_id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE isbn = $1 AND library_id = $2")
            .bind(isbn)
            .bind(library_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn books_create(&self, book: &Book) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                isbn, library_id, title, authors, publisher, version,
                total_copies, available_copies
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&book.isbn)
        .bind(book.library_id)
        .bind(&book.title)
        .bind(&book.authors)
        .bind(&book.publisher)
        .bind(&book.version)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn books_restock(&self, isbn: &str, library_id: i32, delta: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET total_copies = total_copies + $3,
                available_copies = available_copies + $3
            WHERE isbn = $1 AND library_id = $2
            RETURNING *
            "#,
        )
        .bind(isbn)
        .bind(library_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn books_update(
        &self,
        isbn: &str,
        library_id: i32,
        total_copies: i32,
        metadata: &BookMetadata,
    ) -> AppResult<Option<Book>> {
        // Right-hand sides see the row as it was before the update
        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET title = $4,
                authors = $5,
                publisher = $6,
                version = $7,
                available_copies = $3 - (total_copies - available_copies),
                total_copies = $3
            WHERE isbn = $1
              AND library_id = $2
              AND $3 >= total_copies - available_copies
            RETURNING *
            "#,
        )
        .bind(isbn)
        .bind(library_id)
        .bind(total_copies)
        .bind(&metadata.title)
        .bind(&metadata.authors)
        .bind(&metadata.publisher)
        .bind(&metadata.version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn books_remove_copy(&self, isbn: &str, library_id: i32) -> AppResult<Option<RemovedCopy>> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE isbn = $1 AND library_id = $2 FOR UPDATE",
        )
        .bind(isbn)
        .bind(library_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(book) = book else {
            return Ok(None);
        };

        let outcome = if book.available_copies == 0 {
            return Err(AppError::Validation(
                "Every copy of this book is currently issued".to_string(),
            ));
        } else if book.total_copies > 1 {
            let updated = sqlx::query_as::<_, Book>(
                r#"
                UPDATE books
                SET total_copies = total_copies - 1,
                    available_copies = available_copies - 1
                WHERE isbn = $1 AND library_id = $2
                RETURNING *
                "#,
            )
            .bind(isbn)
            .bind(library_id)
            .fetch_one(&mut *tx)
            .await?;
            RemovedCopy::Decremented(updated)
        } else {
            sqlx::query("DELETE FROM books WHERE isbn = $1 AND library_id = $2")
                .bind(isbn)
                .bind(library_id)
                .execute(&mut *tx)
                .await?;
            RemovedCopy::Deleted
        };

        tx.commit().await?;
        Ok(Some(outcome))
    }

    async fn books_search(&self, library_ids: &[i32], query: &BookQuery) -> AppResult<Vec<Book>> {
        let [title, author, publisher] = query.like_patterns();

        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE library_id = ANY($1)
              AND ($2::text IS NULL OR title ILIKE $2)
              AND ($3::text IS NULL OR authors ILIKE $3)
              AND ($4::text IS NULL OR publisher ILIKE $4)
            ORDER BY title, isbn, library_id
            "#,
        )
        .bind(library_ids)
        .bind(title)
        .bind(author)
        .bind(publisher)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }
}
