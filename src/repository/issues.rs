//! Issue requests and issue records on PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{IssueStore, Repository};
use crate::{
    error::{AppError, AppResult},
    models::issue::{
        CopyReturn, IssueRecord, IssueRequest, IssueStatus, NewIssueRecord, NewIssueRequest,
        RequestDecision, RequestStatus, RequestType,
    },
};

#[async_trait]
impl IssueStore for Repository {
    async fn requests_create(&self, request: &NewIssueRequest) -> AppResult<IssueRequest> {
        let created = sqlx::query_as::<_, IssueRequest>(
            r#"
            INSERT INTO request_events (
                book_id, library_id, reader_id, request_date, request_type, status
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&request.book_id)
        .bind(request.library_id)
        .bind(request.reader_id)
        .bind(request.request_date)
        .bind(request.request_type)
        .bind(RequestStatus::Pending)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn requests_get(&self, id: i32) -> AppResult<Option<IssueRequest>> {
        let request = sqlx::query_as::<_, IssueRequest>("SELECT * FROM request_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(request)
    }

    async fn requests_find_pending(
        &self,
        reader_id: i32,
        isbn: &str,
        library_id: i32,
        request_type: RequestType,
    ) -> AppResult<Option<IssueRequest>> {
        let request = sqlx::query_as::<_, IssueRequest>(
            r#"
            SELECT * FROM request_events
            WHERE reader_id = $1 AND book_id = $2 AND library_id = $3
              AND request_type = $4 AND status = $5
            LIMIT 1
            "#,
        )
        .bind(reader_id)
        .bind(isbn)
        .bind(library_id)
        .bind(request_type)
        .bind(RequestStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn requests_decide(&self, id: i32, decision: RequestDecision) -> AppResult<Option<IssueRequest>> {
        let (status, approver_id, approval_date) = match decision {
            RequestDecision::Approve { approver_id, at } => {
                (RequestStatus::Approved, approver_id, Some(at))
            }
            RequestDecision::Disapprove { approver_id } => {
                (RequestStatus::Disapproved, approver_id, None)
            }
        };

        let request = sqlx::query_as::<_, IssueRequest>(
            r#"
            UPDATE request_events
            SET status = $2, approver_id = $3, approval_date = $4
            WHERE id = $1 AND status = $5
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(approver_id)
        .bind(approval_date)
        .bind(RequestStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn requests_for_libraries(&self, library_ids: &[i32]) -> AppResult<Vec<IssueRequest>> {
        let requests = sqlx::query_as::<_, IssueRequest>(
            r#"
            SELECT * FROM request_events
            WHERE library_id = ANY($1)
            ORDER BY request_date DESC, id DESC
            "#,
        )
        .bind(library_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn requests_for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRequest>> {
        let requests = sqlx::query_as::<_, IssueRequest>(
            r#"
            SELECT * FROM request_events
            WHERE reader_id = $1
            ORDER BY request_date DESC, id DESC
            "#,
        )
        .bind(reader_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn records_find_open(&self, isbn: &str, reader_id: i32) -> AppResult<Option<IssueRecord>> {
        let record = sqlx::query_as::<_, IssueRecord>(
            r#"
            SELECT * FROM issue_registries
            WHERE isbn = $1 AND reader_id = $2 AND return_date IS NULL
            "#,
        )
        .bind(isbn)
        .bind(reader_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn records_next_return(&self, isbn: &str, library_id: i32) -> AppResult<Option<DateTime<Utc>>> {
        let next: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MIN(expected_return_date) FROM issue_registries
            WHERE isbn = $1 AND library_id = $2 AND return_date IS NULL
            "#,
        )
        .bind(isbn)
        .bind(library_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(next)
    }

    async fn records_for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRecord>> {
        let records = sqlx::query_as::<_, IssueRecord>(
            r#"
            SELECT * FROM issue_registries
            WHERE reader_id = $1
            ORDER BY issue_date DESC, id DESC
            "#,
        )
        .bind(reader_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn issue_copy(&self, record: &NewIssueRecord) -> AppResult<IssueRecord> {
        // Dropping `tx` before commit rolls every step back
        let mut tx = self.pool.begin().await?;

        let decremented = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1
            WHERE isbn = $1 AND library_id = $2 AND available_copies > 0
            "#,
        )
        .bind(&record.isbn)
        .bind(record.library_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if decremented == 0 {
            return Err(AppError::Validation("No available copies to issue".to_string()));
        }

        let already_issued: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM issue_registries
                WHERE isbn = $1 AND reader_id = $2 AND return_date IS NULL
            )
            "#,
        )
        .bind(&record.isbn)
        .bind(record.reader_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_issued {
            return Err(AppError::Conflict(
                "This book is already issued to this reader".to_string(),
            ));
        }

        let created = sqlx::query_as::<_, IssueRecord>(
            r#"
            INSERT INTO issue_registries (
                isbn, library_id, reader_id, issue_approver_id, issue_status,
                issue_date, expected_return_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&record.isbn)
        .bind(record.library_id)
        .bind(record.reader_id)
        .bind(record.issue_approver_id)
        .bind(IssueStatus::Issued)
        .bind(record.issue_date)
        .bind(record.expected_return_date)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE request_events
            SET status = $5
            WHERE reader_id = $1 AND book_id = $2 AND library_id = $3
              AND request_type = $4 AND status IN ('Pending', 'Approved')
            "#,
        )
        .bind(record.reader_id)
        .bind(&record.isbn)
        .bind(record.library_id)
        .bind(RequestType::Issue)
        .bind(RequestStatus::Issued)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn return_copy(&self, copy: &CopyReturn) -> AppResult<IssueRecord> {
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query_as::<_, IssueRecord>(
            r#"
            UPDATE issue_registries
            SET return_date = $4, return_approver_id = $5, issue_status = $6
            WHERE isbn = $1 AND library_id = $2 AND reader_id = $3 AND return_date IS NULL
            RETURNING *
            "#,
        )
        .bind(&copy.isbn)
        .bind(copy.library_id)
        .bind(copy.reader_id)
        .bind(copy.return_date)
        .bind(copy.return_approver_id)
        .bind(IssueStatus::Returned)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("No open issue of this book for this reader".to_string())
        })?;

        let restored = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies + 1
            WHERE isbn = $1 AND library_id = $2 AND available_copies < total_copies
            "#,
        )
        .bind(&copy.isbn)
        .bind(copy.library_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if restored == 0 {
            tracing::warn!(
                "Returned copy of {} in library {} had no slot to go back to",
                copy.isbn,
                copy.library_id
            );
        }

        sqlx::query(
            r#"
            UPDATE request_events
            SET status = $5, approval_date = $6, approver_id = $7
            WHERE reader_id = $1 AND book_id = $2 AND library_id = $3
              AND request_type = $4 AND status = 'Pending'
            "#,
        )
        .bind(copy.reader_id)
        .bind(&copy.isbn)
        .bind(copy.library_id)
        .bind(RequestType::Return)
        .bind(RequestStatus::Approved)
        .bind(copy.return_date)
        .bind(copy.return_approver_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(closed)
    }
}
