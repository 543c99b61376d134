//! Issue requests and issue records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// What the reader asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Issue,
    Return,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Issue => "issue",
            RequestType::Return => "return",
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue" => Ok(RequestType::Issue),
            "return" => Ok(RequestType::Return),
            _ => Err(format!("Invalid request type: {}", s)),
        }
    }
}

impl_text_enum!(RequestType);

/// Request lifecycle. Only `Pending` requests can change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RequestStatus {
    Pending,
    Approved,
    Disapproved,
    Issued,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Approved => "Approved",
            RequestStatus::Disapproved => "Disapproved",
            RequestStatus::Issued => "Issued",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RequestStatus::Pending),
            "Approved" => Ok(RequestStatus::Approved),
            "Disapproved" => Ok(RequestStatus::Disapproved),
            "Issued" => Ok(RequestStatus::Issued),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

impl_text_enum!(RequestStatus);

/// A reader's ask to borrow (or give back) a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct IssueRequest {
    pub id: i32,
    /// ISBN of the requested book
    pub book_id: String,
    pub library_id: i32,
    pub reader_id: i32,
    pub request_date: DateTime<Utc>,
    pub approval_date: Option<DateTime<Utc>>,
    pub approver_id: Option<i32>,
    pub request_type: RequestType,
    pub status: RequestStatus,
}

/// Values for a new request
#[derive(Debug, Clone)]
pub struct NewIssueRequest {
    pub book_id: String,
    pub library_id: i32,
    pub reader_id: i32,
    pub request_date: DateTime<Utc>,
    pub request_type: RequestType,
}

/// Decision taken by an admin on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    Approve { approver_id: i32, at: DateTime<Utc> },
    Disapprove { approver_id: i32 },
}

/// Physical state of an issue record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Issued,
    Returned,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Issued => "issued",
            IssueStatus::Returned => "returned",
        }
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(IssueStatus::Issued),
            "returned" => Ok(IssueStatus::Returned),
            _ => Err(format!("Invalid issue status: {}", s)),
        }
    }
}

impl_text_enum!(IssueStatus);

/// A copy handed over to a reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct IssueRecord {
    pub id: i32,
    pub isbn: String,
    pub library_id: i32,
    pub reader_id: i32,
    pub issue_approver_id: i32,
    pub issue_status: IssueStatus,
    pub issue_date: DateTime<Utc>,
    pub expected_return_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub return_approver_id: Option<i32>,
}

impl IssueRecord {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Values for handing over one copy
#[derive(Debug, Clone)]
pub struct NewIssueRecord {
    pub isbn: String,
    pub library_id: i32,
    pub reader_id: i32,
    pub issue_approver_id: i32,
    pub issue_date: DateTime<Utc>,
    pub expected_return_date: DateTime<Utc>,
}

/// Values for taking back one copy
#[derive(Debug, Clone)]
pub struct CopyReturn {
    pub isbn: String,
    pub library_id: i32,
    pub reader_id: i32,
    pub return_approver_id: i32,
    pub return_date: DateTime<Utc>,
}

/// Request body for issue and return requests made by a reader
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateIssueRequest {
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    pub library_id: i32,
}

/// Request body for admin hand-over and take-back of a copy
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReaderCopy {
    pub user_id: i32,
    pub library_id: i32,
}
