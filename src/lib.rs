//! LMS Server - multi-tenant library management
//!
//! A REST JSON API where owners run libraries, admins manage their book
//! inventory and readers borrow copies through a request, approval and
//! issue pipeline.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
