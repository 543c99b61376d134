//! Access control: role checks scoped to library membership

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::user::{Principal, Role},
    repository::Store,
};

#[derive(Clone)]
pub struct AccessControl {
    store: Arc<dyn Store>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn is_library_member(&self, user_id: i32, library_id: i32) -> AppResult<bool> {
        self.store.memberships_exists(user_id, library_id).await
    }

    /// The caller must be a member of the library, whatever its role
    pub async fn require_library_member(&self, principal: &Principal, library_id: i32) -> AppResult<()> {
        if self.is_library_member(principal.user_id, library_id).await? {
            Ok(())
        } else {
            tracing::warn!(
                "User {} is not registered in library {}",
                principal.user_id,
                library_id
            );
            Err(AppError::Authorization(
                "You can only access libraries you are registered in".to_string(),
            ))
        }
    }

    /// The caller must be an admin AND a member of the library
    pub async fn require_library_admin(&self, principal: &Principal, library_id: i32) -> AppResult<()> {
        principal.require_role(Role::Admin)?;

        if self.is_library_member(principal.user_id, library_id).await? {
            Ok(())
        } else {
            tracing::warn!(
                "Admin {} attempted to manage library {} without membership",
                principal.user_id,
                library_id
            );
            Err(AppError::Authorization(format!(
                "You are not assigned as an admin for library {}",
                library_id
            )))
        }
    }

    /// Libraries the caller belongs to
    pub async fn member_libraries(&self, principal: &Principal) -> AppResult<Vec<i32>> {
        self.store.memberships_library_ids(principal.user_id).await
    }
}
