//! Libraries and memberships on PostgreSQL

use async_trait::async_trait;

use super::{LibraryStore, Repository};
use crate::{error::AppResult, models::library::Library};

#[async_trait]
impl LibraryStore for Repository {
    async fn libraries_create(&self, name: &str, location: &str) -> AppResult<Library> {
        let library = sqlx::query_as::<_, Library>(
            "INSERT INTO libraries (name, location) VALUES ($1, $2) RETURNING *",
        )
        .bind(name)
        .bind(location)
        .fetch_one(&self.pool)
        .await?;
        Ok(library)
    }

    async fn libraries_list(&self) -> AppResult<Vec<Library>> {
        let libraries = sqlx::query_as::<_, Library>("SELECT * FROM libraries ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(libraries)
    }

    async fn libraries_get(&self, id: i32) -> AppResult<Option<Library>> {
        let library = sqlx::query_as::<_, Library>("SELECT * FROM libraries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(library)
    }

    async fn memberships_exists(&self, user_id: i32, library_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM user_libraries WHERE user_id = $1 AND library_id = $2)",
        )
        .bind(user_id)
        .bind(library_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn memberships_library_ids(&self, user_id: i32) -> AppResult<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar(
            "SELECT library_id FROM user_libraries WHERE user_id = $1 ORDER BY library_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
