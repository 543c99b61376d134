//! Users repository for database operations

use async_trait::async_trait;

use super::{Repository, UserStore};
use crate::{
    error::AppResult,
    models::user::{NewUser, Role, User},
};

#[async_trait]
impl UserStore for Repository {
    async fn users_get(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn users_get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn users_any_with_role(&self, role: Role) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = $1)")
            .bind(role)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn users_create(&self, user: &NewUser, library_ids: &[i32]) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password, contact, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.contact)
        .bind(user.role)
        .fetch_one(&mut *tx)
        .await?;

        for library_id in library_ids {
            sqlx::query(
                r#"
                INSERT INTO user_libraries (user_id, library_id)
                VALUES ($1, $2)
                ON CONFLICT (user_id, library_id) DO NOTHING
                "#,
            )
            .bind(created.id)
            .bind(library_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }
}
