//! Accounts: libraries, owner/admin/user registration and login

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use super::access::AccessControl;
use crate::{
    config::{AuthConfig, BootstrapConfig},
    error::{AppError, AppResult},
    models::{
        library::{CreateLibrary, Library},
        user::{CreateMember, CreateOwner, NewUser, Principal, Role, User, UserClaims},
    },
    repository::Store,
};

#[derive(Clone)]
pub struct AccountsService {
    store: Arc<dyn Store>,
    access: AccessControl,
    config: AuthConfig,
}

impl AccountsService {
    pub fn new(store: Arc<dyn Store>, access: AccessControl, config: AuthConfig) -> Self {
        Self { store, access, config }
    }

    /// Authenticate by email and return a JWT token with the user
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .store
            .users_get_by_email(email.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&user.password, password)? {
            tracing::warn!("Failed login for user {}", user.id);
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + (self.config.jwt_expiration_hours as i64 * 3600),
            iat: now,
        };

        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        tracing::info!("User {} logged in as {}", user.id, user.role);
        Ok((token, user))
    }

    pub async fn create_library(&self, principal: &Principal, input: CreateLibrary) -> AppResult<Library> {
        principal.require_role(Role::Owner)?;
        input.validate()?;

        let library = self
            .store
            .libraries_create(input.name.trim(), input.location.trim())
            .await?;
        tracing::info!("Owner {} created library {} ({})", principal.user_id, library.id, library.name);
        Ok(library)
    }

    pub async fn list_libraries(&self) -> AppResult<Vec<Library>> {
        self.store.libraries_list().await
    }

    pub async fn register_owner(&self, principal: &Principal, input: CreateOwner) -> AppResult<User> {
        principal.require_role(Role::Owner)?;
        input.validate()?;

        let user = self
            .create_account(&input.name, &input.email, &input.password, &input.contact, Role::Owner, &[])
            .await?;
        tracing::info!("Owner {} registered owner {}", principal.user_id, user.id);
        Ok(user)
    }

    /// Every listed library must exist
    pub async fn register_admin(&self, principal: &Principal, input: CreateMember) -> AppResult<User> {
        principal.require_role(Role::Owner)?;
        input.validate()?;

        for library_id in &input.library_ids {
            if self.store.libraries_get(*library_id).await?.is_none() {
                return Err(AppError::Validation(format!(
                    "Library with ID {} does not exist",
                    library_id
                )));
            }
        }

        let user = self.create_member(input, Role::Admin).await?;
        tracing::info!("Owner {} registered admin {}", principal.user_id, user.id);
        Ok(user)
    }

    /// Every listed library must be managed by the calling admin
    pub async fn register_user(&self, principal: &Principal, input: CreateMember) -> AppResult<User> {
        principal.require_role(Role::Admin)?;
        input.validate()?;

        for library_id in &input.library_ids {
            if !self.access.is_library_member(principal.user_id, *library_id).await? {
                tracing::warn!(
                    "Admin {} tried to register a user in library {}",
                    principal.user_id,
                    library_id
                );
                return Err(AppError::Authorization(format!(
                    "You are not assigned as an admin for library {}",
                    library_id
                )));
            }
        }

        let user = self.create_member(input, Role::User).await?;
        tracing::info!("Admin {} registered user {}", principal.user_id, user.id);
        Ok(user)
    }

    /// Create the configured owner when no owner exists yet.
    /// Returns the new account, or `None` when nothing was done.
    pub async fn bootstrap_owner(&self, config: &BootstrapConfig) -> AppResult<Option<User>> {
        let (Some(email), Some(password)) = (&config.owner_email, &config.owner_password) else {
            return Ok(None);
        };

        if self.store.users_any_with_role(Role::Owner).await? {
            return Ok(None);
        }

        let input = CreateOwner {
            name: config.owner_name.clone().unwrap_or_else(|| "Owner".to_string()),
            email: email.clone(),
            password: password.clone(),
            contact: String::new(),
        };
        input.validate()?;

        let user = self
            .create_account(&input.name, &input.email, &input.password, &input.contact, Role::Owner, &[])
            .await?;
        tracing::info!("Created initial owner account {} <{}>", user.id, user.email);
        Ok(Some(user))
    }

    async fn create_member(&self, input: CreateMember, role: Role) -> AppResult<User> {
        self.create_account(
            &input.name,
            &input.email,
            &input.password,
            &input.contact,
            role,
            &input.library_ids,
        )
        .await
    }

    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        contact: &str,
        role: Role,
        library_ids: &[i32],
    ) -> AppResult<User> {
        let email = email.trim();
        if self.store.users_get_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("User with this email already exists".to_string()));
        }

        let new_user = NewUser {
            name: name.trim().to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            contact: contact.trim().to_string(),
            role,
        };

        self.store.users_create(&new_user, library_ids).await
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
