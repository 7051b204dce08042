//! Accounts accepted by the local `/api/auth/*` handlers.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Account record as stored in the users file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub id: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Profile handed to the browser and embedded in page headers. Never carries the password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<&StoredUser> for User {
    fn from(stored: &StoredUser) -> Self {
        Self {
            id: stored.id.clone(),
            username: stored.username.clone(),
            email: stored.email.clone(),
            role: stored.role,
            created_at: stored.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: Vec<StoredUser>,
}

impl UserDirectory {
    pub fn new(users: Vec<StoredUser>) -> Self {
        Self { users }
    }

    /// Load a JSON array of accounts.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("cannot read users file {}: {}", path.display(), err))
        })?;
        let users: Vec<StoredUser> = serde_json::from_str(&raw).map_err(|err| {
            AppError::Config(format!("invalid users file {}: {}", path.display(), err))
        })?;
        if users.is_empty() {
            return Err(AppError::Config(format!(
                "users file {} contains no accounts",
                path.display()
            )));
        }
        Ok(Self::new(users))
    }

    /// Built-in accounts for local development.
    pub fn demo() -> Self {
        let account = |id: &str, username: &str, password: &str, role: Role| StoredUser {
            id: id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            email: Some(format!("{}@blinkdx.com", username)),
            role: Some(role),
            created_at: Some("2024-01-01T00:00:00Z".to_string()),
        };
        Self::new(vec![
            account("1", "admin", "password123", Role::Admin),
            account("2", "doctor", "doctor123", Role::User),
            account("3", "user", "user123", Role::User),
        ])
    }

    pub fn find_by_username(&self, username: &str) -> Option<&StoredUser> {
        self.users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&StoredUser> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
