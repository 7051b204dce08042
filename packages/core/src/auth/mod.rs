//! Authentication: token inspection for the route guard, and the
//! login/verify flow behind both the JSON auth routes and the login page.

pub mod issuer;
pub mod token;
pub mod users;

use std::sync::Arc;

use thiserror::Error;

pub use issuer::{Claims, TokenIssuer, DEFAULT_TOKEN_TTL};
pub use token::{TokenError, TokenState};
pub use users::{Role, StoredUser, User, UserDirectory};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid or expired token")]
    InvalidToken(#[source] TokenError),

    #[error("Could not issue token: {0}")]
    Issue(String),
}

/// Successful login: the profile and the freshly signed token.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<UserDirectory>,
    issuer: TokenIssuer,
}

impl AuthService {
    pub fn new(users: UserDirectory, issuer: TokenIssuer) -> Self {
        Self {
            users: Arc::new(users),
            issuer,
        }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let stored = self
            .users
            .find_by_username(username)
            .ok_or(AuthError::InvalidCredentials)?;

        if stored.password != password {
            return Err(AuthError::InvalidCredentials);
        }

        let user = User::from(stored);
        let token = self
            .issuer
            .issue(&user)
            .map_err(|err| AuthError::Issue(err.to_string()))?;

        Ok(LoginOutcome { user, token })
    }

    /// Verify a token and resolve the account it names.
    pub fn verify(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.issuer.verify(token).map_err(AuthError::InvalidToken)?;
        self.users
            .find_by_id(&claims.user_id)
            .map(User::from)
            .ok_or(AuthError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(
            UserDirectory::demo(),
            TokenIssuer::new("unit-test-secret", DEFAULT_TOKEN_TTL),
        )
    }

    #[test]
    fn login_succeeds_with_case_insensitive_username() {
        let outcome = service().login("Admin", "password123").unwrap();
        assert_eq!(outcome.user.username, "admin");
        assert!(token::is_valid_structure(&outcome.token));
    }

    #[test]
    fn login_rejects_blank_fields() {
        assert_eq!(service().login("", "x").unwrap_err(), AuthError::MissingCredentials);
        assert_eq!(service().login("admin", "").unwrap_err(), AuthError::MissingCredentials);
    }

    #[test]
    fn login_rejects_wrong_password_and_unknown_user_alike() {
        let svc = service();
        assert_eq!(svc.login("admin", "nope").unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(svc.login("ghost", "nope").unwrap_err(), AuthError::InvalidCredentials);
    }

    #[test]
    fn login_compares_usernames_untrimmed() {
        let svc = service();
        assert_eq!(svc.login("   ", "x").unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(
            svc.login(" admin ", "password123").unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[test]
    fn verify_round_trips_the_user() {
        let svc = service();
        let outcome = svc.login("doctor", "doctor123").unwrap();
        assert_eq!(svc.verify(&outcome.token).unwrap().id, "2");
    }

    #[test]
    fn verify_reports_removed_user() {
        let issuer = TokenIssuer::new("unit-test-secret", DEFAULT_TOKEN_TTL);
        let ghost = User {
            id: "99".into(),
            username: "ghost".into(),
            email: None,
            role: None,
            created_at: None,
        };
        let jwt = issuer.issue(&ghost).unwrap();
        assert_eq!(service().verify(&jwt).unwrap_err(), AuthError::UserNotFound);
    }
}
