//! Bearer-token authentication.
//!
//! The middleware resolves the token to an active user and hands the
//! request on with an [`Actor`] extension. Codes sent by mail are compared
//! in constant time.

pub mod password;
pub mod token;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use rand::{distributions::Alphanumeric, Rng};
use subtle::ConstantTimeEq;

use crate::errors::{codes, AppError};
use crate::models::{Role, User};
use crate::AppState;

pub use password::PasswordError;
pub use token::{TokenError, TokenKeys};

/// The authenticated user a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl Actor {
    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    /// Role gate for manager-only operations. Always a 403.
    pub fn require_manager(&self, action: &str) -> Result<(), AppError> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("Only managers can {}.", action)))
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Require a valid bearer token for an active account.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;

    let claims = state.tokens.validate(token)?;

    let user = state
        .repo
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid or expired token"))?;

    if !user.is_active {
        return Err(AppError::Unauthorized {
            code: codes::ACCOUNT_INACTIVE,
            message: "Account is not active.".to_string(),
        });
    }

    request.extensions_mut().insert(Actor::from(&user));
    Ok(next.run(request).await)
}

/// Random alphanumeric code for verification and reset mails.
pub fn random_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Perform constant-time string comparison.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("Ab3xY9", "Ab3xY9"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("Ab3xY9", "Ab3xY8"));
        assert!(!constant_time_compare("Ab3xY9", "ab3xy9"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-code"));
        assert!(!constant_time_compare("", "not-empty"));
    }

    #[test]
    fn test_random_code_shape() {
        let code = random_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_role_gate() {
        let developer = Actor {
            user_id: "u".into(),
            email: "d@example.com".into(),
            role: Role::Developer,
        };
        let err = developer.require_manager("create projects").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Only managers can create projects.");

        let manager = Actor {
            role: Role::Manager,
            ..developer
        };
        assert!(manager.require_manager("create projects").is_ok());
    }
}
