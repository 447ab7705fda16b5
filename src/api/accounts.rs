//! Account API endpoints.

use axum::{extract::State, Extension, Json};
use chrono::{Duration, Utc};
use validator::Validate;

use super::{created, error, success, ApiResult};
use crate::auth::{self, password, Actor};
use crate::errors::{codes, AppError};
use crate::mail;
use crate::models::{
    LoginRequest, LoginResponse, MessageResponse, PasswordResetConfirm, PasswordResetRequest,
    RegisterRequest, User, VerifyEmailRequest,
};
use crate::AppState;

const CODE_LENGTH: usize = 6;

/// POST /api/accounts/register - Create an inactive account and mail its code.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<User> {
    request.validate()?;
    if request.password != request.password2 {
        return error(AppError::validation("Passwords do not match."));
    }
    password::check_strength(&request.password)?;

    let password_hash = password::hash_password_async(request.password.clone()).await?;
    let code = auth::random_code(CODE_LENGTH);
    let ttl_minutes = state.config.verification_ttl_minutes;
    let expiry = Utc::now() + Duration::minutes(ttl_minutes);

    let user = state
        .repo
        .register_user(&request, &password_hash, &code, expiry, |user| {
            let email =
                mail::verification_email(&state.config.mail_from, &user.email, &code, ttl_minutes);
            state.mailer.send(&email)?;
            Ok(())
        })
        .await?;

    created(user)
}

/// POST /api/accounts/verify-email - Activate an account with its mailed code.
pub async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<VerifyEmailRequest>,
) -> ApiResult<MessageResponse> {
    let record = state
        .repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or_else(|| AppError::NotFound("No user found with this email address.".to_string()))?;

    let code_matches = record
        .verification_code
        .as_deref()
        .is_some_and(|expected| auth::constant_time_compare(request.code.trim(), expected));
    if !code_matches {
        return error(AppError::Validation {
            code: codes::INVALID_CODE,
            message: "Invalid verification code.".to_string(),
        });
    }

    if record
        .verification_code_expiry
        .is_some_and(|expiry| expiry < Utc::now())
    {
        return error(AppError::Validation {
            code: codes::VERIFICATION_EXPIRED,
            message: "Verification code has expired.".to_string(),
        });
    }

    state.repo.activate_user(&record.user.id).await?;
    tracing::info!(user_id = %record.user.id, "email verified");

    success(MessageResponse::new("Email verified successfully."))
}

/// POST /api/accounts/login - Exchange credentials for an access token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let invalid = || AppError::unauthorized("Invalid email or password.");

    let record = state
        .repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password_async(request.password.clone(), record.password_hash.clone())
        .await?
    {
        return error(invalid());
    }

    if !record.user.is_active {
        return error(AppError::Unauthorized {
            code: codes::ACCOUNT_INACTIVE,
            message: "Account is not active. Verify your email first.".to_string(),
        });
    }

    let access_token = state.tokens.issue(&record.user)?;

    success(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.ttl_seconds(),
        email: record.user.email,
        role: record.user.role,
    })
}

/// POST /api/accounts/password-reset-request - Mail a password reset code.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> ApiResult<MessageResponse> {
    request.validate()?;

    let record = state
        .repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or_else(|| AppError::validation("No user found with this email address."))?;

    let code = auth::random_code(CODE_LENGTH);
    state
        .repo
        .store_reset_code(&record.user.id, &code, || {
            let email = mail::password_reset_email(&state.config.mail_from, &record.user.email, &code);
            state.mailer.send(&email)?;
            Ok(())
        })
        .await?;

    success(MessageResponse::new("Password reset code sent."))
}

/// POST /api/accounts/password-reset - Set a new password with a reset code.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirm>,
) -> ApiResult<MessageResponse> {
    request.validate()?;

    let invalid = || AppError::Validation {
        code: codes::INVALID_CODE,
        message: "Invalid email or reset code.".to_string(),
    };

    let record = state
        .repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or_else(invalid)?;

    let code_matches = record
        .reset_code
        .as_deref()
        .is_some_and(|expected| auth::constant_time_compare(request.reset_code.trim(), expected));
    if !code_matches {
        return error(invalid());
    }

    password::check_strength(&request.new_password)?;
    let password_hash = password::hash_password_async(request.new_password.clone()).await?;
    state
        .repo
        .reset_password(&record.user.id, &password_hash)
        .await?;

    tracing::info!(user_id = %record.user.id, "password reset");
    success(MessageResponse::new("Password has been reset."))
}

/// GET /api/accounts/me - The authenticated user.
pub async fn get_me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<User> {
    match state.repo.get_user(&actor.user_id).await {
        Ok(Some(user)) => success(user),
        Ok(None) => error(AppError::NotFound(format!(
            "User {} not found",
            actor.user_id
        ))),
        Err(e) => error(e),
    }
}

/// DELETE /api/accounts/me - Delete the authenticated user and their data.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<MessageResponse> {
    match state.repo.delete_user(&actor.user_id).await {
        Ok(()) => success(MessageResponse::new("Account deleted.")),
        Err(e) => error(e),
    }
}
