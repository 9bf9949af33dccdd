//! Credential and token lifecycle: signup, login, refresh, password change and reset.
//!
//! Every function here works on a caller-provided unit of work and never commits it; the
//! handler decides when the operation is complete.

use chrono::{Duration, Utc};

use crate::{
    auth::{self, RESET_TOKEN_TTL_HOURS, TokenType},
    error::{AppError, AppResult},
    models::{
        AccessTokenResponse, ChangePasswordRequest, DepartmentBrief, LoginRequest, NewUser,
        ProfileResponse, PublicProfileResponse, PublicUser, ResetPasswordRequest, SectionBrief,
        SignupRequest, TokenPairResponse, User,
    },
    notes,
    repository::UnitOfWork,
};

pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";

/// The college id is the upper-cased local part of the institutional email.
pub fn derive_college_id(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_uppercase()
}

/// parse_college_id
///
/// Splits an id such as `A2024CSE10368` into its admission year (characters 1..5) and the
/// department short name (everything between the year and the trailing five characters).
pub fn parse_college_id(college_id: &str) -> Option<(i32, String)> {
    let chars: Vec<char> = college_id.chars().collect();
    if chars.len() < 11 {
        return None;
    }
    let year: String = chars[1..5].iter().collect();
    if !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let department: String = chars[5..chars.len() - 5].iter().collect();
    Some((year.parse().ok()?, department))
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// signup
///
/// Registers a student. The department and admission year are pre-filled from the college id
/// when it parses and names a known department; otherwise they are left empty.
pub async fn signup(tx: &mut dyn UnitOfWork, email_domain: &str, req: SignupRequest) -> AppResult<User> {
    let (Some(username), Some(email), Some(password)) = (
        required(req.username),
        required(req.email).map(|e| e.to_lowercase()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation("Missing required fields".to_string()));
    };

    if !email.ends_with(&format!("@{}", email_domain)) {
        return Err(AppError::Validation(format!(
            "Only college email addresses (@{}) are allowed.",
            email_domain
        )));
    }
    if tx.user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email address already in use".to_string()));
    }
    if tx.user_by_username(&username).await?.is_some() {
        return Err(AppError::Conflict("Username already in use".to_string()));
    }

    let college_id = derive_college_id(&email);
    let mut admission_year = None;
    let mut department_id = None;
    match parse_college_id(&college_id) {
        Some((year, short_name)) => match tx.department_by_short_name(&short_name).await? {
            Some(department) => {
                admission_year = Some(year);
                department_id = Some(department.id);
            }
            None => tracing::warn!(
                college_id = %college_id,
                department = %short_name,
                "department from college id not found"
            ),
        },
        None => tracing::warn!(college_id = %college_id, "could not parse college id"),
    }

    tx.insert_user(NewUser {
        username,
        email,
        password_hash: auth::hash_password(&password)?,
        college_id: Some(college_id),
        admission_year,
        department_id,
    })
    .await
}

/// login
///
/// Verifies credentials and issues the token pair. The access token embeds the role.
pub async fn login(tx: &mut dyn UnitOfWork, secret: &str, req: LoginRequest) -> AppResult<(User, TokenPairResponse)> {
    let (Some(username), Some(password)) = (required(req.username), req.password.filter(|p| !p.is_empty())) else {
        return Err(AppError::Validation("Missing username or password".to_string()));
    };

    let user = tx
        .user_by_username(&username)
        .await?
        .filter(|u| auth::verify_password(&u.password_hash, &password))
        .ok_or_else(|| AppError::Unauthorized("Invalid username or password".to_string()))?;

    let tokens = TokenPairResponse {
        access_token: auth::issue_token(secret, user.id, TokenType::Access, Some(user.role))?,
        refresh_token: auth::issue_token(secret, user.id, TokenType::Refresh, None)?,
    };
    Ok((user, tokens))
}

/// A new access token for the refresh token's subject. No role claim is embedded; the role is
/// read from storage whenever such a token is used.
pub fn refresh(secret: &str, user_id: i64) -> AppResult<AccessTokenResponse> {
    Ok(AccessTokenResponse {
        access_token: auth::issue_token(secret, user_id, TokenType::Access, None)?,
    })
}

pub async fn change_password(tx: &mut dyn UnitOfWork, user_id: i64, req: ChangePasswordRequest) -> AppResult<User> {
    let (Some(current), Some(new)) = (
        req.current_password.filter(|p| !p.is_empty()),
        req.new_password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation("Current and new passwords are required".to_string()));
    };

    let mut user = tx
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if !auth::verify_password(&user.password_hash, &current) {
        return Err(AppError::Unauthorized("Invalid current password".to_string()));
    }

    user.password_hash = auth::hash_password(&new)?;
    tx.save_user(&user).await?;
    Ok(user)
}

/// forgot_password
///
/// Stores a fresh reset token on the matching user and returns it together with the user, so
/// the caller can dispatch the mail. An unknown email yields `None`; the HTTP response is the
/// same either way.
pub async fn forgot_password(tx: &mut dyn UnitOfWork, email: Option<String>) -> AppResult<Option<(User, String)>> {
    let Some(email) = required(email).map(|e| e.to_lowercase()) else {
        return Ok(None);
    };
    let Some(mut user) = tx.user_by_email(&email).await? else {
        return Ok(None);
    };

    let token = auth::generate_reset_token();
    user.reset_token = Some(token.clone());
    user.reset_token_expires_at = Some(Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS));
    tx.save_user(&user).await?;
    Ok(Some((user, token)))
}

/// reset_password
///
/// Consumes a reset token: sets the new password and clears the token in the same write.
pub async fn reset_password(tx: &mut dyn UnitOfWork, token: &str, req: ResetPasswordRequest) -> AppResult<User> {
    let invalid = || AppError::Validation("Invalid or expired password reset token.".to_string());

    let mut user = tx.user_by_reset_token(token).await?.ok_or_else(invalid)?;
    match user.reset_token_expires_at {
        Some(expires_at) if expires_at > Utc::now() => {}
        _ => return Err(invalid()),
    }
    let Some(new_password) = req.new_password.filter(|p| !p.is_empty()) else {
        return Err(AppError::Validation("New password is required".to_string()));
    };

    user.password_hash = auth::hash_password(&new_password)?;
    user.reset_token = None;
    user.reset_token_expires_at = None;
    tx.save_user(&user).await?;
    Ok(user)
}

pub async fn profile(tx: &mut dyn UnitOfWork, user_id: i64) -> AppResult<ProfileResponse> {
    let user = tx
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let department = match user.department_id {
        Some(id) => tx.department_by_id(id).await?.as_ref().map(DepartmentBrief::from),
        None => None,
    };

    let section = match user.section_id {
        Some(id) => match tx.section_by_id(id).await? {
            Some(section) => {
                let short_name = tx
                    .department_by_id(section.department_id)
                    .await?
                    .map(|d| d.short_name)
                    .unwrap_or_default();
                Some(SectionBrief {
                    id: section.id,
                    section_code: section.section_code(&short_name),
                })
            }
            None => None,
        },
        None => None,
    };

    let mut departments_taught = Vec::new();
    for id in tx.taught_department_ids(user.id).await? {
        if let Some(d) = tx.department_by_id(id).await? {
            departments_taught.push(DepartmentBrief::from(&d));
        }
    }

    Ok(ProfileResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
        college_id: user.college_id,
        admission_year: user.admission_year,
        department,
        section,
        departments_taught,
    })
}

/// Anonymous view of a user and everything they uploaded.
pub async fn public_profile(tx: &mut dyn UnitOfWork, username: &str) -> AppResult<PublicProfileResponse> {
    let user = tx
        .user_by_username(username)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let department_name = match user.department_id {
        Some(id) => tx.department_by_id(id).await?.map(|d| d.name),
        None => None,
    };

    let mut responses = Vec::new();
    for note in tx.notes_by_author(user.id).await? {
        responses.push(notes::to_response(tx, note).await?);
    }

    Ok(PublicProfileResponse {
        user: PublicUser {
            username: user.username,
            role: user.role,
            department_name,
        },
        notes: responses,
    })
}
