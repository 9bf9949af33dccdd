use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState, accounts,
    auth::{AuthUser, RefreshSubject},
    error::{ApiJson, AppResult},
    models::{
        AccessTokenResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
        MessageResponse, ProfileResponse, PublicProfileResponse, ResetPasswordRequest,
        SignupRequest, TokenPairResponse,
    },
};

/// signup
///
/// [Public Route] Registers a student account. Only addresses under the college domain are
/// accepted; department and admission year are derived from the college id when possible.
#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = MessageResponse),
        (status = 400, description = "Missing fields or foreign email domain"),
        (status = 409, description = "Email or username already in use")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let mut tx = state.repo.begin().await?;
    let user = accounts::signup(tx.as_mut(), &state.config.college_email_domain, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(user.id),
            "user_signup",
            format!(
                "New user '{}' created with College ID '{}'.",
                user.username,
                user.college_id.as_deref().unwrap_or_default()
            ),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully!")),
    ))
}

/// login
///
/// [Public Route] Exchanges credentials for an access/refresh token pair.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPairResponse),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<TokenPairResponse>> {
    let mut tx = state.repo.begin().await?;
    let (user, tokens) = accounts::login(tx.as_mut(), &state.config.jwt_secret, payload).await?;
    drop(tx);

    state
        .audit
        .record(Some(user.id), "user_login", format!("User '{}' logged in.", user.username))
        .await;

    Ok(Json(tokens))
}

/// refresh
///
/// [Refresh Token] Issues a new access token for the refresh token's subject.
#[utoipa::path(
    post,
    path = "/refresh",
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Missing or expired token"),
        (status = 422, description = "Not a refresh token")
    ),
    security(("bearer" = []))
)]
pub async fn refresh(
    State(state): State<AppState>,
    RefreshSubject(user_id): RefreshSubject,
) -> AppResult<Json<AccessTokenResponse>> {
    Ok(Json(accounts::refresh(&state.config.jwt_secret, user_id)?))
}

/// get_profile
///
/// [Authenticated Route] The caller's own profile including hierarchy placement.
#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "Profile", body = ProfileResponse)),
    security(("bearer" = []))
)]
pub async fn get_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<ProfileResponse>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(accounts::profile(tx.as_mut(), id).await?))
}

/// change_password
///
/// [Authenticated Route] Replaces the caller's password after checking the current one.
#[utoipa::path(
    post,
    path = "/profile/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 401, description = "Invalid current password")
    ),
    security(("bearer" = []))
)]
pub async fn change_password(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let user = accounts::change_password(tx.as_mut(), id, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(user.id),
            "password_changed",
            format!("User '{}' changed their password.", user.username),
        )
        .await;

    Ok(Json(MessageResponse::new("Password updated successfully")))
}

/// forgot_password
///
/// [Public Route] Starts a password reset. The response is identical whether or not the
/// email is registered; the audit entry and the mail are written in the background.
#[utoipa::path(
    post,
    path = "/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Generic acknowledgement", body = MessageResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let issued = accounts::forgot_password(tx.as_mut(), payload.email).await?;
    tx.commit().await?;

    // Audit and mail both run off the request path.
    if let Some((user, token)) = issued {
        let audit = state.audit.clone();
        let mailer = state.mailer.clone();
        tokio::spawn(async move {
            audit
                .record(
                    Some(user.id),
                    "password_reset_requested",
                    format!("Password reset requested for user '{}'.", user.username),
                )
                .await;
            if let Err(e) = mailer
                .send_password_reset(&user.email, &user.username, &token)
                .await
            {
                tracing::error!(user_id = user.id, error = %e, "failed to send password reset email");
            }
        });
    }

    Ok(Json(MessageResponse::new(accounts::FORGOT_PASSWORD_MESSAGE)))
}

/// reset_password
///
/// [Public Route] Sets a new password using a single-use reset token.
#[utoipa::path(
    post,
    path = "/reset-password/{token}",
    params(("token" = String, Path, description = "Reset token from the email link")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired token")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let user = accounts::reset_password(tx.as_mut(), &token, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(user.id),
            "password_reset",
            format!("User '{}' reset their password.", user.username),
        )
        .await;

    Ok(Json(MessageResponse::new(
        "Your password has been successfully reset.",
    )))
}

/// get_public_profile
///
/// [Public Route] A user's public profile and their notes.
#[utoipa::path(
    get,
    path = "/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Public profile", body = PublicProfileResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<PublicProfileResponse>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(accounts::public_profile(tx.as_mut(), &username).await?))
}
