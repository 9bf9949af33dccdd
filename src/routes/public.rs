use crate::{
    AppState,
    handlers::{self, account, notes},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token. `/refresh` is listed here because it authenticates
/// with the refresh token through its own extractor rather than the role gate.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(handlers::health))
        // --- Credentials ---
        .route("/signup", post(account::signup))
        .route("/login", post(account::login))
        .route("/refresh", post(account::refresh))
        // POST /forgot-password
        // Always answers with the same message so registered addresses cannot be probed.
        .route("/forgot-password", post(account::forgot_password))
        .route("/reset-password/{token}", post(account::reset_password))
        // --- Browsing ---
        // GET /notes?page=&title=&subject=&academic_year=&verified=
        .route("/notes", get(notes::list_notes))
        // GET /notes/{id}
        // PUT and DELETE on the same path are merged in from the authenticated router.
        .route("/notes/{id}", get(notes::get_note))
        .route("/users/{username}", get(account::get_public_profile))
}
