use crate::{
    AppState,
    handlers::{account, notes},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every handler here receives the caller as an `AuthUser`, already resolved by the role gate
/// wrapped around this router. Ownership checks (editing or deleting a note) happen in the
/// note manager using that identity.
pub fn authenticated_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::<AppState>::new()
        // --- Profile ---
        .route("/profile", get(account::get_profile))
        .route("/profile/change-password", post(account::change_password))
        // --- Notes ---
        // POST /notes/upload
        // Multipart form. The body limit replaces axum's 2MB default for this route only.
        .route(
            "/notes/upload",
            post(notes::upload_note).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        // GET /notes/my_notes
        // The static segment wins over the public `/notes/{id}` route.
        .route("/notes/my_notes", get(notes::get_my_notes))
        // PUT/DELETE /notes/{id}
        // Edit is author-only. Delete is also open to moderators and super admins.
        .route(
            "/notes/{id}",
            put(notes::update_note).delete(notes::delete_note),
        )
}
