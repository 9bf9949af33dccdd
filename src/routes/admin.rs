use crate::{AppState, handlers::admin};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Nested under `/admin` and wrapped in a role gate that admits only `super_admin`. Every
/// mutating endpoint records an activity-log entry attributed to the calling admin.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Academic hierarchy ---
        // Deletes are refused with 409 while dependants exist (course -> department ->
        // section, session -> section, section -> students).
        .route("/courses", get(admin::list_courses).post(admin::create_course))
        .route(
            "/courses/{id}",
            put(admin::update_course).delete(admin::delete_course),
        )
        .route(
            "/departments",
            get(admin::list_departments).post(admin::create_department),
        )
        .route(
            "/departments/{id}",
            put(admin::update_department).delete(admin::delete_department),
        )
        // Activating a session deactivates every other one.
        .route("/sessions", get(admin::list_sessions).post(admin::create_session))
        .route(
            "/sessions/{id}",
            put(admin::update_session).delete(admin::delete_session),
        )
        .route("/sections", get(admin::list_sections).post(admin::create_section))
        .route(
            "/sections/{id}",
            put(admin::update_section).delete(admin::delete_section),
        )
        // --- Users ---
        .route("/users", get(admin::list_users))
        .route("/users/{id}/role", put(admin::update_user_role))
        .route("/users/{id}/department", put(admin::assign_student_department))
        .route(
            "/professors/{id}/departments",
            put(admin::assign_professor_departments),
        )
        .route("/students/{id}/section", put(admin::assign_student_section))
        // --- Oversight ---
        .route("/stats", get(admin::get_stats))
        // GET /logs?day=YYYY-MM-DD&action=
        .route("/logs", get(admin::get_logs))
}
