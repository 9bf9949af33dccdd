//! HTTP handlers. Each one opens a unit of work, delegates to a manager, commits, and only
//! then records the audit entry, so the log never describes a change that was rolled back.

pub mod account;
pub mod admin;
pub mod notes;

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}
