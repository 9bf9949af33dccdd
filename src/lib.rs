use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Managers: the business rules, written against a unit of work.
pub mod accounts;
pub mod audit;
pub mod hierarchy;
pub mod notes;

// Core services and shared types.
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod mailer;
pub mod models;
pub mod repository;
pub mod storage;

// HTTP surface.
pub mod handlers;
pub mod routes;
use gate::{RoleGate, role_gate};
use models::Role;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use audit::AuditRecorder;
pub use config::AppConfig;
pub use mailer::{MailerState, MockMailer, SmtpMailer};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document assembled from the `#[utoipa::path]` annotations, served at
/// `/api-docs/openapi.json` with Swagger UI on `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::account::signup, handlers::account::login, handlers::account::refresh,
        handlers::account::get_profile, handlers::account::change_password,
        handlers::account::forgot_password, handlers::account::reset_password,
        handlers::account::get_public_profile,
        handlers::notes::upload_note, handlers::notes::list_notes, handlers::notes::get_note,
        handlers::notes::get_my_notes, handlers::notes::update_note, handlers::notes::delete_note,
        handlers::admin::list_courses, handlers::admin::create_course,
        handlers::admin::update_course, handlers::admin::delete_course,
        handlers::admin::list_departments, handlers::admin::create_department,
        handlers::admin::update_department, handlers::admin::delete_department,
        handlers::admin::list_sessions, handlers::admin::create_session,
        handlers::admin::update_session, handlers::admin::delete_session,
        handlers::admin::list_sections, handlers::admin::create_section,
        handlers::admin::update_section, handlers::admin::delete_section,
        handlers::admin::list_users, handlers::admin::update_user_role,
        handlers::admin::assign_student_department, handlers::admin::assign_professor_departments,
        handlers::admin::assign_student_section, handlers::admin::get_stats,
        handlers::admin::get_logs,
    ),
    components(
        schemas(
            models::Role, models::Course, models::Department, models::AcademicSession,
            models::SignupRequest, models::LoginRequest, models::ChangePasswordRequest,
            models::ForgotPasswordRequest, models::ResetPasswordRequest,
            models::TokenPairResponse, models::AccessTokenResponse, models::MessageResponse,
            models::CreatedResponse, models::ProfileResponse, models::PublicProfileResponse,
            models::NoteResponse, models::NotePage, models::UploadNoteResponse,
            models::UpdateNoteRequest, models::UpdateNoteResponse, models::UserSummary,
            models::DepartmentResponse, models::SectionResponse, models::AdminDashboardStats,
            models::LogResponse, error::ErrorBody,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "notehub", description = "College note sharing API")
    )
)]
struct ApiDoc;

/// Registers the `bearer` scheme referenced by the protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single shared container handed to every handler. All services sit behind `Arc`ed trait
/// objects so tests can swap in the in-memory repository and the mock store and mailer.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub mailer: MailerState,
    pub audit: AuditRecorder,
    pub config: AppConfig,
}

impl AppState {
    /// The audit recorder writes through the same repository as the handlers.
    pub fn new(repo: RepositoryState, storage: StorageState, mailer: MailerState, config: AppConfig) -> Self {
        Self {
            audit: AuditRecorder::new(repo.clone()),
            repo,
            storage,
            mailer,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the route tree, wraps the protected routers in their role gates and adds the
/// request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Any role. `route_layer` keeps the gate off unmatched paths so they still 404.
        .merge(
            authenticated::authenticated_routes(state.config.max_upload_bytes).route_layer(
                middleware::from_fn_with_state(RoleGate::new(state.clone(), Role::ALL), role_gate),
            ),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                RoleGate::new(state.clone(), &[Role::SuperAdmin]),
                role_gate,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Puts the `x-request-id` on the request span so every log line of one request correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
