//! Super-admin endpoints, mounted under `/admin` behind the role gate.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    AppState, audit,
    auth::AuthUser,
    error::{ApiJson, ApiQuery, AppResult},
    hierarchy,
    models::{
        AcademicSession, AdminDashboardStats, AssignDepartmentRequest,
        AssignProfessorDepartmentsRequest, AssignSectionRequest, Course, CreateCourseRequest,
        CreateDepartmentRequest, CreateSectionRequest, CreateSessionRequest, CreatedResponse,
        DepartmentResponse, LogResponse, MessageResponse, SectionResponse, UpdateCourseRequest,
        UpdateDepartmentRequest, UpdateRoleRequest, UpdateSectionRequest, UpdateSessionRequest,
        UserSummary,
    },
};

type Created = (StatusCode, Json<CreatedResponse>);

fn created(message: &str, id: i64) -> Created {
    (
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: message.to_string(),
            id,
        }),
    )
}

/// LogFilter
///
/// Query parameters of GET /admin/logs.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct LogFilter {
    /// Calendar day, `YYYY-MM-DD`.
    pub day: Option<String>,
    /// Exact action tag, e.g. `note_delete`.
    pub action: Option<String>,
}

// --- Courses ---

#[utoipa::path(
    get,
    path = "/admin/courses",
    responses((status = 200, description = "All courses", body = [Course])),
    security(("bearer" = []))
)]
pub async fn list_courses(State(state): State<AppState>) -> AppResult<Json<Vec<Course>>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(hierarchy::list_courses(tx.as_mut()).await?))
}

#[utoipa::path(
    post,
    path = "/admin/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Created", body = CreatedResponse),
        (status = 409, description = "Name or short name taken")
    ),
    security(("bearer" = []))
)]
pub async fn create_course(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateCourseRequest>,
) -> AppResult<Created> {
    let mut tx = state.repo.begin().await?;
    let course = hierarchy::create_course(tx.as_mut(), payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(Some(actor), "course_created", format!("Course '{}' created.", course.short_name))
        .await;
    Ok(created("Course created successfully", course.id))
}

#[utoipa::path(
    put,
    path = "/admin/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    request_body = UpdateCourseRequest,
    responses((status = 200, description = "Updated", body = MessageResponse)),
    security(("bearer" = []))
)]
pub async fn update_course(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateCourseRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    hierarchy::update_course(tx.as_mut(), id, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(Some(actor), "course_updated", format!("Course ID {} updated.", id))
        .await;
    Ok(Json(MessageResponse::new("Course updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/admin/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 409, description = "Course still has departments")
    ),
    security(("bearer" = []))
)]
pub async fn delete_course(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let course = hierarchy::delete_course(tx.as_mut(), id).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "course_deleted",
            format!("Course ID {} ('{}') deleted.", id, course.short_name),
        )
        .await;
    Ok(Json(MessageResponse::new("Course deleted successfully")))
}

// --- Departments ---

#[utoipa::path(
    get,
    path = "/admin/departments",
    responses((status = 200, description = "All departments", body = [DepartmentResponse])),
    security(("bearer" = []))
)]
pub async fn list_departments(State(state): State<AppState>) -> AppResult<Json<Vec<DepartmentResponse>>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(hierarchy::list_departments(tx.as_mut()).await?))
}

#[utoipa::path(
    post,
    path = "/admin/departments",
    request_body = CreateDepartmentRequest,
    responses(
        (status = 201, description = "Created", body = CreatedResponse),
        (status = 404, description = "Parent course not found")
    ),
    security(("bearer" = []))
)]
pub async fn create_department(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateDepartmentRequest>,
) -> AppResult<Created> {
    let mut tx = state.repo.begin().await?;
    let department = hierarchy::create_department(tx.as_mut(), payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "department_created",
            format!("Department '{}' created.", department.short_name),
        )
        .await;
    Ok(created("Department created successfully", department.id))
}

#[utoipa::path(
    put,
    path = "/admin/departments/{id}",
    params(("id" = i64, Path, description = "Department ID")),
    request_body = UpdateDepartmentRequest,
    responses((status = 200, description = "Updated", body = MessageResponse)),
    security(("bearer" = []))
)]
pub async fn update_department(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateDepartmentRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    hierarchy::update_department(tx.as_mut(), id, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(Some(actor), "department_updated", format!("Department ID {} updated.", id))
        .await;
    Ok(Json(MessageResponse::new("Department updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/admin/departments/{id}",
    params(("id" = i64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 409, description = "Department still has users, notes or sections")
    ),
    security(("bearer" = []))
)]
pub async fn delete_department(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let department = hierarchy::delete_department(tx.as_mut(), id).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "department_deleted",
            format!("Department ID {} ('{}') deleted.", id, department.short_name),
        )
        .await;
    Ok(Json(MessageResponse::new("Department deleted successfully")))
}

// --- Academic sessions ---

#[utoipa::path(
    get,
    path = "/admin/sessions",
    responses((status = 200, description = "All sessions, newest label first", body = [AcademicSession])),
    security(("bearer" = []))
)]
pub async fn list_sessions(State(state): State<AppState>) -> AppResult<Json<Vec<AcademicSession>>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(hierarchy::list_sessions(tx.as_mut()).await?))
}

#[utoipa::path(
    post,
    path = "/admin/sessions",
    request_body = CreateSessionRequest,
    responses((status = 201, description = "Created", body = CreatedResponse)),
    security(("bearer" = []))
)]
pub async fn create_session(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateSessionRequest>,
) -> AppResult<Created> {
    let mut tx = state.repo.begin().await?;
    let session = hierarchy::create_session(tx.as_mut(), payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "session_created",
            format!("Academic session '{}' created.", session.year_name),
        )
        .await;
    Ok(created("Academic session created successfully", session.id))
}

#[utoipa::path(
    put,
    path = "/admin/sessions/{id}",
    params(("id" = i64, Path, description = "Session ID")),
    request_body = UpdateSessionRequest,
    responses((status = 200, description = "Updated", body = MessageResponse)),
    security(("bearer" = []))
)]
pub async fn update_session(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateSessionRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    hierarchy::update_session(tx.as_mut(), id, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(Some(actor), "session_updated", format!("Academic session ID {} updated.", id))
        .await;
    Ok(Json(MessageResponse::new("Academic session updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/admin/sessions/{id}",
    params(("id" = i64, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 409, description = "Session still has sections")
    ),
    security(("bearer" = []))
)]
pub async fn delete_session(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let session = hierarchy::delete_session(tx.as_mut(), id).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "session_deleted",
            format!("Session ID {} ('{}') deleted.", id, session.year_name),
        )
        .await;
    Ok(Json(MessageResponse::new("Academic session deleted successfully")))
}

// --- Sections ---

#[utoipa::path(
    get,
    path = "/admin/sections",
    responses((status = 200, description = "All sections", body = [SectionResponse])),
    security(("bearer" = []))
)]
pub async fn list_sections(State(state): State<AppState>) -> AppResult<Json<Vec<SectionResponse>>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(hierarchy::list_sections(tx.as_mut()).await?))
}

#[utoipa::path(
    post,
    path = "/admin/sections",
    request_body = CreateSectionRequest,
    responses(
        (status = 201, description = "Created", body = CreatedResponse),
        (status = 404, description = "Department or session not found")
    ),
    security(("bearer" = []))
)]
pub async fn create_section(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateSectionRequest>,
) -> AppResult<Created> {
    let mut tx = state.repo.begin().await?;
    let section = hierarchy::create_section(tx.as_mut(), payload).await?;
    let code = hierarchy::section_code(tx.as_mut(), &section).await?;
    tx.commit().await?;

    state
        .audit
        .record(Some(actor), "section_created", format!("Section '{}' created.", code))
        .await;
    Ok(created("Section created successfully", section.id))
}

#[utoipa::path(
    put,
    path = "/admin/sections/{id}",
    params(("id" = i64, Path, description = "Section ID")),
    request_body = UpdateSectionRequest,
    responses((status = 200, description = "Updated", body = MessageResponse)),
    security(("bearer" = []))
)]
pub async fn update_section(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateSectionRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    hierarchy::update_section(tx.as_mut(), id, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(Some(actor), "section_updated", format!("Section ID {} updated.", id))
        .await;
    Ok(Json(MessageResponse::new("Section updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/admin/sections/{id}",
    params(("id" = i64, Path, description = "Section ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 409, description = "Section still has students")
    ),
    security(("bearer" = []))
)]
pub async fn delete_section(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let code = {
        let section = hierarchy::delete_section(tx.as_mut(), id).await?;
        hierarchy::section_code(tx.as_mut(), &section).await?
    };
    tx.commit().await?;

    state
        .audit
        .record(Some(actor), "section_deleted", format!("Section ID {} ('{}') deleted.", id, code))
        .await;
    Ok(Json(MessageResponse::new("Section deleted successfully")))
}

// --- Users ---

#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All users", body = [UserSummary])),
    security(("bearer" = []))
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserSummary>>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(hierarchy::list_users(tx.as_mut()).await?))
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = MessageResponse),
        (status = 400, description = "Unknown role")
    ),
    security(("bearer" = []))
)]
pub async fn update_user_role(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateRoleRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let user = hierarchy::change_role(tx.as_mut(), id, payload.role).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "admin_role_change",
            format!("User '{}' role changed to '{}'.", user.username, user.role),
        )
        .await;
    Ok(Json(MessageResponse::new(format!(
        "User {}'s role updated to {}",
        user.username, user.role
    ))))
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}/department",
    params(("id" = i64, Path, description = "Student user ID")),
    request_body = AssignDepartmentRequest,
    responses(
        (status = 200, description = "Department set or cleared", body = MessageResponse),
        (status = 400, description = "Not a student")
    ),
    security(("bearer" = []))
)]
pub async fn assign_student_department(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<AssignDepartmentRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let user = hierarchy::assign_student_department(tx.as_mut(), id, payload.department_id).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "student_department_assigned",
            format!(
                "Student '{}' assigned to department ID {:?}.",
                user.username, user.department_id
            ),
        )
        .await;
    Ok(Json(MessageResponse::new("Student department updated successfully.")))
}

#[utoipa::path(
    put,
    path = "/admin/professors/{id}/departments",
    params(("id" = i64, Path, description = "Professor user ID")),
    request_body = AssignProfessorDepartmentsRequest,
    responses(
        (status = 200, description = "Taught departments replaced", body = MessageResponse),
        (status = 400, description = "Not a professor")
    ),
    security(("bearer" = []))
)]
pub async fn assign_professor_departments(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<AssignProfessorDepartmentsRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let (user, assigned) = hierarchy::assign_professor_departments(tx.as_mut(), id, payload).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "professor_departments_assigned",
            format!("Professor '{}' departments updated to {:?}.", user.username, assigned),
        )
        .await;
    Ok(Json(MessageResponse::new("Professor departments updated successfully.")))
}

#[utoipa::path(
    put,
    path = "/admin/students/{id}/section",
    params(("id" = i64, Path, description = "Student user ID")),
    request_body = AssignSectionRequest,
    responses(
        (status = 200, description = "Section set or cleared", body = MessageResponse),
        (status = 400, description = "Not a student"),
        (status = 404, description = "Section not found")
    ),
    security(("bearer" = []))
)]
pub async fn assign_student_section(
    AuthUser { id: actor, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<AssignSectionRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    let user = hierarchy::assign_student_section(tx.as_mut(), id, payload.section_id).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(actor),
            "student_section_assigned",
            format!(
                "Student '{}' assigned to section ID {:?}.",
                user.username, user.section_id
            ),
        )
        .await;
    Ok(Json(MessageResponse::new("Student section updated successfully.")))
}

// --- Dashboard ---

#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Totals and recent activity", body = AdminDashboardStats)),
    security(("bearer" = []))
)]
pub async fn get_stats(State(state): State<AppState>) -> AppResult<Json<AdminDashboardStats>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(hierarchy::dashboard_stats(tx.as_mut()).await?))
}

#[utoipa::path(
    get,
    path = "/admin/logs",
    params(LogFilter),
    responses(
        (status = 200, description = "Activity log, newest first", body = [LogResponse]),
        (status = 400, description = "Invalid day")
    ),
    security(("bearer" = []))
)]
pub async fn get_logs(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<LogFilter>,
) -> AppResult<Json<Vec<LogResponse>>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(
        audit::list_logs(tx.as_mut(), filter.day.as_deref(), filter.action.as_deref()).await?,
    ))
}
