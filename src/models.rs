use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

// --- Roles ---

/// Role
///
/// The closed set of roles a user can hold. Stored as snake_case text in the `users.role`
/// column and embedded with the same spelling in the access token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    #[default]
    Student,
    Professor,
    Moderator,
    SuperAdmin,
}

impl Role {
    /// Every role, used as the capability set for "any authenticated caller".
    pub const ALL: &'static [Role] = &[
        Role::Student,
        Role::Professor,
        Role::Moderator,
        Role::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Professor => "professor",
            Role::Moderator => "moderator",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Moderators and super admins may remove any note.
    pub fn can_moderate_notes(&self) -> bool {
        matches!(self, Role::Moderator | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "professor" => Ok(Role::Professor),
            "moderator" => Ok(Role::Moderator),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(format!("Invalid role specified: '{}'", other)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// --- Core Records (Mapped to Database) ---

/// User
///
/// A row of the `users` table. Never serialized directly: it carries the password hash and the
/// pending reset token. Responses go through `ProfileResponse` / `UserSummary` instead.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub college_id: Option<String>,
    pub admission_year: Option<i32>,
    // Student membership. `department_id` follows `section_id` whenever a section is set.
    pub department_id: Option<i64>,
    pub section_id: Option<i64>,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `users`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub college_id: Option<String>,
    pub admission_year: Option<i32>,
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub duration_years: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub course_id: i64,
}

/// AcademicSession
///
/// A year label such as "2024-2025". At most one row has `is_active = true`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct AcademicSession {
    pub id: i64,
    pub year_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Section {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub department_id: i64,
    pub academic_session_id: i64,
}

impl Section {
    /// Year, department short name and section name glued together, e.g. "3CSEA".
    pub fn section_code(&self, department_short_name: &str) -> String {
        format!("{}{}{}", self.year, department_short_name, self.name)
    }
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file_url: String,
    pub subject: String,
    pub semester: i32,
    pub academic_year: String,
    pub is_verified: bool,
    pub user_id: i64,
    pub department_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub title: String,
    pub description: Option<String>,
    pub file_url: String,
    pub subject: String,
    pub semester: i32,
    pub academic_year: String,
    pub is_verified: bool,
    pub user_id: i64,
    pub department_id: Option<i64>,
}

/// LogEntry
///
/// One append-only audit row. `user_id` is `None` when the actor could not be resolved.
#[derive(Debug, Clone, FromRow, Default)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub action: String,
    pub details: Option<String>,
}

// --- Request Payloads (Input Schemas) ---
//
// Required fields are still `Option` so that a missing value is reported through
// `AppError::Validation` with a readable message instead of a deserializer rejection.

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct SignupRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct ResetPasswordRequest {
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateCourseRequest {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub duration_years: Option<i32>,
}

/// Partial update: `None` keeps the stored value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateCourseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_years: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateDepartmentRequest {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateDepartmentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateSessionRequest {
    pub year_name: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateSectionRequest {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub department_id: Option<i64>,
    pub academic_session_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateSectionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_session_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateRoleRequest {
    pub role: Option<String>,
}

/// `null` (or an absent field) clears the assignment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct AssignDepartmentRequest {
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct AssignSectionRequest {
    pub section_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct AssignProfessorDepartmentsRequest {
    #[serde(default)]
    pub department_ids: Vec<i64>,
}

/// UpdateNoteRequest
///
/// Partial update of a note by its author. Only provided fields are written.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateNoteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
}

impl UpdateNoteRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.subject.is_none()
            && self.semester.is_none()
            && self.academic_year.is_none()
    }
}

// --- Response Schemas (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Returned by every admin create endpoint (201).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatedResponse {
    pub message: String,
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct DepartmentBrief {
    pub id: i64,
    pub name: String,
    pub short_name: String,
}

impl From<&Department> for DepartmentBrief {
    fn from(d: &Department) -> Self {
        Self {
            id: d.id,
            name: d.name.clone(),
            short_name: d.short_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SectionBrief {
    pub id: i64,
    pub section_code: String,
}

/// ProfileResponse
///
/// The caller's own profile (GET /profile).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub college_id: Option<String>,
    pub admission_year: Option<i32>,
    pub department: Option<DepartmentBrief>,
    pub section: Option<SectionBrief>,
    pub departments_taught: Vec<DepartmentBrief>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PublicUser {
    pub username: String,
    pub role: Role,
    pub department_name: Option<String>,
}

/// PublicProfileResponse
///
/// Anonymous view of a user and the notes they uploaded (GET /users/{username}).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PublicProfileResponse {
    pub user: PublicUser,
    pub notes: Vec<NoteResponse>,
}

/// UserSummary
///
/// Row of the admin user listing. Students carry their section, professors the departments
/// they teach; the other field is omitted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departments_taught: Option<Vec<DepartmentBrief>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DepartmentResponse {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub course_id: i64,
    pub course_short_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SectionResponse {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub department_id: i64,
    pub academic_session_id: i64,
    pub section_code: String,
    pub department_name: String,
    pub session_name: String,
}

/// NoteResponse
///
/// A note enriched with its author's username and section links, as returned by every
/// note-reading endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NoteResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file_url: String,
    pub subject: String,
    pub semester: i32,
    pub academic_year: String,
    pub is_verified: bool,
    pub user_id: i64,
    pub author_username: String,
    pub department_id: Option<i64>,
    pub section_ids: Vec<i64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl NoteResponse {
    pub fn from_note(note: Note, author_username: String, section_ids: Vec<i64>) -> Self {
        Self {
            id: note.id,
            title: note.title,
            description: note.description,
            file_url: note.file_url,
            subject: note.subject,
            semester: note.semester,
            academic_year: note.academic_year,
            is_verified: note.is_verified,
            user_id: note.user_id,
            author_username,
            department_id: note.department_id,
            section_ids,
            created_at: note.created_at,
        }
    }
}

/// NotePage
///
/// One page of the public note listing plus the counts needed to render a pager.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NotePage {
    pub notes: Vec<NoteResponse>,
    pub total_pages: i64,
    pub current_page: i64,
    pub total_notes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UploadNoteResponse {
    pub message: String,
    pub file_url: String,
    pub note: NoteResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateNoteResponse {
    pub message: String,
    pub note: NoteResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RecentUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RecentNote {
    pub id: i64,
    pub title: String,
    pub author: String,
}

/// AdminDashboardStats
///
/// Output schema for the administrative statistics dashboard (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub total_notes: i64,
    pub recent_users: Vec<RecentUser>,
    pub recent_notes: Vec<RecentNote>,
}

/// LogResponse
///
/// One activity-log row as shown in the admin panel. `username` is "System" when the action
/// had no resolvable actor.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LogResponse {
    pub id: i64,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub action: String,
    pub details: Option<String>,
}
