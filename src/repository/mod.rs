use crate::{
    error::AppResult,
    models::{
        AcademicSession, Course, Department, LogEntry, NewNote, NewUser, Note, Section, User,
    },
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The persistence entry point shared through `AppState`. Its only job is to open a
/// `UnitOfWork`; every read and write happens inside one, so each request sees a single
/// transaction boundary that it commits (or drops) exactly once.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// NoteQuery
///
/// Filters of the public note listing. Text filters are case-insensitive substring matches.
#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub academic_year: Option<String>,
    pub verified_only: bool,
}

/// UnitOfWork Trait
///
/// One open transaction. Dropping it without calling `commit` rolls everything back.
///
/// The methods are deliberately row-level: cascade checks, session exclusivity and role rules
/// live in the managers, which receive the unit of work as an explicit argument.
#[async_trait]
pub trait UnitOfWork: Send {
    // --- Users ---
    async fn user_by_id(&mut self, id: i64) -> AppResult<Option<User>>;
    async fn user_by_username(&mut self, username: &str) -> AppResult<Option<User>>;
    async fn user_by_email(&mut self, email: &str) -> AppResult<Option<User>>;
    async fn user_by_reset_token(&mut self, token: &str) -> AppResult<Option<User>>;
    async fn insert_user(&mut self, user: NewUser) -> AppResult<User>;
    /// Writes every mutable column of `user` back to its row.
    async fn save_user(&mut self, user: &User) -> AppResult<()>;
    async fn list_users(&mut self) -> AppResult<Vec<User>>;
    /// Newest first (by id).
    async fn recent_users(&mut self, limit: i64) -> AppResult<Vec<User>>;
    async fn count_users(&mut self) -> AppResult<i64>;

    // --- Professor <-> Department join ---
    async fn taught_department_ids(&mut self, user_id: i64) -> AppResult<Vec<i64>>;
    /// Replaces the full set of departments taught by `user_id`.
    async fn set_taught_departments(&mut self, user_id: i64, department_ids: &[i64]) -> AppResult<()>;

    // --- Courses ---
    async fn course_by_id(&mut self, id: i64) -> AppResult<Option<Course>>;
    /// True when another course (not `except`) already uses `name` or `short_name`.
    async fn course_name_taken(&mut self, name: &str, short_name: &str, except: Option<i64>) -> AppResult<bool>;
    async fn list_courses(&mut self) -> AppResult<Vec<Course>>;
    async fn insert_course(&mut self, name: &str, short_name: &str, duration_years: i32) -> AppResult<Course>;
    async fn save_course(&mut self, course: &Course) -> AppResult<()>;
    async fn delete_course(&mut self, id: i64) -> AppResult<()>;
    async fn count_course_departments(&mut self, course_id: i64) -> AppResult<i64>;

    // --- Departments ---
    async fn department_by_id(&mut self, id: i64) -> AppResult<Option<Department>>;
    async fn department_by_short_name(&mut self, short_name: &str) -> AppResult<Option<Department>>;
    async fn list_departments(&mut self) -> AppResult<Vec<Department>>;
    async fn insert_department(&mut self, name: &str, short_name: &str, course_id: i64) -> AppResult<Department>;
    async fn save_department(&mut self, department: &Department) -> AppResult<()>;
    async fn delete_department(&mut self, id: i64) -> AppResult<()>;
    async fn count_department_students(&mut self, department_id: i64) -> AppResult<i64>;
    async fn count_department_professors(&mut self, department_id: i64) -> AppResult<i64>;
    async fn count_department_notes(&mut self, department_id: i64) -> AppResult<i64>;
    async fn count_department_sections(&mut self, department_id: i64) -> AppResult<i64>;

    // --- Academic sessions ---
    async fn session_by_id(&mut self, id: i64) -> AppResult<Option<AcademicSession>>;
    /// Ordered by `year_name` descending.
    async fn list_sessions(&mut self) -> AppResult<Vec<AcademicSession>>;
    async fn insert_session(&mut self, year_name: &str, is_active: bool) -> AppResult<AcademicSession>;
    async fn save_session(&mut self, session: &AcademicSession) -> AppResult<()>;
    async fn delete_session(&mut self, id: i64) -> AppResult<()>;
    /// Sets `is_active = false` on every session except `except`.
    async fn deactivate_sessions(&mut self, except: Option<i64>) -> AppResult<()>;
    async fn count_session_sections(&mut self, session_id: i64) -> AppResult<i64>;

    // --- Sections ---
    async fn section_by_id(&mut self, id: i64) -> AppResult<Option<Section>>;
    async fn list_sections(&mut self) -> AppResult<Vec<Section>>;
    async fn insert_section(&mut self, name: &str, year: i32, department_id: i64, academic_session_id: i64) -> AppResult<Section>;
    async fn save_section(&mut self, section: &Section) -> AppResult<()>;
    /// Also drops the section's note links.
    async fn delete_section(&mut self, id: i64) -> AppResult<()>;
    async fn count_section_students(&mut self, section_id: i64) -> AppResult<i64>;

    // --- Notes ---
    async fn note_by_id(&mut self, id: i64) -> AppResult<Option<Note>>;
    async fn insert_note(&mut self, note: NewNote) -> AppResult<Note>;
    async fn save_note(&mut self, note: &Note) -> AppResult<()>;
    /// Also drops the note's section links.
    async fn delete_note(&mut self, id: i64) -> AppResult<()>;
    /// One page of matching notes, newest first, plus the total number of matches.
    async fn query_notes(&mut self, query: &NoteQuery, limit: i64, offset: i64) -> AppResult<(Vec<Note>, i64)>;
    async fn notes_by_author(&mut self, user_id: i64) -> AppResult<Vec<Note>>;
    async fn count_notes(&mut self) -> AppResult<i64>;
    async fn note_section_ids(&mut self, note_id: i64) -> AppResult<Vec<i64>>;
    async fn set_note_sections(&mut self, note_id: i64, section_ids: &[i64]) -> AppResult<()>;

    // --- Activity log ---
    async fn insert_log(&mut self, user_id: Option<i64>, action: &str, details: Option<&str>) -> AppResult<LogEntry>;
    /// Newest first. `day` matches the UTC calendar date of the timestamp.
    async fn query_logs(&mut self, day: Option<NaiveDate>, action: Option<&str>) -> AppResult<Vec<LogEntry>>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
