//! PostgreSQL persistence.
//!
//! Expected schema (migrations are managed outside this crate):
//!
//! - `users` (id BIGSERIAL, username/email/college_id UNIQUE, password_hash, role TEXT,
//!   admission_year, department_id -> departments, section_id -> sections, reset_token,
//!   reset_token_expires_at, created_at)
//! - `courses` (id, name UNIQUE, short_name UNIQUE, duration_years)
//! - `departments` (id, name, short_name, course_id -> courses)
//! - `academic_sessions` (id, year_name, is_active)
//! - `sections` (id, name, year, department_id -> departments, academic_session_id -> academic_sessions)
//! - `notes` (id, title, description, file_url, subject, semester, academic_year, is_verified,
//!   user_id -> users, department_id -> departments, created_at)
//! - `professor_departments` (user_id, department_id), `note_sections` (note_id, section_id)
//! - `logs` (id, timestamp, user_id NULL -> users, action, details)

use super::{NoteQuery, Repository, UnitOfWork};
use crate::{
    error::AppResult,
    models::{
        AcademicSession, Course, Department, LogEntry, NewNote, NewUser, Note, Section, User,
    },
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, college_id, admission_year, \
     department_id, section_id, reset_token, reset_token_expires_at, created_at";

const NOTE_COLUMNS: &str = "id, title, description, file_url, subject, semester, academic_year, \
     is_verified, user_id, department_id, created_at";

/// Escapes `\`, `%` and `_` so a filter value matches literally inside `ILIKE ... ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// PostgresUnitOfWork
///
/// Wraps one database transaction. sqlx rolls it back when dropped uncommitted.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn count(&mut self, sql: &str, id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(sql).bind(id).fetch_one(&mut *self.tx).await?;
        Ok(count)
    }

    async fn user_where(&mut self, condition: &str, value: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {condition} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    // --- Users ---

    async fn user_by_id(&mut self, id: i64) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn user_by_username(&mut self, username: &str) -> AppResult<Option<User>> {
        self.user_where("username", username).await
    }

    async fn user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        self.user_where("email", email).await
    }

    async fn user_by_reset_token(&mut self, token: &str) -> AppResult<Option<User>> {
        self.user_where("reset_token", token).await
    }

    async fn insert_user(&mut self, new: NewUser) -> AppResult<User> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role, college_id, admission_year, department_id, created_at) \
             VALUES ($1, $2, $3, 'student', $4, $5, $6, NOW()) RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(new.username)
            .bind(new.email)
            .bind(new.password_hash)
            .bind(new.college_id)
            .bind(new.admission_year)
            .bind(new.department_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn save_user(&mut self, user: &User) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET username = $2, email = $3, password_hash = $4, role = $5, college_id = $6, \
             admission_year = $7, department_id = $8, section_id = $9, reset_token = $10, \
             reset_token_expires_at = $11 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.college_id)
        .bind(user.admission_year)
        .bind(user.department_id)
        .bind(user.section_id)
        .bind(&user.reset_token)
        .bind(user.reset_token_expires_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_users(&mut self) -> AppResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&mut *self.tx).await?)
    }

    async fn recent_users(&mut self, limit: i64) -> AppResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id DESC LIMIT $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn count_users(&mut self) -> AppResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.tx)
            .await?)
    }

    // --- Professor <-> Department ---

    async fn taught_department_ids(&mut self, user_id: i64) -> AppResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT department_id FROM professor_departments WHERE user_id = $1 ORDER BY department_id",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn set_taught_departments(&mut self, user_id: i64, department_ids: &[i64]) -> AppResult<()> {
        sqlx::query("DELETE FROM professor_departments WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        if !department_ids.is_empty() {
            sqlx::query(
                "INSERT INTO professor_departments (user_id, department_id) SELECT $1, UNNEST($2::BIGINT[])",
            )
            .bind(user_id)
            .bind(department_ids)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    // --- Courses ---

    async fn course_by_id(&mut self, id: i64) -> AppResult<Option<Course>> {
        Ok(sqlx::query_as::<_, Course>(
            "SELECT id, name, short_name, duration_years FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn course_name_taken(&mut self, name: &str, short_name: &str, except: Option<i64>) -> AppResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM courses WHERE (name = $1 OR short_name = $2) AND ($3::BIGINT IS NULL OR id <> $3))",
        )
        .bind(name)
        .bind(short_name)
        .bind(except)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn list_courses(&mut self) -> AppResult<Vec<Course>> {
        Ok(sqlx::query_as::<_, Course>(
            "SELECT id, name, short_name, duration_years FROM courses ORDER BY id",
        )
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_course(&mut self, name: &str, short_name: &str, duration_years: i32) -> AppResult<Course> {
        Ok(sqlx::query_as::<_, Course>(
            "INSERT INTO courses (name, short_name, duration_years) VALUES ($1, $2, $3) \
             RETURNING id, name, short_name, duration_years",
        )
        .bind(name)
        .bind(short_name)
        .bind(duration_years)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn save_course(&mut self, course: &Course) -> AppResult<()> {
        sqlx::query("UPDATE courses SET name = $2, short_name = $3, duration_years = $4 WHERE id = $1")
            .bind(course.id)
            .bind(&course.name)
            .bind(&course.short_name)
            .bind(course.duration_years)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_course(&mut self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_course_departments(&mut self, course_id: i64) -> AppResult<i64> {
        self.count("SELECT COUNT(*) FROM departments WHERE course_id = $1", course_id)
            .await
    }

    // --- Departments ---

    async fn department_by_id(&mut self, id: i64) -> AppResult<Option<Department>> {
        Ok(sqlx::query_as::<_, Department>(
            "SELECT id, name, short_name, course_id FROM departments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn department_by_short_name(&mut self, short_name: &str) -> AppResult<Option<Department>> {
        Ok(sqlx::query_as::<_, Department>(
            "SELECT id, name, short_name, course_id FROM departments WHERE short_name = $1 ORDER BY id LIMIT 1",
        )
        .bind(short_name)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn list_departments(&mut self) -> AppResult<Vec<Department>> {
        Ok(sqlx::query_as::<_, Department>(
            "SELECT id, name, short_name, course_id FROM departments ORDER BY id",
        )
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_department(&mut self, name: &str, short_name: &str, course_id: i64) -> AppResult<Department> {
        Ok(sqlx::query_as::<_, Department>(
            "INSERT INTO departments (name, short_name, course_id) VALUES ($1, $2, $3) \
             RETURNING id, name, short_name, course_id",
        )
        .bind(name)
        .bind(short_name)
        .bind(course_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn save_department(&mut self, department: &Department) -> AppResult<()> {
        sqlx::query("UPDATE departments SET name = $2, short_name = $3, course_id = $4 WHERE id = $1")
            .bind(department.id)
            .bind(&department.name)
            .bind(&department.short_name)
            .bind(department.course_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_department(&mut self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM departments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_department_students(&mut self, department_id: i64) -> AppResult<i64> {
        self.count("SELECT COUNT(*) FROM users WHERE department_id = $1", department_id)
            .await
    }

    async fn count_department_professors(&mut self, department_id: i64) -> AppResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM professor_departments WHERE department_id = $1",
            department_id,
        )
        .await
    }

    async fn count_department_notes(&mut self, department_id: i64) -> AppResult<i64> {
        self.count("SELECT COUNT(*) FROM notes WHERE department_id = $1", department_id)
            .await
    }

    async fn count_department_sections(&mut self, department_id: i64) -> AppResult<i64> {
        self.count("SELECT COUNT(*) FROM sections WHERE department_id = $1", department_id)
            .await
    }

    // --- Academic sessions ---

    async fn session_by_id(&mut self, id: i64) -> AppResult<Option<AcademicSession>> {
        Ok(sqlx::query_as::<_, AcademicSession>(
            "SELECT id, year_name, is_active FROM academic_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn list_sessions(&mut self) -> AppResult<Vec<AcademicSession>> {
        Ok(sqlx::query_as::<_, AcademicSession>(
            "SELECT id, year_name, is_active FROM academic_sessions ORDER BY year_name DESC",
        )
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_session(&mut self, year_name: &str, is_active: bool) -> AppResult<AcademicSession> {
        Ok(sqlx::query_as::<_, AcademicSession>(
            "INSERT INTO academic_sessions (year_name, is_active) VALUES ($1, $2) RETURNING id, year_name, is_active",
        )
        .bind(year_name)
        .bind(is_active)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn save_session(&mut self, session: &AcademicSession) -> AppResult<()> {
        sqlx::query("UPDATE academic_sessions SET year_name = $2, is_active = $3 WHERE id = $1")
            .bind(session.id)
            .bind(&session.year_name)
            .bind(session.is_active)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_session(&mut self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM academic_sessions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn deactivate_sessions(&mut self, except: Option<i64>) -> AppResult<()> {
        sqlx::query(
            "UPDATE academic_sessions SET is_active = false WHERE is_active AND ($1::BIGINT IS NULL OR id <> $1)",
        )
        .bind(except)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn count_session_sections(&mut self, session_id: i64) -> AppResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM sections WHERE academic_session_id = $1",
            session_id,
        )
        .await
    }

    // --- Sections ---

    async fn section_by_id(&mut self, id: i64) -> AppResult<Option<Section>> {
        Ok(sqlx::query_as::<_, Section>(
            "SELECT id, name, year, department_id, academic_session_id FROM sections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn list_sections(&mut self) -> AppResult<Vec<Section>> {
        Ok(sqlx::query_as::<_, Section>(
            "SELECT id, name, year, department_id, academic_session_id FROM sections ORDER BY id",
        )
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_section(&mut self, name: &str, year: i32, department_id: i64, academic_session_id: i64) -> AppResult<Section> {
        Ok(sqlx::query_as::<_, Section>(
            "INSERT INTO sections (name, year, department_id, academic_session_id) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, year, department_id, academic_session_id",
        )
        .bind(name)
        .bind(year)
        .bind(department_id)
        .bind(academic_session_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn save_section(&mut self, section: &Section) -> AppResult<()> {
        sqlx::query(
            "UPDATE sections SET name = $2, year = $3, department_id = $4, academic_session_id = $5 WHERE id = $1",
        )
        .bind(section.id)
        .bind(&section.name)
        .bind(section.year)
        .bind(section.department_id)
        .bind(section.academic_session_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_section(&mut self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM note_sections WHERE section_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM sections WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_section_students(&mut self, section_id: i64) -> AppResult<i64> {
        self.count("SELECT COUNT(*) FROM users WHERE section_id = $1", section_id)
            .await
    }

    // --- Notes ---

    async fn note_by_id(&mut self, id: i64) -> AppResult<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1");
        Ok(sqlx::query_as::<_, Note>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_note(&mut self, new: NewNote) -> AppResult<Note> {
        let sql = format!(
            "INSERT INTO notes (title, description, file_url, subject, semester, academic_year, is_verified, user_id, department_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) RETURNING {NOTE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Note>(&sql)
            .bind(new.title)
            .bind(new.description)
            .bind(new.file_url)
            .bind(new.subject)
            .bind(new.semester)
            .bind(new.academic_year)
            .bind(new.is_verified)
            .bind(new.user_id)
            .bind(new.department_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn save_note(&mut self, note: &Note) -> AppResult<()> {
        sqlx::query(
            "UPDATE notes SET title = $2, description = $3, subject = $4, semester = $5, \
             academic_year = $6, is_verified = $7, department_id = $8 WHERE id = $1",
        )
        .bind(note.id)
        .bind(&note.title)
        .bind(&note.description)
        .bind(&note.subject)
        .bind(note.semester)
        .bind(&note.academic_year)
        .bind(note.is_verified)
        .bind(note.department_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_note(&mut self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM note_sections WHERE note_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// query_notes
    ///
    /// Builds the filter once with `QueryBuilder` and runs it twice: a `COUNT(*)` for the pager
    /// and the paged `SELECT`. Every user value goes through `push_bind`.
    async fn query_notes(&mut self, query: &NoteQuery, limit: i64, offset: i64) -> AppResult<(Vec<Note>, i64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &NoteQuery) {
            builder.push(" WHERE TRUE");
            if query.verified_only {
                builder.push(" AND is_verified = true");
            }
            for (column, value) in [
                ("title", &query.title),
                ("subject", &query.subject),
                ("academic_year", &query.academic_year),
            ] {
                if let Some(v) = value {
                    builder.push(format!(" AND {column} ILIKE "));
                    builder.push_bind(format!("%{}%", escape_like(v)));
                    builder.push(" ESCAPE '\\'");
                }
            }
        }

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM notes");
        push_filters(&mut count_builder, query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&mut *self.tx)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {NOTE_COLUMNS} FROM notes"));
        push_filters(&mut builder, query);
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let notes = builder
            .build_query_as::<Note>()
            .fetch_all(&mut *self.tx)
            .await?;

        Ok((notes, total))
    }

    async fn notes_by_author(&mut self, user_id: i64) -> AppResult<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, Note>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn count_notes(&mut self) -> AppResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn note_section_ids(&mut self, note_id: i64) -> AppResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT section_id FROM note_sections WHERE note_id = $1 ORDER BY section_id",
        )
        .bind(note_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn set_note_sections(&mut self, note_id: i64, section_ids: &[i64]) -> AppResult<()> {
        sqlx::query("DELETE FROM note_sections WHERE note_id = $1")
            .bind(note_id)
            .execute(&mut *self.tx)
            .await?;
        if !section_ids.is_empty() {
            sqlx::query(
                "INSERT INTO note_sections (note_id, section_id) SELECT $1, UNNEST($2::BIGINT[])",
            )
            .bind(note_id)
            .bind(section_ids)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    // --- Activity log ---

    async fn insert_log(&mut self, user_id: Option<i64>, action: &str, details: Option<&str>) -> AppResult<LogEntry> {
        Ok(sqlx::query_as::<_, LogEntry>(
            "INSERT INTO logs (timestamp, user_id, action, details) VALUES (NOW(), $1, $2, $3) \
             RETURNING id, timestamp, user_id, action, details",
        )
        .bind(user_id)
        .bind(action)
        .bind(details)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn query_logs(&mut self, day: Option<NaiveDate>, action: Option<&str>) -> AppResult<Vec<LogEntry>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, timestamp, user_id, action, details FROM logs WHERE TRUE",
        );
        if let Some(d) = day {
            builder.push(" AND (timestamp AT TIME ZONE 'UTC')::date = ");
            builder.push_bind(d);
        }
        if let Some(a) = action {
            builder.push(" AND action = ");
            builder.push_bind(a.to_string());
        }
        builder.push(" ORDER BY timestamp DESC, id DESC");
        Ok(builder
            .build_query_as::<LogEntry>()
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100% pure_math"), "100\\% pure\\_math");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
