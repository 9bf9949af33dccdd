use super::{NoteQuery, Repository, UnitOfWork};
use crate::{
    error::{AppError, AppResult},
    models::{
        AcademicSession, Course, Department, LogEntry, NewNote, NewUser, Note, Section, User,
    },
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// MemoryState
///
/// The whole dataset. Join tables are ordered sets of `(owner_id, target_id)` pairs.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<i64, User>,
    courses: BTreeMap<i64, Course>,
    departments: BTreeMap<i64, Department>,
    sessions: BTreeMap<i64, AcademicSession>,
    sections: BTreeMap<i64, Section>,
    notes: BTreeMap<i64, Note>,
    logs: Vec<LogEntry>,
    professor_departments: BTreeSet<(i64, i64)>,
    note_sections: BTreeSet<(i64, i64)>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// MemoryRepository
///
/// In-process implementation of `Repository`, used by the test suite and for running the API
/// without Postgres. Units of work are serialised: each one holds the store lock for its whole
/// lifetime, mutates a private copy and publishes it on `commit`.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn contains_ci(haystack: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
        None => true,
    }
}

fn newest_first(notes: &mut [Note]) {
    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

impl MemoryUnitOfWork {
    fn check_user_unique(&self, user: &User) -> AppResult<()> {
        let clash = self.working.users.values().any(|u| {
            u.id != user.id
                && (u.username == user.username
                    || u.email == user.email
                    || (u.college_id.is_some() && u.college_id == user.college_id))
        });
        if clash {
            return Err(AppError::Conflict("Resource already exists".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn user_by_id(&mut self, id: i64) -> AppResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn user_by_username(&mut self, username: &str) -> AppResult<Option<User>> {
        Ok(self.working.users.values().find(|u| u.username == username).cloned())
    }

    async fn user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        Ok(self.working.users.values().find(|u| u.email == email).cloned())
    }

    async fn user_by_reset_token(&mut self, token: &str) -> AppResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn insert_user(&mut self, new: NewUser) -> AppResult<User> {
        let user = User {
            id: self.working.allocate_id(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            college_id: new.college_id,
            admission_year: new.admission_year,
            department_id: new.department_id,
            created_at: Utc::now(),
            ..User::default()
        };
        self.check_user_unique(&user)?;
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save_user(&mut self, user: &User) -> AppResult<()> {
        self.check_user_unique(user)?;
        match self.working.users.get_mut(&user.id) {
            Some(row) => {
                *row = user.clone();
                Ok(())
            }
            None => Err(AppError::NotFound("User not found".to_string())),
        }
    }

    async fn list_users(&mut self) -> AppResult<Vec<User>> {
        Ok(self.working.users.values().cloned().collect())
    }

    async fn recent_users(&mut self, limit: i64) -> AppResult<Vec<User>> {
        Ok(self
            .working
            .users
            .values()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_users(&mut self) -> AppResult<i64> {
        Ok(self.working.users.len() as i64)
    }

    async fn taught_department_ids(&mut self, user_id: i64) -> AppResult<Vec<i64>> {
        Ok(self
            .working
            .professor_departments
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, d)| *d)
            .collect())
    }

    async fn set_taught_departments(&mut self, user_id: i64, department_ids: &[i64]) -> AppResult<()> {
        self.working.professor_departments.retain(|(u, _)| *u != user_id);
        for department_id in department_ids {
            self.working.professor_departments.insert((user_id, *department_id));
        }
        Ok(())
    }

    async fn course_by_id(&mut self, id: i64) -> AppResult<Option<Course>> {
        Ok(self.working.courses.get(&id).cloned())
    }

    async fn course_name_taken(&mut self, name: &str, short_name: &str, except: Option<i64>) -> AppResult<bool> {
        Ok(self.working.courses.values().any(|c| {
            Some(c.id) != except && (c.name == name || c.short_name == short_name)
        }))
    }

    async fn list_courses(&mut self) -> AppResult<Vec<Course>> {
        Ok(self.working.courses.values().cloned().collect())
    }

    async fn insert_course(&mut self, name: &str, short_name: &str, duration_years: i32) -> AppResult<Course> {
        if self.course_name_taken(name, short_name, None).await? {
            return Err(AppError::Conflict("Resource already exists".to_string()));
        }
        let course = Course {
            id: self.working.allocate_id(),
            name: name.to_string(),
            short_name: short_name.to_string(),
            duration_years,
        };
        self.working.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn save_course(&mut self, course: &Course) -> AppResult<()> {
        if self.course_name_taken(&course.name, &course.short_name, Some(course.id)).await? {
            return Err(AppError::Conflict("Resource already exists".to_string()));
        }
        self.working.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn delete_course(&mut self, id: i64) -> AppResult<()> {
        self.working.courses.remove(&id);
        Ok(())
    }

    async fn count_course_departments(&mut self, course_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .departments
            .values()
            .filter(|d| d.course_id == course_id)
            .count() as i64)
    }

    async fn department_by_id(&mut self, id: i64) -> AppResult<Option<Department>> {
        Ok(self.working.departments.get(&id).cloned())
    }

    async fn department_by_short_name(&mut self, short_name: &str) -> AppResult<Option<Department>> {
        Ok(self
            .working
            .departments
            .values()
            .find(|d| d.short_name == short_name)
            .cloned())
    }

    async fn list_departments(&mut self) -> AppResult<Vec<Department>> {
        Ok(self.working.departments.values().cloned().collect())
    }

    async fn insert_department(&mut self, name: &str, short_name: &str, course_id: i64) -> AppResult<Department> {
        let department = Department {
            id: self.working.allocate_id(),
            name: name.to_string(),
            short_name: short_name.to_string(),
            course_id,
        };
        self.working.departments.insert(department.id, department.clone());
        Ok(department)
    }

    async fn save_department(&mut self, department: &Department) -> AppResult<()> {
        self.working.departments.insert(department.id, department.clone());
        Ok(())
    }

    async fn delete_department(&mut self, id: i64) -> AppResult<()> {
        self.working.departments.remove(&id);
        Ok(())
    }

    async fn count_department_students(&mut self, department_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| u.department_id == Some(department_id))
            .count() as i64)
    }

    async fn count_department_professors(&mut self, department_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .professor_departments
            .iter()
            .filter(|(_, d)| *d == department_id)
            .count() as i64)
    }

    async fn count_department_notes(&mut self, department_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .notes
            .values()
            .filter(|n| n.department_id == Some(department_id))
            .count() as i64)
    }

    async fn count_department_sections(&mut self, department_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .sections
            .values()
            .filter(|s| s.department_id == department_id)
            .count() as i64)
    }

    async fn session_by_id(&mut self, id: i64) -> AppResult<Option<AcademicSession>> {
        Ok(self.working.sessions.get(&id).cloned())
    }

    async fn list_sessions(&mut self) -> AppResult<Vec<AcademicSession>> {
        let mut sessions: Vec<AcademicSession> = self.working.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.year_name.cmp(&a.year_name));
        Ok(sessions)
    }

    async fn insert_session(&mut self, year_name: &str, is_active: bool) -> AppResult<AcademicSession> {
        let session = AcademicSession {
            id: self.working.allocate_id(),
            year_name: year_name.to_string(),
            is_active,
        };
        self.working.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn save_session(&mut self, session: &AcademicSession) -> AppResult<()> {
        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn delete_session(&mut self, id: i64) -> AppResult<()> {
        self.working.sessions.remove(&id);
        Ok(())
    }

    async fn deactivate_sessions(&mut self, except: Option<i64>) -> AppResult<()> {
        for session in self.working.sessions.values_mut() {
            if Some(session.id) != except {
                session.is_active = false;
            }
        }
        Ok(())
    }

    async fn count_session_sections(&mut self, session_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .sections
            .values()
            .filter(|s| s.academic_session_id == session_id)
            .count() as i64)
    }

    async fn section_by_id(&mut self, id: i64) -> AppResult<Option<Section>> {
        Ok(self.working.sections.get(&id).cloned())
    }

    async fn list_sections(&mut self) -> AppResult<Vec<Section>> {
        Ok(self.working.sections.values().cloned().collect())
    }

    async fn insert_section(&mut self, name: &str, year: i32, department_id: i64, academic_session_id: i64) -> AppResult<Section> {
        let section = Section {
            id: self.working.allocate_id(),
            name: name.to_string(),
            year,
            department_id,
            academic_session_id,
        };
        self.working.sections.insert(section.id, section.clone());
        Ok(section)
    }

    async fn save_section(&mut self, section: &Section) -> AppResult<()> {
        self.working.sections.insert(section.id, section.clone());
        Ok(())
    }

    async fn delete_section(&mut self, id: i64) -> AppResult<()> {
        self.working.note_sections.retain(|(_, s)| *s != id);
        self.working.sections.remove(&id);
        Ok(())
    }

    async fn count_section_students(&mut self, section_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| u.section_id == Some(section_id))
            .count() as i64)
    }

    async fn note_by_id(&mut self, id: i64) -> AppResult<Option<Note>> {
        Ok(self.working.notes.get(&id).cloned())
    }

    async fn insert_note(&mut self, new: NewNote) -> AppResult<Note> {
        let note = Note {
            id: self.working.allocate_id(),
            title: new.title,
            description: new.description,
            file_url: new.file_url,
            subject: new.subject,
            semester: new.semester,
            academic_year: new.academic_year,
            is_verified: new.is_verified,
            user_id: new.user_id,
            department_id: new.department_id,
            created_at: Utc::now(),
        };
        self.working.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn save_note(&mut self, note: &Note) -> AppResult<()> {
        self.working.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn delete_note(&mut self, id: i64) -> AppResult<()> {
        self.working.note_sections.retain(|(n, _)| *n != id);
        self.working.notes.remove(&id);
        Ok(())
    }

    async fn query_notes(&mut self, query: &NoteQuery, limit: i64, offset: i64) -> AppResult<(Vec<Note>, i64)> {
        let mut matching: Vec<Note> = self
            .working
            .notes
            .values()
            .filter(|n| contains_ci(&n.title, &query.title))
            .filter(|n| contains_ci(&n.subject, &query.subject))
            .filter(|n| contains_ci(&n.academic_year, &query.academic_year))
            .filter(|n| !query.verified_only || n.is_verified)
            .cloned()
            .collect();
        newest_first(&mut matching);
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn notes_by_author(&mut self, user_id: i64) -> AppResult<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .working
            .notes
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut notes);
        Ok(notes)
    }

    async fn count_notes(&mut self) -> AppResult<i64> {
        Ok(self.working.notes.len() as i64)
    }

    async fn note_section_ids(&mut self, note_id: i64) -> AppResult<Vec<i64>> {
        Ok(self
            .working
            .note_sections
            .iter()
            .filter(|(n, _)| *n == note_id)
            .map(|(_, s)| *s)
            .collect())
    }

    async fn set_note_sections(&mut self, note_id: i64, section_ids: &[i64]) -> AppResult<()> {
        self.working.note_sections.retain(|(n, _)| *n != note_id);
        for section_id in section_ids {
            self.working.note_sections.insert((note_id, *section_id));
        }
        Ok(())
    }

    async fn insert_log(&mut self, user_id: Option<i64>, action: &str, details: Option<&str>) -> AppResult<LogEntry> {
        let entry = LogEntry {
            id: self.working.allocate_id(),
            timestamp: Utc::now(),
            user_id,
            action: action.to_string(),
            details: details.map(str::to_string),
        };
        self.working.logs.push(entry.clone());
        Ok(entry)
    }

    async fn query_logs(&mut self, day: Option<NaiveDate>, action: Option<&str>) -> AppResult<Vec<LogEntry>> {
        let mut logs: Vec<LogEntry> = self
            .working
            .logs
            .iter()
            .filter(|l| day.is_none_or(|d| l.timestamp.date_naive() == d))
            .filter(|l| action.is_none_or(|a| l.action == a))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(logs)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
