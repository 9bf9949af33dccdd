//! Academic hierarchy administration: courses, departments, sessions and sections, plus the
//! placement of users into that hierarchy.
//!
//! Deletes never cascade. Each one checks its dependents explicitly and refuses with a
//! conflict while any remain.

use crate::{
    error::{AppError, AppResult},
    models::{
        AcademicSession, AdminDashboardStats, AssignProfessorDepartmentsRequest, Course,
        CreateCourseRequest, CreateDepartmentRequest, CreateSectionRequest, CreateSessionRequest,
        Department, DepartmentBrief, DepartmentResponse, RecentNote, RecentUser, Role, Section,
        SectionResponse, UpdateCourseRequest, UpdateDepartmentRequest, UpdateSectionRequest,
        UpdateSessionRequest, User, UserSummary,
    },
    repository::{NoteQuery, UnitOfWork},
};

const RECENT_LIMIT: i64 = 5;

fn missing_fields() -> AppError {
    AppError::Validation("Missing required fields".to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// A provided-but-blank text field on update is rejected; `None` keeps the stored value.
fn replace_text(target: &mut String, value: Option<String>, field: &str) -> AppResult<()> {
    if let Some(v) = value {
        let v = v.trim().to_string();
        if v.is_empty() {
            return Err(AppError::Validation(format!("{} must not be empty", field)));
        }
        *target = v;
    }
    Ok(())
}

fn positive_duration(years: i32) -> AppResult<i32> {
    if years <= 0 {
        return Err(AppError::Validation("duration_years must be a positive integer".to_string()));
    }
    Ok(years)
}

async fn course_or_404(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<Course> {
    tx.course_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))
}

async fn department_or_404(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<Department> {
    tx.department_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Department not found".to_string()))
}

async fn session_or_404(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<AcademicSession> {
    tx.session_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Academic session not found".to_string()))
}

async fn section_or_404(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<Section> {
    tx.section_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Section not found".to_string()))
}

async fn user_or_404(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<User> {
    tx.user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// The section code needs the parent's short name.
pub async fn section_code(tx: &mut dyn UnitOfWork, section: &Section) -> AppResult<String> {
    let short_name = tx
        .department_by_id(section.department_id)
        .await?
        .map(|d| d.short_name)
        .unwrap_or_default();
    Ok(section.section_code(&short_name))
}

// --- Courses ---

pub async fn list_courses(tx: &mut dyn UnitOfWork) -> AppResult<Vec<Course>> {
    tx.list_courses().await
}

pub async fn create_course(tx: &mut dyn UnitOfWork, req: CreateCourseRequest) -> AppResult<Course> {
    let (Some(name), Some(short_name), Some(duration)) =
        (non_empty(req.name), non_empty(req.short_name), req.duration_years)
    else {
        return Err(missing_fields());
    };
    let duration = positive_duration(duration)?;

    if tx.course_name_taken(&name, &short_name, None).await? {
        return Err(AppError::Conflict(
            "A course with that name or short name already exists".to_string(),
        ));
    }
    tx.insert_course(&name, &short_name, duration).await
}

pub async fn update_course(tx: &mut dyn UnitOfWork, id: i64, req: UpdateCourseRequest) -> AppResult<Course> {
    let mut course = course_or_404(tx, id).await?;
    replace_text(&mut course.name, req.name, "name")?;
    replace_text(&mut course.short_name, req.short_name, "short_name")?;
    if let Some(years) = req.duration_years {
        course.duration_years = positive_duration(years)?;
    }

    if tx
        .course_name_taken(&course.name, &course.short_name, Some(course.id))
        .await?
    {
        return Err(AppError::Conflict(
            "A course with that name or short name already exists".to_string(),
        ));
    }
    tx.save_course(&course).await?;
    Ok(course)
}

pub async fn delete_course(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<Course> {
    let course = course_or_404(tx, id).await?;
    if tx.count_course_departments(id).await? > 0 {
        return Err(AppError::Conflict(
            "Cannot delete course with associated departments. Please reassign or delete them first."
                .to_string(),
        ));
    }
    tx.delete_course(id).await?;
    Ok(course)
}

// --- Departments ---

pub async fn list_departments(tx: &mut dyn UnitOfWork) -> AppResult<Vec<DepartmentResponse>> {
    let courses = tx.list_courses().await?;
    Ok(tx
        .list_departments()
        .await?
        .into_iter()
        .map(|d| DepartmentResponse {
            course_short_name: courses
                .iter()
                .find(|c| c.id == d.course_id)
                .map(|c| c.short_name.clone())
                .unwrap_or_else(|| "N/A".to_string()),
            id: d.id,
            name: d.name,
            short_name: d.short_name,
            course_id: d.course_id,
        })
        .collect())
}

pub async fn create_department(tx: &mut dyn UnitOfWork, req: CreateDepartmentRequest) -> AppResult<Department> {
    let (Some(name), Some(short_name), Some(course_id)) =
        (non_empty(req.name), non_empty(req.short_name), req.course_id)
    else {
        return Err(missing_fields());
    };
    if tx.course_by_id(course_id).await?.is_none() {
        return Err(AppError::NotFound("Parent course not found".to_string()));
    }
    tx.insert_department(&name, &short_name, course_id).await
}

pub async fn update_department(tx: &mut dyn UnitOfWork, id: i64, req: UpdateDepartmentRequest) -> AppResult<Department> {
    let mut department = department_or_404(tx, id).await?;
    replace_text(&mut department.name, req.name, "name")?;
    replace_text(&mut department.short_name, req.short_name, "short_name")?;
    if let Some(course_id) = req.course_id {
        if tx.course_by_id(course_id).await?.is_none() {
            return Err(AppError::NotFound("Parent course not found".to_string()));
        }
        department.course_id = course_id;
    }
    tx.save_department(&department).await?;
    Ok(department)
}

pub async fn delete_department(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<Department> {
    let department = department_or_404(tx, id).await?;
    let dependents = tx.count_department_students(id).await?
        + tx.count_department_professors(id).await?
        + tx.count_department_notes(id).await?;
    if dependents > 0 {
        return Err(AppError::Conflict(
            "Cannot delete department with associated users or notes.".to_string(),
        ));
    }
    if tx.count_department_sections(id).await? > 0 {
        return Err(AppError::Conflict(
            "Cannot delete department with associated sections. Please delete them first.".to_string(),
        ));
    }
    tx.delete_department(id).await?;
    Ok(department)
}

// --- Academic sessions ---

pub async fn list_sessions(tx: &mut dyn UnitOfWork) -> AppResult<Vec<AcademicSession>> {
    tx.list_sessions().await
}

/// Creating an active session deactivates every other one in the same unit of work.
pub async fn create_session(tx: &mut dyn UnitOfWork, req: CreateSessionRequest) -> AppResult<AcademicSession> {
    let year_name =
        non_empty(req.year_name).ok_or_else(|| AppError::Validation("Year name is required".to_string()))?;
    if req.is_active {
        tx.deactivate_sessions(None).await?;
    }
    tx.insert_session(&year_name, req.is_active).await
}

pub async fn update_session(tx: &mut dyn UnitOfWork, id: i64, req: UpdateSessionRequest) -> AppResult<AcademicSession> {
    let mut session = session_or_404(tx, id).await?;
    replace_text(&mut session.year_name, req.year_name, "year_name")?;
    if let Some(active) = req.is_active {
        if active {
            tx.deactivate_sessions(Some(id)).await?;
        }
        session.is_active = active;
    }
    tx.save_session(&session).await?;
    Ok(session)
}

pub async fn delete_session(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<AcademicSession> {
    let session = session_or_404(tx, id).await?;
    if tx.count_session_sections(id).await? > 0 {
        return Err(AppError::Conflict(
            "Cannot delete session with associated sections. Please delete them first.".to_string(),
        ));
    }
    tx.delete_session(id).await?;
    Ok(session)
}

// --- Sections ---

/// list_sections
///
/// Sorted by session (newest id first), then department, year and name.
pub async fn list_sections(tx: &mut dyn UnitOfWork) -> AppResult<Vec<SectionResponse>> {
    let departments = tx.list_departments().await?;
    let sessions = tx.list_sessions().await?;
    let mut sections = tx.list_sections().await?;
    sections.sort_by(|a, b| {
        b.academic_session_id
            .cmp(&a.academic_session_id)
            .then(a.department_id.cmp(&b.department_id))
            .then(a.year.cmp(&b.year))
            .then(a.name.cmp(&b.name))
    });

    Ok(sections
        .into_iter()
        .map(|s| {
            let department = departments.iter().find(|d| d.id == s.department_id);
            let session = sessions.iter().find(|x| x.id == s.academic_session_id);
            SectionResponse {
                section_code: s.section_code(department.map(|d| d.short_name.as_str()).unwrap_or_default()),
                department_name: department.map(|d| d.name.clone()).unwrap_or_else(|| "N/A".to_string()),
                session_name: session.map(|x| x.year_name.clone()).unwrap_or_else(|| "N/A".to_string()),
                id: s.id,
                name: s.name,
                year: s.year,
                department_id: s.department_id,
                academic_session_id: s.academic_session_id,
            }
        })
        .collect())
}

pub async fn create_section(tx: &mut dyn UnitOfWork, req: CreateSectionRequest) -> AppResult<Section> {
    let (Some(name), Some(year), Some(department_id), Some(session_id)) = (
        non_empty(req.name),
        req.year,
        req.department_id,
        req.academic_session_id,
    ) else {
        return Err(missing_fields());
    };
    department_or_404(tx, department_id).await?;
    session_or_404(tx, session_id).await?;
    tx.insert_section(&name, year, department_id, session_id).await
}

pub async fn update_section(tx: &mut dyn UnitOfWork, id: i64, req: UpdateSectionRequest) -> AppResult<Section> {
    let mut section = section_or_404(tx, id).await?;
    replace_text(&mut section.name, req.name, "name")?;
    if let Some(year) = req.year {
        section.year = year;
    }
    if let Some(department_id) = req.department_id {
        department_or_404(tx, department_id).await?;
        section.department_id = department_id;
    }
    if let Some(session_id) = req.academic_session_id {
        session_or_404(tx, session_id).await?;
        section.academic_session_id = session_id;
    }
    tx.save_section(&section).await?;
    Ok(section)
}

pub async fn delete_section(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<Section> {
    let section = section_or_404(tx, id).await?;
    if tx.count_section_students(id).await? > 0 {
        return Err(AppError::Conflict(
            "Cannot delete section with assigned students.".to_string(),
        ));
    }
    tx.delete_section(id).await?;
    Ok(section)
}

// --- Users ---

pub async fn list_users(tx: &mut dyn UnitOfWork) -> AppResult<Vec<UserSummary>> {
    let departments = tx.list_departments().await?;
    let mut summaries = Vec::new();
    for user in tx.list_users().await? {
        let mut summary = UserSummary {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            section_id: None,
            departments_taught: None,
        };
        match user.role {
            Role::Student => summary.section_id = user.section_id,
            Role::Professor => {
                let taught = tx.taught_department_ids(user.id).await?;
                summary.departments_taught = Some(
                    departments
                        .iter()
                        .filter(|d| taught.contains(&d.id))
                        .map(DepartmentBrief::from)
                        .collect(),
                );
            }
            _ => {}
        }
        summaries.push(summary);
    }
    Ok(summaries)
}

/// change_role
///
/// Leaving the professor role drops every taught department in the same unit of work.
pub async fn change_role(tx: &mut dyn UnitOfWork, user_id: i64, role: Option<String>) -> AppResult<User> {
    let mut user = user_or_404(tx, user_id).await?;
    let new_role: Role = role
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(AppError::Validation)?;

    if user.role == Role::Professor && new_role != Role::Professor {
        tx.set_taught_departments(user.id, &[]).await?;
    }
    user.role = new_role;
    tx.save_user(&user).await?;
    Ok(user)
}

async fn student_or_400(tx: &mut dyn UnitOfWork, user_id: i64) -> AppResult<User> {
    let user = user_or_404(tx, user_id).await?;
    if user.role != Role::Student {
        return Err(AppError::Validation("This user is not a student.".to_string()));
    }
    Ok(user)
}

/// assign_student_department
///
/// Sets or clears (`None`) a student's department. A student placed in a section takes the
/// section's department, so a direct change is refused until the section is cleared.
pub async fn assign_student_department(tx: &mut dyn UnitOfWork, user_id: i64, department_id: Option<i64>) -> AppResult<User> {
    let mut user = student_or_400(tx, user_id).await?;
    if user.section_id.is_some() && department_id != user.department_id {
        return Err(AppError::Validation(
            "Student is assigned to a section; change the section instead.".to_string(),
        ));
    }
    if let Some(id) = department_id {
        department_or_404(tx, id).await?;
    }
    user.department_id = department_id;
    tx.save_user(&user).await?;
    Ok(user)
}

/// assign_student_section
///
/// Setting a section also sets the section's department; clearing it clears both.
pub async fn assign_student_section(tx: &mut dyn UnitOfWork, user_id: i64, section_id: Option<i64>) -> AppResult<User> {
    let mut user = student_or_400(tx, user_id).await?;
    match section_id {
        Some(id) => {
            let section = section_or_404(tx, id).await?;
            user.section_id = Some(section.id);
            user.department_id = Some(section.department_id);
        }
        None => {
            user.section_id = None;
            user.department_id = None;
        }
    }
    tx.save_user(&user).await?;
    Ok(user)
}

/// assign_professor_departments
///
/// Replaces the taught set. Unknown department ids are skipped.
pub async fn assign_professor_departments(
    tx: &mut dyn UnitOfWork,
    user_id: i64,
    req: AssignProfessorDepartmentsRequest,
) -> AppResult<(User, Vec<i64>)> {
    let user = user_or_404(tx, user_id).await?;
    if user.role != Role::Professor {
        return Err(AppError::Validation("This user is not a professor.".to_string()));
    }

    let mut known = Vec::new();
    for id in req.department_ids {
        if known.contains(&id) {
            continue;
        }
        if tx.department_by_id(id).await?.is_some() {
            known.push(id);
        }
    }
    tx.set_taught_departments(user.id, &known).await?;
    Ok((user, known))
}

// --- Dashboard ---

pub async fn dashboard_stats(tx: &mut dyn UnitOfWork) -> AppResult<AdminDashboardStats> {
    let total_users = tx.count_users().await?;
    let total_notes = tx.count_notes().await?;

    let recent_users = tx
        .recent_users(RECENT_LIMIT)
        .await?
        .into_iter()
        .map(|u| RecentUser {
            id: u.id,
            username: u.username,
            email: u.email,
        })
        .collect();

    let (notes, _) = tx.query_notes(&NoteQuery::default(), RECENT_LIMIT, 0).await?;
    let mut recent_notes = Vec::with_capacity(notes.len());
    for note in notes {
        let author = tx
            .user_by_id(note.user_id)
            .await?
            .map(|u| u.username)
            .unwrap_or_else(|| "Unknown".to_string());
        recent_notes.push(RecentNote {
            id: note.id,
            title: note.title,
            author,
        });
    }

    Ok(AdminDashboardStats {
        total_users,
        total_notes,
        recent_users,
        recent_notes,
    })
}
