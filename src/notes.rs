//! Note lifecycle: upload, listing, author edits and moderated deletion.

use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{NewNote, Note, NotePage, NoteResponse, Role, UpdateNoteRequest},
    repository::{NoteQuery, UnitOfWork},
    storage::StorageService,
};

pub const PAGE_SIZE: i64 = 10;
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// UploadedFile
///
/// The `file` part of an upload form, fully buffered.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// NoteUpload
///
/// Raw multipart fields of `POST /notes/upload`, validated by `upload`.
#[derive(Debug, Clone, Default)]
pub struct NoteUpload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub department_id: Option<String>,
    pub section_ids: Option<String>,
    pub file: Option<UploadedFile>,
}

/// Lower-cased extension of `filename` if it is on the allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Number of pages needed for `total` notes.
pub fn total_pages(total: i64) -> i64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_id_list(raw: &str) -> AppResult<Vec<i64>> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part.parse().map_err(|_| {
            AppError::Validation("section_ids must be a comma-separated list of integers".to_string())
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Enriches a note with its author's username and its section links.
pub async fn to_response(tx: &mut dyn UnitOfWork, note: Note) -> AppResult<NoteResponse> {
    let author = tx
        .user_by_id(note.user_id)
        .await?
        .map(|u| u.username)
        .unwrap_or_else(|| "Unknown".to_string());
    let section_ids = tx.note_section_ids(note.id).await?;
    Ok(NoteResponse::from_note(note, author, section_ids))
}

/// upload
///
/// Validates the form, stores the file, then inserts the note. Notes from professors are
/// verified on creation. If the insert fails the stored file is removed again.
pub async fn upload(
    tx: &mut dyn UnitOfWork,
    storage: &dyn StorageService,
    caller: AuthUser,
    form: NoteUpload,
) -> AppResult<Note> {
    let file = form
        .file
        .ok_or_else(|| AppError::Validation("No file part".to_string()))?;
    if file.filename.is_empty() {
        return Err(AppError::Validation("No selected file".to_string()));
    }
    let extension = allowed_extension(&file.filename).ok_or_else(|| {
        AppError::Validation("File type not allowed. Accepted types are PDF, PNG, and JPG.".to_string())
    })?;

    let (Some(title), Some(subject), Some(semester), Some(academic_year)) = (
        present(form.title),
        present(form.subject),
        present(form.semester),
        present(form.academic_year),
    ) else {
        return Err(AppError::Validation("Missing required form fields".to_string()));
    };
    let semester: i32 = semester
        .parse()
        .map_err(|_| AppError::Validation("semester must be an integer".to_string()))?;

    let department_id = match present(form.department_id) {
        Some(raw) => {
            let id: i64 = raw
                .parse()
                .map_err(|_| AppError::Validation("department_id must be an integer".to_string()))?;
            if tx.department_by_id(id).await?.is_none() {
                return Err(AppError::NotFound("Department not found".to_string()));
            }
            Some(id)
        }
        None => None,
    };

    let section_ids = match present(form.section_ids) {
        Some(raw) => parse_id_list(&raw)?,
        None => Vec::new(),
    };
    for id in &section_ids {
        if tx.section_by_id(*id).await?.is_none() {
            return Err(AppError::NotFound(format!("Section {} not found", id)));
        }
    }

    let key = format!("{}.{}", Uuid::new_v4(), extension);
    let file_url = storage
        .store(&key, content_type_for(&extension), file.bytes)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "object store rejected note upload");
            AppError::Upstream("Failed to upload file to storage".to_string())
        })?;

    let inserted = async {
        let note = tx
            .insert_note(NewNote {
                title,
                description: present(form.description),
                file_url: file_url.clone(),
                subject,
                semester,
                academic_year,
                is_verified: caller.role == Role::Professor,
                user_id: caller.id,
                department_id,
            })
            .await?;
        tx.set_note_sections(note.id, &section_ids).await?;
        Ok::<_, AppError>(note)
    }
    .await;

    match inserted {
        Ok(note) => Ok(note),
        Err(e) => {
            discard_upload(storage, &file_url).await;
            Err(e)
        }
    }
}

/// Best-effort removal of a file whose note never made it into storage.
pub async fn discard_upload(storage: &dyn StorageService, file_url: &str) {
    if let Err(e) = storage.remove(file_url).await {
        tracing::warn!(file_url, error = %e, "failed to remove orphaned upload");
    }
}

/// list
///
/// One page of the public listing, newest first. Pages below 1, past the end, or too large to
/// turn into an offset are empty but still report the totals.
pub async fn list(tx: &mut dyn UnitOfWork, query: &NoteQuery, page: i64) -> AppResult<NotePage> {
    let offset = (page >= 1)
        .then(|| page.checked_sub(1).and_then(|p| p.checked_mul(PAGE_SIZE)))
        .flatten();
    let (notes, total) = match offset {
        Some(offset) => tx.query_notes(query, PAGE_SIZE, offset).await?,
        None => {
            let (_, total) = tx.query_notes(query, 0, 0).await?;
            (Vec::new(), total)
        }
    };

    let mut responses = Vec::with_capacity(notes.len());
    for note in notes {
        responses.push(to_response(tx, note).await?);
    }

    Ok(NotePage {
        notes: responses,
        total_pages: total_pages(total),
        current_page: page,
        total_notes: total,
    })
}

pub async fn get(tx: &mut dyn UnitOfWork, id: i64) -> AppResult<NoteResponse> {
    let note = tx
        .note_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Note not found".to_string()))?;
    to_response(tx, note).await
}

pub async fn my_notes(tx: &mut dyn UnitOfWork, user_id: i64) -> AppResult<Vec<NoteResponse>> {
    let mut responses = Vec::new();
    for note in tx.notes_by_author(user_id).await? {
        responses.push(to_response(tx, note).await?);
    }
    Ok(responses)
}

/// update
///
/// Partial edit. Only the author may edit; moderators get no override here.
pub async fn update(tx: &mut dyn UnitOfWork, caller: AuthUser, id: i64, req: UpdateNoteRequest) -> AppResult<Note> {
    let mut note = tx
        .note_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Note not found".to_string()))?;
    if note.user_id != caller.id {
        return Err(AppError::Forbidden(
            "Forbidden: You do not have permission to edit this note".to_string(),
        ));
    }
    if req.is_empty() {
        return Err(AppError::Validation("No data provided".to_string()));
    }

    for (field, value) in [
        ("title", &req.title),
        ("subject", &req.subject),
        ("academic_year", &req.academic_year),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(AppError::Validation(format!("{} must not be empty", field)));
        }
    }

    if let Some(title) = req.title {
        note.title = title;
    }
    if let Some(description) = req.description {
        note.description = Some(description);
    }
    if let Some(subject) = req.subject {
        note.subject = subject;
    }
    if let Some(semester) = req.semester {
        note.semester = semester;
    }
    if let Some(academic_year) = req.academic_year {
        note.academic_year = academic_year;
    }

    tx.save_note(&note).await?;
    Ok(note)
}

/// delete
///
/// Author, moderators and super admins may delete. The stored file goes first; if the store
/// reports an error nothing is deleted and the caller gets a 502.
pub async fn delete(
    tx: &mut dyn UnitOfWork,
    storage: &dyn StorageService,
    caller: AuthUser,
    id: i64,
) -> AppResult<Note> {
    let note = tx
        .note_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Note not found".to_string()))?;
    if note.user_id != caller.id && !caller.role.can_moderate_notes() {
        return Err(AppError::Forbidden(
            "Forbidden: You do not have permission to delete this note".to_string(),
        ));
    }

    match storage.remove(&note.file_url).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(note_id = id, "stored file was already gone"),
        Err(e) => {
            tracing::error!(note_id = id, error = %e, "object store failed to delete note file");
            return Err(AppError::Upstream("Failed to delete file from storage".to_string()));
        }
    }

    tx.delete_note(id).await?;
    Ok(note)
}
