use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiJson, ApiQuery, AppError, AppResult},
    models::{
        MessageResponse, NotePage, NoteResponse, UpdateNoteRequest, UpdateNoteResponse,
        UploadNoteResponse,
    },
    notes::{self, NoteUpload, UploadedFile},
    repository::NoteQuery,
};

// --- Filter Structs ---

/// NoteFilter
///
/// Query parameters of the public note listing (GET /notes). Text filters are
/// case-insensitive substring matches; `verified=true` keeps only verified notes.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct NoteFilter {
    /// 1-based page number. Anything unparseable falls back to 1.
    pub page: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub academic_year: Option<String>,
    pub verified: Option<String>,
}

impl NoteFilter {
    fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }

    fn query(self) -> NoteQuery {
        let text = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        NoteQuery {
            verified_only: self
                .verified
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            title: text(self.title),
            subject: text(self.subject),
            academic_year: text(self.academic_year),
        }
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::Validation(e.body_text())
}

/// Buffers the upload form. Unknown fields are ignored.
async fn read_upload_form(mut multipart: Multipart) -> AppResult<NoteUpload> {
    let mut form = NoteUpload::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
            form.file = Some(UploadedFile { filename, bytes });
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "title" => form.title = Some(value),
            "description" => form.description = Some(value),
            "subject" => form.subject = Some(value),
            "semester" => form.semester = Some(value),
            "academic_year" => form.academic_year = Some(value),
            "department_id" => form.department_id = Some(value),
            "section_ids" => form.section_ids = Some(value),
            _ => {}
        }
    }
    Ok(form)
}

// --- Handlers ---

/// upload_note
///
/// [Authenticated Route] Multipart upload of a note file plus its classification fields.
/// Notes uploaded by professors are verified immediately.
#[utoipa::path(
    post,
    path = "/notes/upload",
    request_body(content_type = "multipart/form-data", description = "file, title, subject, semester, academic_year, [description, department_id, section_ids]"),
    responses(
        (status = 201, description = "Note uploaded", body = UploadNoteResponse),
        (status = 400, description = "Missing fields or file type not allowed"),
        (status = 502, description = "Object store failure")
    ),
    security(("bearer" = []))
)]
pub async fn upload_note(
    caller: AuthUser,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<UploadNoteResponse>)> {
    let multipart = multipart.map_err(|_| AppError::Validation("No file part".to_string()))?;
    let form = read_upload_form(multipart).await?;

    let mut tx = state.repo.begin().await?;
    let note = notes::upload(tx.as_mut(), state.storage.as_ref(), caller, form).await?;
    let file_url = note.file_url.clone();

    let finished = async {
        let response = notes::to_response(tx.as_mut(), note).await?;
        tx.commit().await?;
        Ok::<_, AppError>(response)
    }
    .await;
    let note = match finished {
        Ok(note) => note,
        Err(e) => {
            notes::discard_upload(state.storage.as_ref(), &file_url).await;
            return Err(e);
        }
    };

    state
        .audit
        .record(
            Some(caller.id),
            "note_upload",
            format!("Note '{}' uploaded by user ID {}.", note.title, caller.id),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(UploadNoteResponse {
            message: "Note uploaded successfully!".to_string(),
            file_url,
            note,
        }),
    ))
}

/// list_notes
///
/// [Public Route] Filtered, paginated listing, newest first, 10 notes per page.
#[utoipa::path(
    get,
    path = "/notes",
    params(NoteFilter),
    responses((status = 200, description = "One page of notes", body = NotePage))
)]
pub async fn list_notes(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<NoteFilter>,
) -> AppResult<Json<NotePage>> {
    let page = filter.page();
    let query = filter.query();
    let mut tx = state.repo.begin().await?;
    Ok(Json(notes::list(tx.as_mut(), &query, page).await?))
}

/// get_note
///
/// [Public Route] A single note by id.
#[utoipa::path(
    get,
    path = "/notes/{id}",
    params(("id" = i64, Path, description = "Note ID")),
    responses(
        (status = 200, description = "Found", body = NoteResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<NoteResponse>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(notes::get(tx.as_mut(), id).await?))
}

/// get_my_notes
///
/// [Authenticated Route] Every note uploaded by the caller, newest first.
#[utoipa::path(
    get,
    path = "/notes/my_notes",
    responses((status = 200, description = "My notes", body = [NoteResponse])),
    security(("bearer" = []))
)]
pub async fn get_my_notes(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<NoteResponse>>> {
    let mut tx = state.repo.begin().await?;
    Ok(Json(notes::my_notes(tx.as_mut(), id).await?))
}

/// update_note
///
/// [Authenticated Route] Partial edit by the note's author.
#[utoipa::path(
    put,
    path = "/notes/{id}",
    params(("id" = i64, Path, description = "Note ID")),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Updated", body = UpdateNoteResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn update_note(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateNoteRequest>,
) -> AppResult<Json<UpdateNoteResponse>> {
    let mut tx = state.repo.begin().await?;
    let note = notes::update(tx.as_mut(), caller, id, payload).await?;
    let note = notes::to_response(tx.as_mut(), note).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(caller.id),
            "note_update",
            format!("Note ID {} updated by user ID {}.", id, caller.id),
        )
        .await;

    Ok(Json(UpdateNoteResponse {
        message: "Note updated successfully".to_string(),
        note,
    }))
}

/// delete_note
///
/// [Authenticated Route] Deletes a note and its stored file. Allowed for the author,
/// moderators and super admins.
#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(("id" = i64, Path, description = "Note ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Not Found"),
        (status = 502, description = "Object store failure, nothing deleted")
    ),
    security(("bearer" = []))
)]
pub async fn delete_note(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let mut tx = state.repo.begin().await?;
    notes::delete(tx.as_mut(), state.storage.as_ref(), caller, id).await?;
    tx.commit().await?;

    state
        .audit
        .record(
            Some(caller.id),
            "note_delete",
            format!("Note ID {} deleted by user ID {}.", id, caller.id),
        )
        .await;

    Ok(Json(MessageResponse::new("Note deleted successfully")))
}
