#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use notehub::{
    AppConfig, AppState, MemoryRepository, MockMailer, MockStorageService, create_router,
    auth::{self, TokenType},
    mailer::SentMail,
    models::{NewNote, NewUser, Note, Role},
    repository::{Repository, UnitOfWork},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "password123";
const BOUNDARY: &str = "notehub-test-boundary";

/// TestApp
///
/// The full router over the in-memory repository, the mock object store and the mock mailer.
/// The test keeps handles to all three to seed data and inspect side effects.
///
/// The memory repository serialises units of work, so a test must commit or drop its own
/// unit of work before sending the next request.
pub struct TestApp {
    pub router: Router,
    pub repo: MemoryRepository,
    pub storage: MockStorageService,
    pub mailer: MockMailer,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(MockStorageService::new())
    }

    pub fn with_storage(storage: MockStorageService) -> Self {
        let repo = MemoryRepository::new();
        let mailer = MockMailer::new();
        let config = AppConfig::default();
        let state = AppState::new(
            Arc::new(repo.clone()),
            Arc::new(storage.clone()),
            Arc::new(mailer.clone()),
            config.clone(),
        );

        Self {
            router: create_router(state),
            repo,
            storage,
            mailer,
            config,
        }
    }

    /// Sends a request and returns the status plus the body as JSON (`Value::String` for plain
    /// text bodies, `Value::Null` for empty ones).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Posts a multipart upload form to `/notes/upload`.
    pub async fn upload(&self, token: &str, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/notes/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(request).await
    }

    /// Inserts a user with the given role directly into storage. Password is `PASSWORD`.
    pub async fn create_user(&self, username: &str, role: Role) -> i64 {
        let mut tx = self.repo.begin().await.unwrap();
        let mut user = tx
            .insert_user(NewUser {
                username: username.to_string(),
                email: format!("{}@imsec.ac.in", username),
                password_hash: auth::hash_password(PASSWORD).unwrap(),
                college_id: None,
                admission_year: None,
                department_id: None,
            })
            .await
            .unwrap();
        user.role = role;
        tx.save_user(&user).await.unwrap();
        tx.commit().await.unwrap();
        user.id
    }

    /// An access token carrying the role claim, as issued at login.
    pub fn token_for(&self, user_id: i64, role: Role) -> String {
        auth::issue_token(&self.config.jwt_secret, user_id, TokenType::Access, Some(role)).unwrap()
    }

    /// Creates a user and returns `(id, access token)`.
    pub async fn user_with_token(&self, username: &str, role: Role) -> (i64, String) {
        let id = self.create_user(username, role).await;
        (id, self.token_for(id, role))
    }

    pub async fn create_note(&self, author: i64, title: &str, verified: bool) -> Note {
        let mut tx = self.repo.begin().await.unwrap();
        let note = tx
            .insert_note(NewNote {
                title: title.to_string(),
                description: None,
                file_url: format!("http://localhost:9000/mock-bucket/{}.pdf", title.replace(' ', "-")),
                subject: "Mathematics".to_string(),
                semester: 3,
                academic_year: "2024-2025".to_string(),
                is_verified: verified,
                user_id: author,
                department_id: None,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        note
    }

    /// Course "B.Tech" with department "CSE". Returns `(course_id, department_id)`.
    pub async fn seed_department(&self) -> (i64, i64) {
        let mut tx = self.repo.begin().await.unwrap();
        let course = tx.insert_course("Bachelor of Technology", "B.Tech", 4).await.unwrap();
        let department = tx
            .insert_department("Computer Science", "CSE", course.id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (course.id, department.id)
    }

    /// An active session with one section "A" of year 3 in `department_id`. Returns
    /// `(session_id, section_id)`.
    pub async fn seed_section(&self, department_id: i64) -> (i64, i64) {
        let mut tx = self.repo.begin().await.unwrap();
        let session = tx.insert_session("2024-2025", true).await.unwrap();
        let section = tx
            .insert_section("A", 3, department_id, session.id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (session.id, section.id)
    }

    /// Actions of the activity log, newest first.
    pub async fn logged_actions(&self) -> Vec<String> {
        let mut tx = self.repo.begin().await.unwrap();
        tx.query_logs(None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect()
    }

    /// Waits until the background password-reset task has sent `count` mails. The task writes
    /// its audit entry first, so the log is complete once this returns.
    pub async fn wait_for_mails(&self, count: usize) -> Vec<SentMail> {
        for _ in 0..200 {
            let sent = self.mailer.sent().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.mailer.sent().await
    }
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// The standard note fields of an upload form.
pub fn note_fields(title: &str) -> Vec<(&str, &str)> {
    vec![
        ("title", title),
        ("subject", "Data Structures"),
        ("semester", "3"),
        ("academic_year", "2024-2025"),
    ]
}
