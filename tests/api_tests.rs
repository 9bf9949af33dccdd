use notehub::{
    AppConfig, AppState, MemoryRepository, MockMailer, MockStorageService, create_router,
    models::{NotePage, TokenPairResponse, UploadNoteResponse},
};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub storage: MockStorageService,
}

/// Serves the real router on an ephemeral port, backed by the in-memory repository.
async fn spawn_app() -> TestApp {
    let storage = MockStorageService::new();
    let state = AppState::new(
        Arc::new(MemoryRepository::new()),
        Arc::new(storage.clone()),
        Arc::new(MockMailer::new()),
        AppConfig::default(),
    );
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, storage }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = reqwest::Client::new()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;
    let response = reqwest::get(format!("{}/api-docs/openapi.json", app.address))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let doc: serde_json::Value = response.json().await.unwrap();
    assert!(doc["paths"]["/notes/upload"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer"].is_object());
}

#[tokio::test]
async fn test_signup_login_upload_and_browse() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/signup", app.address))
        .json(&json!({ "username": "asha", "email": "a2024cse10368@imsec.ac.in", "password": "pw-123456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let tokens: TokenPairResponse = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "username": "asha", "password": "pw-123456" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let form = reqwest::multipart::Form::new()
        .text("title", "Operating Systems")
        .text("subject", "OS")
        .text("semester", "5")
        .text("academic_year", "2024-2025")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"%PDF-1.4".to_vec()).file_name("os.pdf"),
        );
    let response = client
        .post(format!("{}/notes/upload", app.address))
        .bearer_auth(&tokens.access_token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let uploaded: UploadNoteResponse = response.json().await.unwrap();
    assert!(app.storage.contains(&uploaded.file_url).await);

    let page: NotePage = client
        .get(format!("{}/notes?title=operating", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page.total_notes, 1);
    assert_eq!(page.notes[0].id, uploaded.note.id);
    assert_eq!(page.notes[0].author_username, "asha");
}

#[tokio::test]
async fn test_upload_over_the_body_limit_is_rejected() {
    let storage = MockStorageService::new();
    let config = AppConfig {
        max_upload_bytes: 1024,
        ..AppConfig::default()
    };
    let state = AppState::new(
        Arc::new(MemoryRepository::new()),
        Arc::new(storage.clone()),
        Arc::new(MockMailer::new()),
        config.clone(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    let client = reqwest::Client::new();
    client
        .post(format!("{}/signup", address))
        .json(&json!({ "username": "asha", "email": "asha@imsec.ac.in", "password": "pw" }))
        .send()
        .await
        .unwrap();
    let tokens: TokenPairResponse = client
        .post(format!("{}/login", address))
        .json(&json!({ "username": "asha", "password": "pw" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let form = reqwest::multipart::Form::new()
        .text("title", "Huge")
        .text("subject", "OS")
        .text("semester", "5")
        .text("academic_year", "2024-2025")
        .part(
            "file",
            reqwest::multipart::Part::bytes(vec![0u8; 8 * 1024]).file_name("big.pdf"),
        );
    let response = client
        .post(format!("{}/notes/upload", address))
        .bearer_auth(&tokens.access_token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(storage.object_count().await, 0);
}
