mod common;

use axum::http::StatusCode;
use common::{TestApp, note_fields};
use notehub::{
    MockStorageService,
    models::Role,
    repository::{Repository, UnitOfWork},
};
use serde_json::json;

const PDF: &[u8] = b"%PDF-1.4 test";

// --- Upload ---

#[tokio::test]
async fn student_upload_is_stored_unverified() {
    let app = TestApp::new();
    let (id, token) = app.user_with_token("asha", Role::Student).await;

    let (status, body) = app
        .upload(&token, &note_fields("Linked Lists"), Some(("lists.PDF", PDF)))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["message"], "Note uploaded successfully!");
    assert_eq!(body["note"]["is_verified"], false);
    assert_eq!(body["note"]["user_id"], id);
    assert_eq!(body["note"]["author_username"], "asha");
    assert_eq!(body["note"]["semester"], 3);

    let file_url = body["file_url"].as_str().unwrap();
    assert!(file_url.ends_with(".pdf"));
    assert!(app.storage.contains(file_url).await);
    assert_eq!(app.logged_actions().await, vec!["note_upload"]);
}

#[tokio::test]
async fn professor_upload_is_verified_with_sections() {
    let app = TestApp::new();
    let (_, department_id) = app.seed_department().await;
    let (_, section_id) = app.seed_section(department_id).await;
    let (_, token) = app.user_with_token("prof", Role::Professor).await;

    let department = department_id.to_string();
    let sections = format!("{},{}", section_id, section_id);
    let mut fields = note_fields("Trees");
    fields.push(("department_id", &department));
    fields.push(("section_ids", &sections));
    fields.push(("description", "Binary trees, AVL"));

    let (status, body) = app.upload(&token, &fields, Some(("trees.png", b"png".as_slice()))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["note"]["is_verified"], true);
    assert_eq!(body["note"]["department_id"], department_id);
    assert_eq!(body["note"]["section_ids"], json!([section_id]));
    assert_eq!(body["note"]["description"], "Binary trees, AVL");
}

#[tokio::test]
async fn upload_validation_errors() {
    let app = TestApp::new();
    let (_, token) = app.user_with_token("asha", Role::Student).await;

    let (status, body) = app.upload(&token, &note_fields("No file"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file part");

    let (status, body) = app
        .upload(&token, &note_fields("Word doc"), Some(("notes.docx", b"doc".as_slice())))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File type not allowed. Accepted types are PDF, PNG, and JPG.");

    let (status, body) = app
        .upload(&token, &[("title", "Only title")], Some(("a.pdf", PDF)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required form fields");

    let mut fields = note_fields("Bad semester");
    fields[2] = ("semester", "third");
    let (status, _) = app.upload(&token, &fields, Some(("a.pdf", PDF))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut fields = note_fields("Unknown department");
    fields.push(("department_id", "404"));
    let (status, _) = app.upload(&token, &fields, Some(("a.pdf", PDF))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Nothing was stored for any rejected form.
    assert_eq!(app.storage.object_count().await, 0);
}

#[tokio::test]
async fn upload_requires_authentication() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/notes/upload")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn store_failure_on_upload_is_bad_gateway_and_creates_nothing() {
    let app = TestApp::with_storage(MockStorageService::new_failing());
    let (id, token) = app.user_with_token("asha", Role::Student).await;

    let (status, body) = app
        .upload(&token, &note_fields("Lost"), Some(("a.pdf", PDF)))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to upload file to storage");

    let mut tx = app.repo.begin().await.unwrap();
    assert!(tx.notes_by_author(id).await.unwrap().is_empty());
}

// --- Listing ---

#[tokio::test]
async fn listing_is_paginated_newest_first() {
    let app = TestApp::new();
    let author = app.create_user("asha", Role::Student).await;
    for i in 0..12 {
        app.create_note(author, &format!("Note {}", i), false).await;
    }

    let (status, page) = app.get("/notes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["notes"].as_array().unwrap().len(), 10);
    assert_eq!(page["notes"][0]["title"], "Note 11");
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["current_page"], 1);
    assert_eq!(page["total_notes"], 12);

    let (_, page) = app.get("/notes?page=2", None).await;
    assert_eq!(page["notes"].as_array().unwrap().len(), 2);
    assert_eq!(page["notes"][1]["title"], "Note 0");

    let (_, page) = app.get("/notes?page=3", None).await;
    assert!(page["notes"].as_array().unwrap().is_empty());
    assert_eq!(page["total_notes"], 12);

    let (status, page) = app.get("/notes?page=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page["notes"].as_array().unwrap().is_empty());
    assert_eq!(page["total_pages"], 2);

    let (_, page) = app.get("/notes?page=abc", None).await;
    assert_eq!(page["current_page"], 1);
}

#[tokio::test]
async fn page_number_too_large_for_an_offset_is_an_empty_page() {
    let app = TestApp::new();
    let author = app.create_user("asha", Role::Student).await;
    app.create_note(author, "Only Note", false).await;

    let (status, page) = app
        .get(&format!("/notes?page={}", i64::MAX), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page["notes"].as_array().unwrap().is_empty());
    assert_eq!(page["total_notes"], 1);
    assert_eq!(page["total_pages"], 1);
    assert_eq!(page["current_page"], i64::MAX);
}

#[tokio::test]
async fn wildcard_characters_in_filters_match_literally() {
    let app = TestApp::new();
    let author = app.create_user("asha", Role::Student).await;
    app.create_note(author, "Graph Theory", true).await;
    app.create_note(author, "100% Calculus", true).await;

    let (_, page) = app.get("/notes?title=%25", None).await;
    assert_eq!(page["total_notes"], 1);
    assert_eq!(page["notes"][0]["title"], "100% Calculus");

    let (_, page) = app.get("/notes?title=_", None).await;
    assert_eq!(page["total_notes"], 0);
}

#[tokio::test]
async fn listing_filters_are_case_insensitive_and_combinable() {
    let app = TestApp::new();
    let author = app.create_user("asha", Role::Student).await;
    app.create_note(author, "Graph Theory", true).await;
    app.create_note(author, "Graph Algorithms", false).await;
    app.create_note(author, "Calculus", true).await;

    let (_, page) = app.get("/notes?title=graph", None).await;
    assert_eq!(page["total_notes"], 2);

    let (_, page) = app.get("/notes?title=GRAPH&verified=true", None).await;
    assert_eq!(page["total_notes"], 1);
    assert_eq!(page["notes"][0]["title"], "Graph Theory");

    let (_, page) = app.get("/notes?verified=false", None).await;
    assert_eq!(page["total_notes"], 3);

    let (_, page) = app.get("/notes?subject=math&academic_year=2024", None).await;
    assert_eq!(page["total_notes"], 3);

    let (_, page) = app.get("/notes?subject=physics", None).await;
    assert_eq!(page["total_notes"], 0);
    assert_eq!(page["total_pages"], 0);
}

#[tokio::test]
async fn single_note_and_my_notes() {
    let app = TestApp::new();
    let (asha, token) = app.user_with_token("asha", Role::Student).await;
    let other = app.create_user("ravi", Role::Student).await;
    let mine = app.create_note(asha, "Mine", false).await;
    app.create_note(other, "Theirs", false).await;

    let (status, note) = app.get(&format!("/notes/{}", mine.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(note["title"], "Mine");

    let (status, _) = app.get("/notes/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, notes) = app.get("/notes/my_notes", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notes.as_array().unwrap().len(), 1);
    assert_eq!(notes[0]["title"], "Mine");

    let (status, _) = app.get("/notes/my_notes", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// --- Edit ---

#[tokio::test]
async fn only_the_author_may_edit() {
    let app = TestApp::new();
    let (author, author_token) = app.user_with_token("asha", Role::Student).await;
    let (_, other_token) = app.user_with_token("ravi", Role::Student).await;
    let (_, moderator_token) = app.user_with_token("mod", Role::Moderator).await;
    let note = app.create_note(author, "Draft", false).await;
    let uri = format!("/notes/{}", note.id);

    for token in [&other_token, &moderator_token] {
        let (status, body) = app.put(&uri, Some(token), json!({ "title": "Hijacked" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden: You do not have permission to edit this note");
    }

    let (status, body) = app
        .put(&uri, Some(&author_token), json!({ "title": "Final", "semester": 4 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Note updated successfully");
    assert_eq!(body["note"]["title"], "Final");
    assert_eq!(body["note"]["semester"], 4);
    assert_eq!(body["note"]["subject"], "Mathematics");
    assert_eq!(body["note"]["is_verified"], false);

    assert_eq!(app.logged_actions().await, vec!["note_update"]);
}

#[tokio::test]
async fn edit_edge_cases() {
    let app = TestApp::new();
    let (author, token) = app.user_with_token("asha", Role::Student).await;
    let note = app.create_note(author, "Draft", false).await;
    let uri = format!("/notes/{}", note.id);

    let (status, body) = app.put(&uri, Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No data provided");

    let (status, _) = app.put(&uri, Some(&token), json!({ "title": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.put("/notes/9999", Some(&token), json!({ "title": "x" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.put(&uri, None, json!({ "title": "x" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// --- Delete ---

#[tokio::test]
async fn delete_permissions_and_file_removal() {
    let app = TestApp::new();
    let (_, author_token) = app.user_with_token("asha", Role::Student).await;
    let (_, other_token) = app.user_with_token("ravi", Role::Student).await;
    let (_, moderator_token) = app.user_with_token("mod", Role::Moderator).await;

    let (_, uploaded) = app
        .upload(&author_token, &note_fields("Exam prep"), Some(("prep.jpg", b"jpg".as_slice())))
        .await;
    let id = uploaded["note"]["id"].as_i64().unwrap();
    let file_url = uploaded["file_url"].as_str().unwrap().to_string();
    let uri = format!("/notes/{}", id);

    let (status, body) = app.delete(&uri, Some(&other_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden: You do not have permission to delete this note");
    assert!(app.storage.contains(&file_url).await);

    let (status, body) = app.delete(&uri, Some(&moderator_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Note deleted successfully");
    assert!(!app.storage.contains(&file_url).await);

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.logged_actions().await[0], "note_delete");
}

#[tokio::test]
async fn author_and_super_admin_may_delete() {
    let app = TestApp::new();
    let (author, author_token) = app.user_with_token("asha", Role::Student).await;
    let (_, admin_token) = app.user_with_token("root", Role::SuperAdmin).await;
    let first = app.create_note(author, "One", false).await;
    let second = app.create_note(author, "Two", false).await;

    // The files were never stored; an already-missing object does not block the delete.
    let (status, _) = app.delete(&format!("/notes/{}", first.id), Some(&author_token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.delete(&format!("/notes/{}", second.id), Some(&admin_token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.delete("/notes/9999", Some(&admin_token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_failure_on_delete_keeps_the_note() {
    let app = TestApp::with_storage(MockStorageService::new_failing());
    let (author, token) = app.user_with_token("asha", Role::Student).await;
    let note = app.create_note(author, "Keep me", false).await;

    let (status, body) = app.delete(&format!("/notes/{}", note.id), Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to delete file from storage");

    let mut tx = app.repo.begin().await.unwrap();
    assert!(tx.note_by_id(note.id).await.unwrap().is_some());
    assert!(tx.query_logs(None, Some("note_delete")).await.unwrap().is_empty());
}
