//! Web API File Tests
//!
//! Integration tests for directory listing, creation, deletion and renaming.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use common::{bearer, error_code, TestApp};
use serde_json::{json, Value};

async fn list(app: &TestApp, token: &str, path: &str) -> Value {
    let response = app
        .server
        .get("/api/files/list")
        .add_query_param("path", path)
        .add_header(AUTHORIZATION, bearer(token))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["data"].clone()
}

#[tokio::test]
async fn test_list_new_user_root_is_empty() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;

    assert_eq!(list(&app, &token, "").await, json!([]));
    assert!(app.user_root("alice").is_dir());
}

#[tokio::test]
async fn test_list_directories_first() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;
    app.write_user_file("alice", "b.txt", b"12345");
    app.write_user_file("alice", "a.txt", b"1");
    app.write_user_file("alice", "zdir/inner.txt", b"x");

    let entries = list(&app, &token, "").await;
    let names: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["zdir", "a.txt", "b.txt"]);
    assert_eq!(entries[0]["isDirectory"], true);
    assert_eq!(entries[2]["size"], 5);
    assert_eq!(entries[2]["path"], "b.txt");

    let inner = list(&app, &token, "zdir").await;
    assert_eq!(inner[0]["path"], "zdir/inner.txt");
}

#[tokio::test]
async fn test_in_progress_merge_is_hidden() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;
    app.write_user_file("alice", ".report.pdf.0b1c.partial", b"half");
    app.write_user_file("alice", "report-draft.pdf", b"draft");

    let entries = list(&app, &token, "").await;
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["name"], "report-draft.pdf");
}

#[tokio::test]
async fn test_users_do_not_see_each_other() {
    let app = TestApp::new().await;
    let alice = app.user_token("alice").await;
    let bob = app.user_token("bob").await;
    app.upload_file(&alice, "mine.txt", b"alice").await;

    assert_eq!(list(&app, &bob, "").await, json!([]));

    let response = app
        .server
        .get("/api/files/list")
        .add_query_param("path", "../alice")
        .add_header(AUTHORIZATION, bearer(&bob))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(error_code(&response), "SANDBOX_VIOLATION");
}

#[tokio::test]
async fn test_staging_area_is_unreachable() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;
    app.start_upload(&token, "pending.bin", b"abcd").await;

    for path in ["../../.temp", "../.temp", ".temp"] {
        let response = app
            .server
            .get("/api/files/list")
            .add_query_param("path", path)
            .add_header(AUTHORIZATION, bearer(&token))
            .await;
        assert!(
            response.status_code() == StatusCode::FORBIDDEN
                || response.status_code() == StatusCode::NOT_FOUND,
            "{} reached the staging area",
            path
        );
    }
}

#[tokio::test]
async fn test_mkdir() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;

    let response = app
        .server
        .post("/api/files/mkdir")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "", "name": "photos"}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["path"], "photos");
    assert!(app.user_root("alice").join("photos").is_dir());

    let response = app
        .server
        .post("/api/files/mkdir")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "", "name": "photos"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    // Separators in the name are stripped, not followed.
    let response = app
        .server
        .post("/api/files/mkdir")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "photos", "name": "../../escape"}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["path"], "photos/escape");

    let response = app
        .server
        .post("/api/files/mkdir")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "../bob", "name": "x"}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;
    app.write_user_file("alice", "a.txt", b"1");
    app.write_user_file("alice", "tree/deep/b.txt", b"2");

    let response = app
        .server
        .delete("/api/files/delete")
        .add_query_param("path", "a.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    assert!(!app.user_root("alice").join("a.txt").exists());

    let response = app
        .server
        .delete("/api/files/delete")
        .add_query_param("path", "tree")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    assert!(!app.user_root("alice").join("tree").exists());

    let response = app
        .server
        .delete("/api/files/delete")
        .add_query_param("path", "tree")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .delete("/api/files/delete")
        .add_query_param("path", "/")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert!(app.user_root("alice").is_dir());
}

#[tokio::test]
async fn test_delete_other_user_is_rejected() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;
    app.create_user("bob").await;
    let victim = app.write_user_file("bob", "keep.txt", b"bob");

    let response = app
        .server
        .delete("/api/files/delete")
        .add_query_param("path", "../bob/keep.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert!(victim.exists());
}

#[tokio::test]
async fn test_rename() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;
    app.write_user_file("alice", "docs/old.txt", b"text");
    app.write_user_file("alice", "docs/taken.txt", b"other");

    let response = app
        .server
        .post("/api/files/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "docs/old.txt", "newName": "new.txt"}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["path"], "docs/new.txt");
    let root = app.user_root("alice");
    assert_eq!(std::fs::read(root.join("docs/new.txt")).unwrap(), b"text");
    assert!(!root.join("docs/old.txt").exists());

    let response = app
        .server
        .post("/api/files/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "docs/new.txt", "newName": "taken.txt"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let response = app
        .server
        .post("/api/files/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "docs/missing.txt", "newName": "x.txt"}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    // The new name cannot move the entry out of its directory.
    let response = app
        .server
        .post("/api/files/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({"path": "docs/new.txt", "newName": "../../../moved.txt"}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["path"], "docs/moved.txt");
}

#[tokio::test]
async fn test_login_and_me() {
    let app = TestApp::new().await;
    app.create_user_with_path("alice", "shared/alice").await;

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({"username": "alice", "password": "wrong-password"}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let token = app.login("alice").await;
    let response = app
        .server
        .get("/api/auth/me")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["role"], "user");
    assert_eq!(body["data"]["storagePath"], "shared/alice");

    app.upload_file(&token, "a.txt", b"abc").await;
    assert!(app.user_root("shared/alice").join("a.txt").is_file());
}
