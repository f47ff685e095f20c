mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn create_and_fetch() {
    let app = TestApp::new();
    let (user, cookie) = app.db.seed_user("maker@example.com").await;

    let response = app
        .post(
            "/api/projects",
            &cookie,
            json!({
                "name": "Todo App",
                "description": "Track chores",
                "main_problem": "People forget things"
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["status"], "new");
    assert_eq!(response.body["user_id"], user.id.to_string());
    assert_eq!(response.body["main_problem"], "People forget things");
    assert!(response.body["prd"].is_null());

    let id = response.body["id"].as_str().unwrap();
    let fetched = app.get(&format!("/api/projects/{}", id), &cookie).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["description"], "Track chores");
}

#[tokio::test]
async fn create_validates_the_name() {
    let app = TestApp::new();
    let (_, cookie) = app.db.seed_user("strict@example.com").await;

    let blank = app.post("/api/projects", &cookie, json!({"name": "   "})).await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
    assert_eq!(blank.body["error"], "Invalid project data");
    assert!(blank.body["details"]["name"].is_string());

    let long = app.post("/api/projects", &cookie, json!({"name": "x".repeat(256)})).await;
    assert_eq!(long.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_is_scoped_paginated_and_searchable() {
    let app = TestApp::new();
    let (_, cookie) = app.db.seed_user("lister@example.com").await;
    let (_, other) = app.db.seed_user("other@example.com").await;
    for name in ["Alpha", "Beta", "Gamma", "Alphabet Soup"] {
        app.create_project(&cookie, name).await;
    }
    app.create_project(&other, "Alpha Other").await;

    let page = app.get("/api/projects?limit=3&sort=name&order=asc", &cookie).await;
    assert_eq!(page.status, StatusCode::OK);
    let names: Vec<&str> = page.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Alpha", "Alphabet Soup", "Beta"]);
    assert_eq!(page.body["pagination"]["total_count"], 4);
    assert_eq!(page.body["pagination"]["page_count"], 2);
    assert_eq!(page.body["pagination"]["current_page"], 1);
    assert_eq!(page.body["pagination"]["per_page"], 3);

    let second = app.get("/api/projects?limit=3&page=2&sort=name&order=asc", &cookie).await;
    assert_eq!(second.body["data"][0]["name"], "Gamma");

    let search = app.get("/api/projects?search=ALPHA", &cookie).await;
    assert_eq!(search.body["pagination"]["total_count"], 2);

    let newest_first = app.get("/api/projects", &cookie).await;
    assert_eq!(newest_first.body["data"][0]["name"], "Alphabet Soup");

    let bad = app.get("/api/projects?limit=500", &cookie).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.body["error"], "Invalid query parameters");
}

#[tokio::test]
async fn update_is_partial() {
    let app = TestApp::new();
    let (_, cookie) = app.db.seed_user("editor@example.com").await;
    let id = app.create_project(&cookie, "Draft").await;
    let uri = format!("/api/projects/{}", id);

    app.send(
        Method::PUT,
        &uri,
        Some(&cookie),
        Some(json!({"description": "First", "out_of_scope": "Mobile"})),
    )
    .await;
    let updated = app
        .send(
            Method::PUT,
            &uri,
            Some(&cookie),
            Some(json!({"name": "Final", "description": null})),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["name"], "Final");
    assert!(updated.body["description"].is_null());
    assert_eq!(updated.body["out_of_scope"], "Mobile");

    let bad_status = app
        .send(Method::PUT, &uri, Some(&cookie), Some(json!({"status": "archived"})))
        .await;
    assert_eq!(bad_status.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_the_project_and_its_questions() {
    let app = TestApp::new();
    let (_, cookie) = app.db.seed_user("cleaner@example.com").await;
    let id = app.create_project(&cookie, "Temporary").await;
    app.send(
        Method::POST,
        &format!("/api/projects/{}/generate-questions?count=2", id),
        Some(&cookie),
        None,
    )
    .await;

    let deleted = app
        .send(Method::DELETE, &format!("/api/projects/{}", id), Some(&cookie), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["success"], true);
    assert!(app.db.project(id).await.is_none());
    assert!(app.db.questions(id).await.is_empty());

    let gone = app.get(&format!("/api/projects/{}", id), &cookie).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}
