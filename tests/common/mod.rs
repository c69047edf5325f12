//! Shared helpers for driving the bookshelf router in-process.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use bookshelf::db::Database;
use bookshelf::handler::AppState;
use bookshelf::routes::routes;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Builds the full router over a throwaway in-memory database.
pub async fn build_test_app() -> Router {
    let (app, _db) = build_test_app_with_db().await;
    app
}

/// Same as [`build_test_app`] but also hands back the database so a test can
/// seed rows the HTTP surface cannot produce (e.g. legacy rows without an
/// `available` value).
pub async fn build_test_app_with_db() -> (Router, Arc<Database>) {
    let db = Arc::new(
        Database::new_in_memory()
            .await
            .expect("in-memory database should build"),
    );
    let app = routes().with_state(AppState { db: db.clone() });
    (app, db)
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn delete(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Posts a valid book and returns its generated id.
pub async fn seed_book(app: &Router, title: &str, genre: &str, year: i64) -> i64 {
    let response = post_json(
        app.clone(),
        "/books",
        serde_json::json!({
            "title": title,
            "author": "Seed Author",
            "genre": genre,
            "publicationYear": year,
        }),
    )
    .await;
    let json = body_json(response).await;
    json["book"]["id"].as_i64().expect("created book should have an id")
}
