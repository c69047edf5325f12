use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;

use crate::api::{CreateBookRequest, CreateBookResponse, UpdateBookRequest};
use crate::db::Database;
use crate::error::{ApiError, FieldError};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

fn parse_path_int(field: &'static str, raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(vec![FieldError::new(field, "must be an integer")]))
}

pub async fn healthcheck() -> &'static str {
    info!("got healthcheck request");
    "bookshelf.svc is up"
}

// ============================================================================
// Book Handlers
// ============================================================================

pub async fn create_book(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookRequest>,
) -> Response {
    let input = match payload.validate() {
        Ok(input) => input,
        Err(e) => return e.into_response(),
    };

    match state.db.create_book(&input).await {
        Ok(book) => created(CreateBookResponse {
            message: "book created".to_string(),
            book,
        }),
        Err(e) => {
            tracing::error!("failed to create book. db_error: {}", e);
            ApiError::internal("failed to create book").into_response()
        }
    }
}

pub async fn list_books(State(state): State<AppState>) -> Response {
    match state.db.list_books().await {
        Ok(books) => success(books),
        Err(e) => {
            tracing::error!("failed to list books. db_error: {}", e);
            ApiError::internal("failed to list books").into_response()
        }
    }
}

pub async fn books_by_genre(State(state): State<AppState>, Path(genre): Path<String>) -> Response {
    match state.db.find_by_genre(&genre).await {
        Ok(books) => success(books),
        Err(e) => {
            tracing::error!("failed to get books by genre. db_error: {}", e);
            ApiError::internal("failed to get books by genre").into_response()
        }
    }
}

pub async fn book_by_title(State(state): State<AppState>, Path(title): Path<String>) -> Response {
    match state.db.find_by_title(&title).await {
        Ok(Some(book)) => success(book),
        Ok(None) => ApiError::not_found("book not found").into_response(),
        Err(e) => {
            tracing::error!("failed to get book by title. db_error: {}", e);
            ApiError::internal("failed to get book by title").into_response()
        }
    }
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBookRequest>,
) -> Response {
    let id = match parse_path_int("id", &id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let changes = payload.into_changes();
    match state.db.update_book(id, &changes).await {
        Ok(ack) => success(ack),
        Err(e) => {
            tracing::error!("failed to update book. db_error: {}", e);
            ApiError::internal("failed to update book").into_response()
        }
    }
}

pub async fn delete_book(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_path_int("id", &id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.db.delete_book(id).await {
        Ok(ack) => success(ack),
        Err(e) => {
            tracing::error!("failed to delete book. db_error: {}", e);
            ApiError::internal("failed to delete book").into_response()
        }
    }
}

pub async fn fix_availability(State(state): State<AppState>) -> Response {
    match state.db.backfill_available().await {
        Ok(ack) => {
            info!(
                matched = ack.matched_count,
                "availability backfill completed"
            );
            success(ack)
        }
        Err(e) => {
            tracing::error!("failed to backfill availability. db_error: {}", e);
            ApiError::internal("failed to backfill availability").into_response()
        }
    }
}

pub async fn books_before_year(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> Response {
    let year = match parse_path_int("year", &year) {
        Ok(year) => year,
        Err(e) => return e.into_response(),
    };

    match state.db.find_before_year(year).await {
        Ok(books) => success(books),
        Err(e) => {
            tracing::error!("failed to get books before year. db_error: {}", e);
            ApiError::internal("failed to get books before year").into_response()
        }
    }
}
