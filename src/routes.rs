use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::handler::{self, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::healthcheck))
        .route("/books", post(handler::create_book))
        .route("/books", get(handler::list_books))
        .route("/books/genre/:genre", get(handler::books_by_genre))
        .route("/books/title/:title", get(handler::book_by_title))
        .route("/books/:id", put(handler::update_book))
        .route("/books/:id", delete(handler::delete_book))
        .route("/books/fix-availability", post(handler::fix_availability))
        .route("/books/before/:year", get(handler::books_before_year))
}
