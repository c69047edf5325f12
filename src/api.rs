use serde::{Deserialize, Serialize};

use crate::error::{ApiError, FieldError};
use crate::model::{Book, BookChanges, NewBook};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub publication_year: Option<i64>,
    pub available: Option<bool>,
}

impl CreateBookRequest {
    /// Checks required fields before anything touches the database, so a bad
    /// body comes back as a 400 with the offending fields named.
    pub fn validate(self) -> Result<NewBook, ApiError> {
        let mut errors = Vec::new();

        let title = required_text("title", self.title, &mut errors);
        let author = required_text("author", self.author, &mut errors);
        let genre = required_text("genre", self.genre, &mut errors);

        if self.publication_year.is_none() {
            errors.push(FieldError::new("publicationYear", "required"));
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        Ok(NewBook {
            title: title.unwrap_or_default(),
            author: author.unwrap_or_default(),
            genre: genre.unwrap_or_default(),
            publication_year: self.publication_year.unwrap_or_default(),
            available: self.available.unwrap_or(true),
        })
    }
}

fn required_text(
    field: &'static str,
    value: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                errors.push(FieldError::new(field, "must not be blank"));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => {
            errors.push(FieldError::new(field, "required"));
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub publication_year: Option<i64>,
    pub available: Option<bool>,
}

impl UpdateBookRequest {
    /// Truthy-merge rule: a text field only overwrites when non-blank, the
    /// year only when non-zero, while `available` applies for both true and
    /// false. A blank string or a zero year is dropped silently, so this
    /// endpoint cannot clear a field.
    pub fn into_changes(self) -> BookChanges {
        BookChanges {
            title: truthy_text(self.title),
            author: truthy_text(self.author),
            genre: truthy_text(self.genre),
            publication_year: self.publication_year.filter(|y| *y != 0),
            available: self.available,
        }
    }
}

fn truthy_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Serialize)]
pub struct CreateBookResponse {
    pub message: String,
    pub book: Book,
}
