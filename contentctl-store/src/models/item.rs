//! Content item record and its validated fields

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ValidationError;

/// Content item as stored in `content_items`.
///
/// `id`, `created_at` and `updated_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Listing order: newest `created_at` first, ties by ascending `id`.
    ///
    /// Matches `ORDER BY created_at DESC, id ASC` in the store queries.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

fn non_empty(field: &'static str, s: &str) -> Result<String, ValidationError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(trimmed.to_owned())
}

/// Validated item title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTitle(String);

impl ItemTitle {
    /// Create a new title.
    ///
    /// # Rules
    /// - Non-empty (after trimming whitespace)
    ///
    /// # Example
    /// ```
    /// use contentctl_store::models::ItemTitle;
    ///
    /// assert!(ItemTitle::new("Hello").is_ok());
    /// assert!(ItemTitle::new("").is_err());
    /// assert!(ItemTitle::new("   ").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        non_empty("title", s).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated item body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBody(String);

impl ItemBody {
    /// Create a new body. Same rules as [`ItemTitle::new`].
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        non_empty("body", s).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The caller-supplied half of an item, validated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFields {
    pub title: ItemTitle,
    pub body: ItemBody,
}

impl ItemFields {
    /// Validate title then body; the first empty field is reported.
    pub fn new(title: &str, body: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            title: ItemTitle::new(title)?,
            body: ItemBody::new(body)?,
        })
    }
}
