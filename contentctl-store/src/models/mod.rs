//! Domain models with validation
//!
//! Field newtypes validate on construction, so store and repository code
//! never sees an empty title or body.

mod item;
mod validation;

pub use item::{ContentItem, ItemBody, ItemFields, ItemTitle};
pub use validation::ValidationError;
