//! Database layer - connection pool and item store
//!
//! # Design Principles
//!
//! - One bounded pool, handed out by clone - no global connection
//! - Store assigns ids and timestamps (RETURNING), never the caller
//! - Missing rows are `Option`/`bool`, not errors

pub mod items;
pub mod pool;

pub use items::{ContentStore, PgContentStore};
pub use pool::Pool;
