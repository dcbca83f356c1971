//! contentctl-store: content items in Postgres with a Redis cache in front
//!
//! - [`db::Pool`] bounds store connections
//! - [`migrations::MigrationRunner`] evolves the schema, once per script
//! - [`cache::RedisCache`] reconnects with linear backoff and never fails a read
//! - [`repository::ContentRepository`] is what callers use: read-through,
//!   write-invalidate
//!
//! [`startup::start`] wires them together for a process.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod startup;

pub use config::Config;
pub use error::{Result, StoreError};
pub use models::{ContentItem, ValidationError};
pub use repository::ContentRepository;
pub use startup::{start, Services};
