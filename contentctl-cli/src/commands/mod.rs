//! Command implementations for contentctl CLI

pub mod cache;
pub mod check;
pub mod items;
pub mod migrate;

pub use cache::run_cache;
pub use check::run_check;
pub use items::run_items;
pub use migrate::run_migrate;
