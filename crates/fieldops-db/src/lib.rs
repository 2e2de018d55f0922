//! Database layer for the fieldops platform.
//!
//! Provides the tenant, plan, and subscription models together with their
//! `SQLx` query methods, the shared connection pool wrapper, and embedded
//! migrations for the tables this crate owns.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
