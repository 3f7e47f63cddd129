//! Muster Database: SurrealDB connection management, schema migrations
//! and repository implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - Implementations of the `muster-core` repository traits ([`repository`])
//! - The live-query backed member change feed ([`SurrealChangeFeed`])

mod connection;
mod error;
mod feed;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager, RootCredentials};
pub use error::DbError;
pub use feed::SurrealChangeFeed;
pub use schema::run_migrations;
