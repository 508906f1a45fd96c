//! `PostgreSQL` storage for the box office engine.
//!
//! Implements [`Store`](boxoffice_core::Store) on top of sqlx. One unit of
//! work maps to one database transaction; schema migrations ship with the
//! crate and run through [`PostgresStore::migrate`].
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_core::BoxOffice;
//! use boxoffice_postgres::PostgresStore;
//! use std::sync::Arc;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::new("postgres://localhost/boxoffice").await?;
//!     store.migrate().await?;
//!     let engine = BoxOffice::new(Arc::new(store));
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod store;

pub use store::{PgUnitOfWork, PostgresStore};
