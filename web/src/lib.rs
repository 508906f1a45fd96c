//! HTTP surface of the box office engine.
//!
//! Thin axum handlers over [`BoxOffice`](boxoffice_core::BoxOffice): each
//! handler extracts the caller and the request, calls one engine operation
//! and maps the result. Engine errors become `{code, message, details}`
//! bodies through [`AppError`].
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_web::{AppState, build_router};
//!
//! let state = AppState::new(engine, "https://tickets.example.com");
//! let app = build_router(state);
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Handlers all fail with AppError

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use extractors::Caller;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use routes::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
