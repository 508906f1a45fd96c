//! HTTP handlers, one module per resource.

pub mod accounts;
pub mod health;
pub mod purchases;
pub mod wallet;
