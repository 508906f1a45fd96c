//! # Box Office Core
//!
//! Purchase and redemption engine for a ticket-sales backend.
//!
//! A purchase reserves stock, debits the buyer's wallet and mints a
//! single-use redemption token in one unit of work. The token can later be
//! redeemed exactly once. Until it is redeemed, and within a fixed window, the
//! purchase can be cancelled for a full refund.
//!
//! ## Layout
//!
//! - [`types`]: identifiers, [`Money`](types::Money), accounts, purchases,
//!   ledger entries
//! - [`error`]: [`BoxOfficeError`](error::BoxOfficeError) and its categories
//! - [`store`]: the [`UnitOfWork`](store::UnitOfWork) abstraction storage
//!   backends implement
//! - [`inventory`], [`ledger`], [`purchase`], [`redemption`],
//!   [`cancellation`], [`referral`]: the business rules, each a set of
//!   functions over a unit of work
//! - [`engine`]: [`BoxOffice`](engine::BoxOffice), the facade that opens a
//!   unit of work per operation
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_core::engine::BoxOffice;
//!
//! let engine = BoxOffice::new(Arc::new(store));
//! let receipt = engine.purchase(buyer, ticket, 2).await?;
//! let view = engine.redeem(&receipt.purchase.redemption_token).await?;
//! ```

pub mod cancellation;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod purchase;
pub mod redemption;
pub mod referral;
pub mod store;
pub mod telemetry;
pub mod token;
pub mod types;

pub use engine::{BoxOffice, EnginePolicy};
pub use error::{BoxOfficeError, ErrorKind};
pub use store::{Store, StoreError, UnitOfWork, atomically};

/// Injected dependencies.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Every timestamp the engine writes (purchase time, redemption time,
    /// ledger entries) comes from here, and so does the cancellation
    /// deadline check.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
