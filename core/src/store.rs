//! Storage abstraction: a unit of work over accounts, tickets, purchases and
//! the ledger.
//!
//! # Design
//!
//! Every mutating engine operation runs inside one [`UnitOfWork`]. A unit of
//! work locks only the rows it touches, sees its own writes, and publishes
//! nothing until [`UnitOfWork::commit`]. Dropping it, or calling
//! [`UnitOfWork::rollback`], discards everything.
//!
//! [`atomically`] is the only way the engine opens one: it takes a closure
//! over the unit of work and commits when the closure returns `Ok`, rolls back
//! otherwise.
//!
//! # Lock order
//!
//! Implementations lock rows as they are read through the `lock_*` methods
//! and through [`UnitOfWork::reserve_stock`]. Callers take locks in the order
//! purchase row, account row, ticket row.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `boxoffice-postgres`): `SELECT ... FOR UPDATE` and
//!   conditional updates inside a database transaction
//! - `InMemoryStore` (in `boxoffice-testing`): per-row async mutexes with
//!   staged writes
//!
//! # Dyn Compatibility
//!
//! Methods return [`BoxFuture`] rather than `async fn` so the futures are
//! `Send` for every implementation, which lets engine code box the whole
//! unit of work.

use crate::error::BoxOfficeError;
use crate::types::{
    Account, AccountId, EventId, LedgerEntry, LedgerEntryId, Money, NewAccount, NewLedgerEntry,
    NewPurchase, Purchase, PurchaseId, PurchaseView, RedemptionToken, SalesStatistics, TicketId,
    TicketOffering,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;

/// Name of the uniqueness constraint on redemption tokens.
pub const REDEMPTION_TOKEN_CONSTRAINT: &str = "purchases_redemption_token_key";

/// Name of the uniqueness constraint on referral codes.
pub const REFERRAL_CODE_CONSTRAINT: &str = "accounts_referral_code_key";

/// Name of the uniqueness constraint on account emails.
pub const EMAIL_CONSTRAINT: &str = "accounts_email_key";

/// Name of the uniqueness constraint on ledger references.
pub const LEDGER_REFERENCE_CONSTRAINT: &str = "ledger_entries_reference_key";

/// Errors raised by storage implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint {constraint} violated")]
    UniqueViolation {
        /// Constraint name, one of the `*_CONSTRAINT` constants for the
        /// constraints the engine reacts to.
        constraint: String,
    },

    /// The database aborted the transaction (deadlock, serialization failure).
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// A stored row could not be decoded into a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Connection or query failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// True when this is a violation of the named constraint.
    #[must_use]
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint } if constraint == name)
    }
}

/// Transactional access to the rows the engine mutates.
pub trait UnitOfWork: Send + 'static {
    /// Loads and locks an account row.
    fn lock_account(
        &mut self,
        id: AccountId,
    ) -> BoxFuture<'_, Result<Option<Account>, StoreError>>;

    /// Loads and locks the account owning a referral code.
    fn lock_account_by_referral_code<'a>(
        &'a mut self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Option<Account>, StoreError>>;

    /// Inserts an active `user` account with a zero balance.
    ///
    /// Fails with [`StoreError::UniqueViolation`] on a duplicate email or
    /// referral code.
    fn insert_account(&mut self, account: NewAccount)
    -> BoxFuture<'_, Result<Account, StoreError>>;

    /// Overwrites the cached balance of a locked account.
    fn set_balance(&mut self, id: AccountId, balance: Money)
    -> BoxFuture<'_, Result<(), StoreError>>;

    /// Adds one to a locked account's referral counter.
    fn increment_referral_count(&mut self, id: AccountId)
    -> BoxFuture<'_, Result<(), StoreError>>;

    /// Loads a ticket offering without locking it.
    fn find_ticket(
        &mut self,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<TicketOffering>, StoreError>>;

    /// Decrements stock by `quantity` if at least that much is left.
    ///
    /// Check and decrement are one step. Returns the stock before the
    /// decrement, or `None` when the ticket is missing or short. The ticket
    /// row stays locked until the unit of work ends.
    fn reserve_stock(
        &mut self,
        id: TicketId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<Option<u32>, StoreError>>;

    /// Increments stock by `quantity`.
    fn release_stock(&mut self, id: TicketId, quantity: u32)
    -> BoxFuture<'_, Result<(), StoreError>>;

    /// Inserts a purchase.
    ///
    /// Fails with a [`StoreError::UniqueViolation`] on
    /// [`REDEMPTION_TOKEN_CONSTRAINT`] without poisoning the unit of work, so
    /// the caller can retry with another token.
    fn insert_purchase(
        &mut self,
        purchase: NewPurchase,
    ) -> BoxFuture<'_, Result<Purchase, StoreError>>;

    /// Loads and locks a purchase by id.
    fn lock_purchase(
        &mut self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<Purchase>, StoreError>>;

    /// Loads and locks a purchase by redemption token.
    fn lock_purchase_by_token<'a>(
        &'a mut self,
        token: &'a RedemptionToken,
    ) -> BoxFuture<'a, Result<Option<Purchase>, StoreError>>;

    /// Sets `redeemed`/`redeemed_at` on a locked, unredeemed purchase.
    ///
    /// Returns `false` if the purchase was already redeemed or is gone.
    fn mark_redeemed(
        &mut self,
        id: PurchaseId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Deletes a locked purchase. Returns `false` if it was already gone.
    fn delete_purchase(&mut self, id: PurchaseId) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Appends a ledger entry. Does not touch the balance.
    ///
    /// Fails with a [`StoreError::UniqueViolation`] on
    /// [`LEDGER_REFERENCE_CONSTRAINT`] without poisoning the unit of work.
    fn append_ledger_entry(
        &mut self,
        entry: NewLedgerEntry,
    ) -> BoxFuture<'_, Result<LedgerEntry, StoreError>>;

    /// Points a ledger entry written in this unit of work at a purchase.
    fn link_ledger_entry(
        &mut self,
        entry: LedgerEntryId,
        purchase: PurchaseId,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Builds the display view of a purchase as this unit of work sees it.
    fn purchase_view(
        &mut self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<PurchaseView>, StoreError>>;

    /// Publishes every write and releases every lock.
    fn commit(self) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Discards every write and releases every lock.
    fn rollback(self) -> BoxFuture<'static, Result<(), StoreError>>;
}

/// Entry point to storage: opens units of work and serves committed reads.
pub trait Store: Send + Sync + 'static {
    /// The unit of work type.
    type Tx: UnitOfWork;

    /// Opens a unit of work.
    fn begin(&self) -> BoxFuture<'_, Result<Self::Tx, StoreError>>;

    /// Committed view of the purchase carrying `token`. Takes no locks.
    fn find_view_by_token<'a>(
        &'a self,
        token: &'a RedemptionToken,
    ) -> BoxFuture<'a, Result<Option<PurchaseView>, StoreError>>;

    /// Committed account row.
    fn find_account(&self, id: AccountId) -> BoxFuture<'_, Result<Option<Account>, StoreError>>;

    /// Committed ledger entries of `owner`, most recent first.
    fn ledger_history(
        &self,
        owner: AccountId,
    ) -> BoxFuture<'_, Result<Vec<LedgerEntry>, StoreError>>;

    /// Committed purchases of `buyer`, most recent first.
    fn purchases_by_buyer(
        &self,
        buyer: AccountId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>>;

    /// Committed view of one purchase. Takes no locks.
    fn find_purchase_view(
        &self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<PurchaseView>, StoreError>>;

    /// Committed purchases of any ticket of `event`, most recent first.
    fn purchases_by_event(
        &self,
        event: EventId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>>;

    /// Committed purchases made at or after `since`, most recent first.
    fn purchases_since(
        &self,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>>;

    /// Aggregates over every committed purchase.
    fn sales_statistics(&self) -> BoxFuture<'_, Result<SalesStatistics, StoreError>>;

    /// Cheap connectivity check for readiness probes.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Runs `work` inside one unit of work.
///
/// Commits when `work` returns `Ok`; rolls back and returns the error
/// otherwise. A failed commit is reported as [`BoxOfficeError::Storage`] and
/// leaves nothing behind.
///
/// # Errors
///
/// Whatever `work` returns, or a storage error from `begin`/`commit`.
///
/// # Example
///
/// ```ignore
/// let balance = atomically(&store, move |tx| {
///     Box::pin(async move {
///         let account = tx.lock_account(owner).await?;
///         Ok(account.map(|a| a.balance))
///     })
/// })
/// .await?;
/// ```
pub async fn atomically<S, T, F>(store: &S, work: F) -> Result<T, BoxOfficeError>
where
    S: Store,
    T: Send,
    F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T, BoxOfficeError>> + Send,
{
    let mut tx = store.begin().await?;
    match work(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed after aborted unit of work");
            }
            Err(err)
        }
    }
}
