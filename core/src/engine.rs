//! The engine facade: one method per operation, each in its own unit of work.

use crate::cancellation;
use crate::environment::{Clock, SystemClock};
use crate::error::{BoxOfficeError, Result};
use crate::ledger::{self, DepositLimits, Recorded};
use crate::purchase::{self, PurchaseRequest};
use crate::redemption;
use crate::referral::{self, ReferralPolicy, Registration};
use crate::store::{Store, atomically};
use crate::telemetry;
use crate::types::{
    Account, AccountId, EventId, LedgerEntry, LedgerKind, Money, PaymentMethod, Principal,
    PurchaseId, PurchaseReceipt, PurchaseView, RedemptionToken, RefundSummary, SalesStatistics,
    Statement, TicketId,
};
use chrono::Duration;
use std::sync::Arc;

/// How many hours back [`BoxOffice::recent_purchases`] looks (inclusive).
pub const RECENT_PURCHASES_HOURS: i64 = 24;

/// Tunable business rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnginePolicy {
    /// How long after purchase a cancellation is accepted (inclusive).
    pub cancellation_window: Duration,
    /// Credited to a referrer per referred account.
    pub referral_bonus: Money,
    /// Bounds on one deposit.
    pub deposit_limits: DepositLimits,
    /// Redemption token mint attempts per purchase.
    pub token_attempts: u32,
    /// Referral code mint attempts per account.
    pub referral_code_attempts: u32,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            cancellation_window: Duration::hours(24),
            referral_bonus: Money::from_units(100),
            deposit_limits: DepositLimits::default(),
            token_attempts: 3,
            referral_code_attempts: 5,
        }
    }
}

/// Purchase, redemption and wallet operations over a [`Store`].
///
/// Cheap to clone; clones share the store and clock.
pub struct BoxOffice<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: EnginePolicy,
}

impl<S: Store> Clone for BoxOffice<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
        }
    }
}

impl<S: Store> BoxOffice<S> {
    /// Creates an engine on the system clock with default policy.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), EnginePolicy::default())
    }

    /// Creates an engine with an explicit clock and policy.
    #[must_use]
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>, policy: EnginePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    // ═══════════════════════════════════════════════════════════
    // Purchases
    // ═══════════════════════════════════════════════════════════

    /// Buys `quantity` units of `ticket_id` for `buyer_id`.
    ///
    /// Stock reservation, balance debit and token minting commit together or
    /// not at all.
    ///
    /// # Errors
    ///
    /// See [`purchase::execute`].
    #[tracing::instrument(skip(self), name = "purchase")]
    pub async fn purchase(
        &self,
        buyer_id: AccountId,
        ticket_id: TicketId,
        quantity: u32,
    ) -> Result<PurchaseReceipt> {
        let now = self.clock.now();
        let attempts = self.policy.token_attempts;
        let request = PurchaseRequest {
            buyer_id,
            ticket_id,
            quantity,
        };

        let result = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move { purchase::execute(tx, request, now, attempts).await })
        })
        .await;

        telemetry::record_purchase(&result, quantity);
        match &result {
            Ok(receipt) => tracing::info!(
                purchase_id = %receipt.purchase.id,
                token = receipt.purchase.redemption_token.fingerprint(),
                total = %receipt.purchase.total_paid,
                stock_after = receipt.stock_after,
                "Purchase completed"
            ),
            Err(err) => log_failure(err, "Purchase rejected"),
        }
        result
    }

    /// Purchases of `buyer_id`, most recent first.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] on storage failure.
    pub async fn purchases_for_buyer(&self, buyer_id: AccountId) -> Result<Vec<PurchaseView>> {
        Ok(self.store.purchases_by_buyer(buyer_id).await?)
    }

    /// One purchase, visible to its buyer and to administrators.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::PurchaseNotFound`], [`BoxOfficeError::NotPurchaseOwner`],
    /// or a storage failure.
    pub async fn purchase_detail(
        &self,
        purchase_id: PurchaseId,
        requester: Principal,
    ) -> Result<PurchaseView> {
        let view = self
            .store
            .find_purchase_view(purchase_id)
            .await?
            .ok_or(BoxOfficeError::PurchaseNotFound { purchase_id })?;
        if view.purchase.buyer_id != requester.id && !requester.is_admin() {
            return Err(BoxOfficeError::NotPurchaseOwner {
                purchase_id,
                requester_id: requester.id,
            });
        }
        Ok(view)
    }

    /// Every purchase of any ticket of `event_id`, most recent first.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::AdminRequired`], or a storage failure.
    pub async fn purchases_for_event(
        &self,
        event_id: EventId,
        requester: Principal,
    ) -> Result<Vec<PurchaseView>> {
        require_admin(requester)?;
        Ok(self.store.purchases_by_event(event_id).await?)
    }

    /// Purchases made within the last [`RECENT_PURCHASES_HOURS`], most recent
    /// first.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::AdminRequired`], or a storage failure.
    pub async fn recent_purchases(&self, requester: Principal) -> Result<Vec<PurchaseView>> {
        require_admin(requester)?;
        let since = self.clock.now() - Duration::hours(RECENT_PURCHASES_HOURS);
        Ok(self.store.purchases_since(since).await?)
    }

    /// Sales totals over every live purchase.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::AdminRequired`], or a storage failure.
    pub async fn sales_statistics(&self, requester: Principal) -> Result<SalesStatistics> {
        require_admin(requester)?;
        Ok(self.store.sales_statistics().await?)
    }

    // ═══════════════════════════════════════════════════════════
    // Redemption
    // ═══════════════════════════════════════════════════════════

    /// Reads the purchase behind `token`. Never changes anything.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::TokenNotFound`], or a storage failure.
    #[tracing::instrument(skip(self, token), fields(token = token.fingerprint()), name = "lookup")]
    pub async fn lookup_by_token(&self, token: &RedemptionToken) -> Result<PurchaseView> {
        redemption::lookup(self.store.as_ref(), token).await
    }

    /// Redeems `token`. Succeeds at most once per token.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::TokenNotFound`], [`BoxOfficeError::AlreadyRedeemed`],
    /// or a storage failure.
    #[tracing::instrument(skip(self, token), fields(token = token.fingerprint()), name = "redeem")]
    pub async fn redeem(&self, token: &RedemptionToken) -> Result<PurchaseView> {
        let now = self.clock.now();
        let token = token.clone();

        let result = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move { redemption::redeem(tx, &token, now).await })
        })
        .await;

        telemetry::record_redemption(&result);
        match &result {
            Ok(view) => tracing::info!(purchase_id = %view.purchase.id, "Token redeemed"),
            Err(err) => log_failure(err, "Redemption rejected"),
        }
        result
    }

    // ═══════════════════════════════════════════════════════════
    // Cancellation
    // ═══════════════════════════════════════════════════════════

    /// Cancels a purchase and refunds the buyer.
    ///
    /// # Errors
    ///
    /// See [`cancellation::cancel`].
    #[tracing::instrument(skip(self), fields(requester_id = %requester.id), name = "cancel")]
    pub async fn cancel(
        &self,
        purchase_id: PurchaseId,
        requester: Principal,
    ) -> Result<RefundSummary> {
        let now = self.clock.now();
        let window = self.policy.cancellation_window;

        let result = atomically(self.store.as_ref(), move |tx| {
            Box::pin(
                async move { cancellation::cancel(tx, purchase_id, requester, window, now).await },
            )
        })
        .await;

        telemetry::record_cancellation(&result);
        match &result {
            Ok(summary) => tracing::info!(
                refunded = %summary.refunded,
                quantity_restored = summary.quantity_restored,
                "Purchase cancelled"
            ),
            Err(err) => log_failure(err, "Cancellation rejected"),
        }
        result
    }

    // ═══════════════════════════════════════════════════════════
    // Wallet
    // ═══════════════════════════════════════════════════════════

    /// Current balance of `owner_id`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::AccountNotFound`], or a storage failure.
    pub async fn balance(&self, owner_id: AccountId) -> Result<Money> {
        Ok(self.account(owner_id).await?.balance)
    }

    /// Account row of `account_id`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::AccountNotFound`], or a storage failure.
    pub async fn account(&self, account_id: AccountId) -> Result<Account> {
        self.store
            .find_account(account_id)
            .await?
            .ok_or(BoxOfficeError::AccountNotFound { account_id })
    }

    /// Ledger entries of `owner_id`, most recent first.
    ///
    /// Each call reads committed state afresh.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::AccountNotFound`], or a storage failure.
    pub async fn history(&self, owner_id: AccountId) -> Result<Vec<LedgerEntry>> {
        self.account(owner_id).await?;
        Ok(self.store.ledger_history(owner_id).await?)
    }

    /// History of `owner_id`, optionally restricted to one kind, with totals.
    ///
    /// # Errors
    ///
    /// As [`Self::history`].
    pub async fn statement(
        &self,
        owner_id: AccountId,
        kind: Option<LedgerKind>,
    ) -> Result<Statement> {
        let mut entries = self.history(owner_id).await?;
        if let Some(kind) = kind {
            entries.retain(|entry| entry.kind == kind);
        }
        Ok(Statement::from_entries(owner_id, entries))
    }

    /// Credits a deposit to `owner_id`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::InvalidAmount`] outside the deposit limits,
    /// [`BoxOfficeError::AccountNotFound`], or a storage failure.
    #[tracing::instrument(skip(self), fields(amount = %amount), name = "deposit")]
    pub async fn deposit(
        &self,
        owner_id: AccountId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<Recorded> {
        let now = self.clock.now();
        let limits = self.policy.deposit_limits;

        let result = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move { ledger::deposit(tx, owner_id, amount, method, limits, now).await })
        })
        .await;

        match &result {
            Ok(recorded) => tracing::info!(balance = %recorded.balance_after, "Deposit credited"),
            Err(err) => log_failure(err, "Deposit rejected"),
        }
        result
    }

    // ═══════════════════════════════════════════════════════════
    // Accounts
    // ═══════════════════════════════════════════════════════════

    /// Opens an account, crediting the referrer named by its referral code.
    ///
    /// # Errors
    ///
    /// See [`referral::open_account`].
    #[tracing::instrument(skip(self, registration), name = "open_account")]
    pub async fn open_account(&self, registration: Registration) -> Result<Account> {
        let now = self.clock.now();
        let referred = registration.referral_code.is_some();
        let policy = ReferralPolicy {
            bonus: self.policy.referral_bonus,
            code_attempts: self.policy.referral_code_attempts,
        };

        let result = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move { referral::open_account(tx, registration, policy, now).await })
        })
        .await;

        match &result {
            Ok(account) => {
                telemetry::record_account_opened(referred);
                tracing::info!(account_id = %account.id, referred, "Account opened");
            }
            Err(err) => log_failure(err, "Account opening rejected"),
        }
        result
    }
}

fn require_admin(requester: Principal) -> Result<()> {
    if requester.is_admin() {
        Ok(())
    } else {
        Err(BoxOfficeError::AdminRequired {
            requester_id: requester.id,
        })
    }
}

fn log_failure(err: &BoxOfficeError, message: &'static str) {
    if err.is_retryable() {
        tracing::error!(error = %err, code = err.code(), "{message}");
    } else {
        tracing::info!(error = %err, code = err.code(), "{message}");
    }
}
