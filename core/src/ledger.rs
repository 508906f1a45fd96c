//! Wallet ledger.
//!
//! Every balance change is an immutable [`LedgerEntry`]; the balance on the
//! account row is a cache of the net of those entries. [`record`] is the only
//! writer of both, and it writes them together under the owner's row lock.

use crate::error::{BoxOfficeError, Result};
use crate::store::{LEDGER_REFERENCE_CONSTRAINT, UnitOfWork};
use crate::token::mint_ledger_reference;
use crate::types::{AccountId, LedgerEntry, LedgerKind, Money, NewLedgerEntry, PaymentMethod};
use chrono::{DateTime, Utc};

/// Reference mint attempts per entry.
pub const REFERENCE_ATTEMPTS: u32 = 3;

/// Inclusive bounds on a single deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepositLimits {
    /// Smallest accepted deposit.
    pub min: Money,
    /// Largest accepted deposit.
    pub max: Money,
}

impl Default for DepositLimits {
    fn default() -> Self {
        Self {
            min: Money::from_units(500),
            max: Money::from_units(1_000_000),
        }
    }
}

impl DepositLimits {
    /// Checks `amount` against the bounds.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::InvalidAmount`] when out of range.
    pub fn check(&self, amount: Money) -> Result<()> {
        if amount < self.min {
            return Err(BoxOfficeError::InvalidAmount {
                field: "amount",
                reason: format!("minimum deposit is {}", self.min),
            });
        }
        if amount > self.max {
            return Err(BoxOfficeError::InvalidAmount {
                field: "amount",
                reason: format!("maximum deposit is {}", self.max),
            });
        }
        Ok(())
    }
}

/// A recorded entry and the owner's balance after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    /// The appended entry.
    pub entry: LedgerEntry,
    /// Balance after applying it.
    pub balance_after: Money,
}

/// Appends `entry` and applies it to the owner's cached balance.
///
/// Locks the owner's account row first, so the balance check and the update
/// see the same value. The entry gets a fresh reference; a collision is
/// retried up to [`REFERENCE_ATTEMPTS`] times.
///
/// # Errors
///
/// - [`BoxOfficeError::InvalidAmount`] for a zero amount, or a credit that
///   would overflow the balance
/// - [`BoxOfficeError::AccountNotFound`] for an unknown owner
/// - [`BoxOfficeError::InsufficientBalance`] when a debit exceeds the balance
/// - [`BoxOfficeError::LedgerReferenceSpaceExhausted`] when every reference
///   collided
/// - [`BoxOfficeError::Storage`] on storage failure
pub async fn record<U: UnitOfWork>(tx: &mut U, mut entry: NewLedgerEntry) -> Result<Recorded> {
    if entry.amount.is_zero() {
        return Err(BoxOfficeError::InvalidAmount {
            field: "amount",
            reason: "must be greater than zero".to_string(),
        });
    }

    let owner_id = entry.owner_id;
    let account = tx
        .lock_account(owner_id)
        .await?
        .ok_or(BoxOfficeError::AccountNotFound {
            account_id: owner_id,
        })?;

    let balance_after = if entry.kind.is_credit() {
        account
            .balance
            .checked_add(entry.amount)
            .ok_or_else(|| BoxOfficeError::InvalidAmount {
                field: "amount",
                reason: "balance would overflow".to_string(),
            })?
    } else {
        account
            .balance
            .checked_sub(entry.amount)
            .ok_or(BoxOfficeError::InsufficientBalance {
                owner_id,
                required: entry.amount,
                available: account.balance,
            })?
    };

    tx.set_balance(owner_id, balance_after).await?;

    let mut attempt = 0;
    let entry = loop {
        attempt += 1;
        entry.reference = mint_ledger_reference(entry.kind);
        match tx.append_ledger_entry(entry.clone()).await {
            Ok(appended) => break appended,
            Err(err) if err.violates(LEDGER_REFERENCE_CONSTRAINT) => {
                tracing::warn!(attempt, "Ledger reference collision");
                if attempt >= REFERENCE_ATTEMPTS {
                    return Err(BoxOfficeError::LedgerReferenceSpaceExhausted { attempts: attempt });
                }
            }
            Err(err) => return Err(err.into()),
        }
    };

    tracing::debug!(
        %owner_id,
        reference = %entry.reference,
        kind = %entry.kind,
        amount = %entry.amount,
        balance = %balance_after,
        "Ledger entry recorded"
    );
    metrics::counter!("boxoffice_ledger_entries_total", "kind" => entry.kind.as_str())
        .increment(1);

    Ok(Recorded {
        entry,
        balance_after,
    })
}

/// Records a `deposit` entry after checking `limits`.
///
/// # Errors
///
/// As [`record`], plus [`BoxOfficeError::InvalidAmount`] outside `limits`.
pub async fn deposit<U: UnitOfWork>(
    tx: &mut U,
    owner_id: AccountId,
    amount: Money,
    method: PaymentMethod,
    limits: DepositLimits,
    now: DateTime<Utc>,
) -> Result<Recorded> {
    limits.check(amount)?;
    record(
        tx,
        NewLedgerEntry::new(owner_id, LedgerKind::Deposit, amount, now).paid_with(method),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_limits_are_inclusive() {
        let limits = DepositLimits::default();
        assert!(limits.check(Money::from_units(500)).is_ok());
        assert!(limits.check(Money::from_units(1_000_000)).is_ok());
        assert!(matches!(
            limits.check(Money::from_cents(49_999)),
            Err(BoxOfficeError::InvalidAmount { field: "amount", .. })
        ));
        assert!(matches!(
            limits.check(Money::from_cents(100_000_001)),
            Err(BoxOfficeError::InvalidAmount { .. })
        ));
    }
}
