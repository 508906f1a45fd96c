//! Cancellation path: undo a purchase inside the cancellation window.

use crate::error::{BoxOfficeError, Result};
use crate::store::{StoreError, UnitOfWork};
use crate::types::{
    LedgerKind, NewLedgerEntry, Principal, PurchaseId, RedemptionState, RefundSummary,
};
use crate::{inventory, ledger};
use chrono::{DateTime, Duration, Utc};

/// Cancels `purchase_id` on behalf of `requester` inside `tx`.
///
/// A purchase can be cancelled up to and including `purchased_at + window`.
/// The purchase row is locked first, then the buyer's account, then the
/// ticket. Nothing is credited back for a free purchase.
///
/// # Errors
///
/// - [`BoxOfficeError::PurchaseNotFound`]
/// - [`BoxOfficeError::NotPurchaseOwner`] unless `requester` is the buyer or
///   an administrator
/// - [`BoxOfficeError::CancellationWindowExpired`]
/// - [`BoxOfficeError::AlreadyRedeemed`]
/// - [`BoxOfficeError::AccountNotFound`] if the buyer row is gone
/// - [`BoxOfficeError::Storage`] on storage failure
pub async fn cancel<U: UnitOfWork>(
    tx: &mut U,
    purchase_id: PurchaseId,
    requester: Principal,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<RefundSummary> {
    let purchase = tx
        .lock_purchase(purchase_id)
        .await?
        .ok_or(BoxOfficeError::PurchaseNotFound { purchase_id })?;

    if purchase.buyer_id != requester.id && !requester.is_admin() {
        return Err(BoxOfficeError::NotPurchaseOwner {
            purchase_id,
            requester_id: requester.id,
        });
    }

    let deadline = purchase
        .purchased_at
        .checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if now > deadline {
        return Err(BoxOfficeError::CancellationWindowExpired {
            purchase_id,
            purchased_at: purchase.purchased_at,
            deadline,
        });
    }

    if let RedemptionState::Redeemed { at } = purchase.state() {
        return Err(BoxOfficeError::AlreadyRedeemed {
            purchase_id,
            redeemed_at: at,
        });
    }

    let (refund_entry_id, new_balance) = if purchase.total_paid.is_zero() {
        let buyer = tx
            .lock_account(purchase.buyer_id)
            .await?
            .ok_or(BoxOfficeError::AccountNotFound {
                account_id: purchase.buyer_id,
            })?;
        (None, buyer.balance)
    } else {
        let refund = ledger::record(
            tx,
            NewLedgerEntry::new(
                purchase.buyer_id,
                LedgerKind::RefundCredit,
                purchase.total_paid,
                now,
            )
            .for_purchase(purchase_id),
        )
        .await?;
        (Some(refund.entry.id), refund.balance_after)
    };

    inventory::release(tx, purchase.ticket_id, purchase.quantity).await?;

    if !tx.delete_purchase(purchase_id).await? {
        return Err(
            StoreError::Corrupt(format!("purchase {purchase_id} vanished under its lock")).into(),
        );
    }

    Ok(RefundSummary {
        purchase_id,
        ticket_id: purchase.ticket_id,
        quantity_restored: purchase.quantity,
        refunded: purchase.total_paid,
        new_balance,
        refund_entry_id,
        cancelled_at: now,
    })
}
