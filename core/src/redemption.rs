//! Redemption state machine: `issued` -> `redeemed`, once, never back.

use crate::error::{BoxOfficeError, Result};
use crate::store::{Store, StoreError, UnitOfWork};
use crate::types::{PurchaseView, RedemptionState, RedemptionToken};
use chrono::{DateTime, Utc};

/// Reads the purchase behind `token` without touching it.
///
/// # Errors
///
/// [`BoxOfficeError::TokenNotFound`], or [`BoxOfficeError::Storage`].
pub async fn lookup<S: Store>(store: &S, token: &RedemptionToken) -> Result<PurchaseView> {
    store
        .find_view_by_token(token)
        .await?
        .ok_or(BoxOfficeError::TokenNotFound)
}

/// Redeems `token` inside `tx`.
///
/// The purchase row is locked before its state is read, so of several
/// concurrent callers exactly one sees it issued.
///
/// # Errors
///
/// - [`BoxOfficeError::TokenNotFound`] if no purchase carries the token
/// - [`BoxOfficeError::AlreadyRedeemed`] with the first redemption time
/// - [`BoxOfficeError::Storage`] on storage failure
pub async fn redeem<U: UnitOfWork>(
    tx: &mut U,
    token: &RedemptionToken,
    now: DateTime<Utc>,
) -> Result<PurchaseView> {
    let purchase = tx
        .lock_purchase_by_token(token)
        .await?
        .ok_or(BoxOfficeError::TokenNotFound)?;

    if let RedemptionState::Redeemed { at } = purchase.state() {
        return Err(BoxOfficeError::AlreadyRedeemed {
            purchase_id: purchase.id,
            redeemed_at: at,
        });
    }

    if !tx.mark_redeemed(purchase.id, now).await? {
        // Row changed under the lock: storage broke its contract.
        return Err(StoreError::Corrupt(format!(
            "purchase {} could not be marked redeemed",
            purchase.id
        ))
        .into());
    }

    tx.purchase_view(purchase.id)
        .await?
        .ok_or(BoxOfficeError::PurchaseNotFound {
            purchase_id: purchase.id,
        })
}
