//! Purchase engine: reserve stock, debit the buyer and mint a token as one
//! all-or-nothing step.

use crate::error::{BoxOfficeError, Result};
use crate::store::{REDEMPTION_TOKEN_CONSTRAINT, UnitOfWork};
use crate::token::mint_redemption_token;
use crate::types::{AccountId, LedgerKind, NewLedgerEntry, NewPurchase, PurchaseReceipt, TicketId};
use crate::{inventory, ledger};
use chrono::{DateTime, Utc};

/// A purchase request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Who pays.
    pub buyer_id: AccountId,
    /// What is bought.
    pub ticket_id: TicketId,
    /// How many units.
    pub quantity: u32,
}

/// Runs a purchase inside `tx`.
///
/// Checks, in order: the buyer exists and is active, the ticket exists, the
/// quantity is at least 1, the total fits. Then reserves stock, debits the
/// buyer, inserts the purchase under a fresh token (retrying up to
/// `token_attempts` times on a token collision) and links the debit to it.
/// A free ticket writes no debit.
///
/// Nothing is undone here on failure: the caller's unit of work rolls back.
///
/// # Errors
///
/// - [`BoxOfficeError::AccountNotFound`], [`BoxOfficeError::BuyerInactive`]
/// - [`BoxOfficeError::TicketNotFound`]
/// - [`BoxOfficeError::InvalidQuantity`], [`BoxOfficeError::InvalidAmount`]
/// - [`BoxOfficeError::InsufficientStock`], [`BoxOfficeError::InsufficientBalance`]
/// - [`BoxOfficeError::TokenSpaceExhausted`] when every token collided
/// - [`BoxOfficeError::Storage`] on storage failure
pub async fn execute<U: UnitOfWork>(
    tx: &mut U,
    request: PurchaseRequest,
    now: DateTime<Utc>,
    token_attempts: u32,
) -> Result<PurchaseReceipt> {
    let PurchaseRequest {
        buyer_id,
        ticket_id,
        quantity,
    } = request;

    let buyer = tx
        .lock_account(buyer_id)
        .await?
        .ok_or(BoxOfficeError::AccountNotFound {
            account_id: buyer_id,
        })?;
    if !buyer.active {
        return Err(BoxOfficeError::BuyerInactive { buyer_id });
    }

    let ticket = tx
        .find_ticket(ticket_id)
        .await?
        .ok_or(BoxOfficeError::TicketNotFound { ticket_id })?;

    if quantity == 0 {
        return Err(BoxOfficeError::InvalidQuantity {
            quantity: i64::from(quantity),
        });
    }

    let unit_price = ticket.unit_price;
    let total = unit_price
        .checked_mul(quantity)
        .ok_or_else(|| BoxOfficeError::InvalidAmount {
            field: "quantity",
            reason: format!("{quantity} x {unit_price} overflows"),
        })?;

    let previous_stock = inventory::reserve(tx, ticket_id, quantity).await?;

    let (debit_entry_id, balance_after) = if total.is_zero() {
        (None, buyer.balance)
    } else {
        let debit = ledger::record(
            tx,
            NewLedgerEntry::new(buyer_id, LedgerKind::PurchaseDebit, total, now),
        )
        .await?;
        (Some(debit.entry.id), debit.balance_after)
    };

    let mut attempt = 0;
    let purchase = loop {
        attempt += 1;
        let candidate = NewPurchase {
            buyer_id,
            ticket_id,
            quantity,
            unit_price,
            total_paid: total,
            purchased_at: now,
            redemption_token: mint_redemption_token(),
        };
        match tx.insert_purchase(candidate).await {
            Ok(purchase) => break purchase,
            Err(err) if err.violates(REDEMPTION_TOKEN_CONSTRAINT) => {
                tracing::warn!(attempt, token_attempts, "Redemption token collision");
                if attempt >= token_attempts {
                    return Err(BoxOfficeError::TokenSpaceExhausted { attempts: attempt });
                }
            }
            Err(err) => return Err(err.into()),
        }
    };

    if let Some(entry) = debit_entry_id {
        tx.link_ledger_entry(entry, purchase.id).await?;
    }

    Ok(PurchaseReceipt {
        purchase,
        debit_entry_id,
        balance_after,
        stock_after: previous_stock - quantity,
    })
}
