//! Inventory guard: ticket stock never goes negative.
//!
//! Stock changes only here, and only inside a unit of work: one reservation
//! per purchase, one release per cancellation.

use crate::error::{BoxOfficeError, Result};
use crate::store::UnitOfWork;
use crate::types::TicketId;

/// Takes `quantity` units of `ticket_id` off sale.
///
/// Returns the stock before the reservation. The check and the decrement are
/// a single conditional update, so two units of work cannot both take the
/// last unit.
///
/// # Errors
///
/// - [`BoxOfficeError::InsufficientStock`] if fewer than `quantity` units remain
/// - [`BoxOfficeError::TicketNotFound`] if the ticket vanished
/// - [`BoxOfficeError::Storage`] on storage failure
pub async fn reserve<U: UnitOfWork>(tx: &mut U, ticket_id: TicketId, quantity: u32) -> Result<u32> {
    if let Some(previous) = tx.reserve_stock(ticket_id, quantity).await? {
        tracing::debug!(%ticket_id, quantity, remaining = previous - quantity, "Stock reserved");
        return Ok(previous);
    }

    // The update matched nothing; find out whether the row is short or gone.
    match tx.find_ticket(ticket_id).await? {
        Some(ticket) => Err(BoxOfficeError::InsufficientStock {
            ticket_id,
            requested: quantity,
            available: ticket.remaining_stock,
        }),
        None => Err(BoxOfficeError::TicketNotFound { ticket_id }),
    }
}

/// Puts `quantity` units of `ticket_id` back on sale.
///
/// Never refuses; the caller makes sure each purchase is released once.
///
/// # Errors
///
/// [`BoxOfficeError::Storage`] on storage failure.
pub async fn release<U: UnitOfWork>(tx: &mut U, ticket_id: TicketId, quantity: u32) -> Result<()> {
    tx.release_stock(ticket_id, quantity).await?;
    tracing::debug!(%ticket_id, quantity, "Stock released");
    Ok(())
}
