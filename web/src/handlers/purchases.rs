//! Purchase endpoints.
//!
//! - `POST /api/purchases`: buy tickets for the caller
//! - `GET /api/purchases`: the caller's purchases, most recent first
//! - `GET /api/purchases/:id`: one purchase (owner or admin)
//! - `DELETE /api/purchases/:id`: cancel within the window, full refund
//! - `GET /api/purchases/by-event/:event_id`: every purchase for an event (admin)
//! - `GET /api/purchases/recent`: purchases of the last 24 hours (admin)
//! - `GET /api/purchases/statistics`: sales totals (admin)
//! - `GET /api/purchases/scan/:token`: look a token up (door scanners, no auth)
//! - `POST /api/purchases/validate/:token`: redeem a token (door scanners, no auth)

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_core::error::BoxOfficeError;
use boxoffice_core::store::Store;
use boxoffice_core::types::{
    EventId, Money, Purchase, PurchaseId, PurchaseView, RedemptionToken, RefundSummary,
    SalesStatistics, TicketId,
};
use serde::{Deserialize, Serialize};

use crate::WebResult;
use crate::extractors::{AppJson, Caller};
use crate::state::AppState;

/// Request to buy tickets.
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    /// Ticket offering to buy
    pub ticket_id: TicketId,
    /// Units, defaults to 1. Signed so a negative count is reported as an
    /// invalid quantity rather than a malformed body.
    #[serde(default = "one")]
    pub quantity: i64,
}

const fn one() -> i64 {
    1
}

/// Response after a purchase.
#[derive(Debug, Serialize)]
pub struct PurchaseCreated {
    /// Human-readable confirmation
    pub message: String,
    /// The purchase, redemption token included
    pub purchase: Purchase,
    /// Caller's balance after the debit
    pub balance_after: Money,
    /// Units of the ticket left
    pub stock_after: u32,
    /// Link encoded in the QR code
    pub verification_url: String,
}

/// Buy tickets for the caller.
pub async fn create_purchase<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
    AppJson(request): AppJson<CreatePurchaseRequest>,
) -> WebResult<(StatusCode, Json<PurchaseCreated>)> {
    let quantity = u32::try_from(request.quantity).map_err(|_| BoxOfficeError::InvalidQuantity {
        quantity: request.quantity,
    })?;
    let receipt = state
        .engine
        .purchase(principal.id, request.ticket_id, quantity)
        .await?;

    let verification_url = state.verification_url(&receipt.purchase.redemption_token);
    Ok((
        StatusCode::CREATED,
        Json(PurchaseCreated {
            message: format!("{} ticket(s) purchased", receipt.purchase.quantity),
            purchase: receipt.purchase,
            balance_after: receipt.balance_after,
            stock_after: receipt.stock_after,
            verification_url,
        }),
    ))
}

/// The caller's purchases, most recent first.
pub async fn list_purchases<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
) -> WebResult<Json<Vec<PurchaseView>>> {
    Ok(Json(state.engine.purchases_for_buyer(principal.id).await?))
}

/// One purchase. Owners and administrators only.
pub async fn get_purchase<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
    Path(purchase_id): Path<PurchaseId>,
) -> WebResult<Json<PurchaseView>> {
    Ok(Json(state.engine.purchase_detail(purchase_id, principal).await?))
}

/// Every purchase for one event, most recent first. Administrators only.
pub async fn purchases_by_event<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
    Path(event_id): Path<EventId>,
) -> WebResult<Json<Vec<PurchaseView>>> {
    Ok(Json(state.engine.purchases_for_event(event_id, principal).await?))
}

/// Purchases of the last 24 hours, most recent first. Administrators only.
pub async fn recent_purchases<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
) -> WebResult<Json<Vec<PurchaseView>>> {
    Ok(Json(state.engine.recent_purchases(principal).await?))
}

/// Sales totals. Administrators only.
pub async fn statistics<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
) -> WebResult<Json<SalesStatistics>> {
    Ok(Json(state.engine.sales_statistics(principal).await?))
}

/// Cancel a purchase. Owners and administrators only.
pub async fn cancel_purchase<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
    Path(purchase_id): Path<PurchaseId>,
) -> WebResult<Json<RefundSummary>> {
    Ok(Json(state.engine.cancel(purchase_id, principal).await?))
}

/// Look a scanned token up. Read-only.
pub async fn scan_token<S: Store>(
    State(state): State<AppState<S>>,
    Path(token): Path<String>,
) -> WebResult<Json<PurchaseView>> {
    let token = RedemptionToken::new(token);
    Ok(Json(state.engine.lookup_by_token(&token).await?))
}

/// Response after a redemption.
#[derive(Debug, Serialize)]
pub struct Validated {
    /// Human-readable confirmation
    pub message: &'static str,
    /// The redeemed purchase
    pub ticket: PurchaseView,
}

/// Redeem a scanned token. Succeeds once per token.
pub async fn validate_token<S: Store>(
    State(state): State<AppState<S>>,
    Path(token): Path<String>,
) -> WebResult<Json<Validated>> {
    let token = RedemptionToken::new(token);
    let ticket = state.engine.redeem(&token).await?;
    Ok(Json(Validated {
        message: "Ticket validated",
        ticket,
    }))
}
