//! Business metrics for the box office engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_purchases_total{outcome}` - Purchase attempts by outcome
//! - `boxoffice_tickets_sold_total` - Units sold
//! - `boxoffice_redemptions_total{outcome}` - Redemption attempts by outcome
//! - `boxoffice_cancellations_total{outcome}` - Cancellation attempts by outcome
//! - `boxoffice_refunds_cents_total` - Refunded amount in cents
//! - `boxoffice_ledger_entries_total{kind}` - Ledger entries by kind
//! - `boxoffice_accounts_opened_total{referred}` - Accounts opened

use crate::error::BoxOfficeError;
use metrics::describe_counter;

/// Registers all metric descriptions.
///
/// Call once at startup, after installing the recorder.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_purchases_total",
        "Purchase attempts by outcome (success or error code)"
    );
    describe_counter!("boxoffice_tickets_sold_total", "Ticket units sold");
    describe_counter!(
        "boxoffice_redemptions_total",
        "Redemption attempts by outcome (success or error code)"
    );
    describe_counter!(
        "boxoffice_cancellations_total",
        "Cancellation attempts by outcome (success or error code)"
    );
    describe_counter!(
        "boxoffice_refunds_cents_total",
        "Amount refunded by cancellations, in cents"
    );
    describe_counter!(
        "boxoffice_ledger_entries_total",
        "Ledger entries recorded, by kind"
    );
    describe_counter!(
        "boxoffice_accounts_opened_total",
        "Accounts opened, by whether a referral code was used"
    );

    tracing::info!("Business metrics registered");
}

fn outcome<T>(result: &Result<T, BoxOfficeError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(err) => err.code(),
    }
}

/// Records a purchase attempt.
pub fn record_purchase<T>(result: &Result<T, BoxOfficeError>, quantity: u32) {
    metrics::counter!("boxoffice_purchases_total", "outcome" => outcome(result)).increment(1);
    if result.is_ok() {
        metrics::counter!("boxoffice_tickets_sold_total").increment(u64::from(quantity));
    }
}

/// Records a redemption attempt.
pub fn record_redemption<T>(result: &Result<T, BoxOfficeError>) {
    metrics::counter!("boxoffice_redemptions_total", "outcome" => outcome(result)).increment(1);
}

/// Records a cancellation attempt.
pub fn record_cancellation(result: &Result<crate::types::RefundSummary, BoxOfficeError>) {
    metrics::counter!("boxoffice_cancellations_total", "outcome" => outcome(result)).increment(1);
    if let Ok(summary) = result {
        metrics::counter!("boxoffice_refunds_cents_total").increment(summary.refunded.cents());
    }
}

/// Records an account opening.
pub fn record_account_opened(referred: bool) {
    let referred = if referred { "true" } else { "false" };
    metrics::counter!("boxoffice_accounts_opened_total", "referred" => referred).increment(1);
}
