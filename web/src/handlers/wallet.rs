//! Wallet endpoints: balance, statement, deposits.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use boxoffice_core::error::BoxOfficeError;
use boxoffice_core::store::Store;
use boxoffice_core::types::{AccountId, LedgerEntry, LedgerKind, Money, PaymentMethod, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WebResult;
use crate::extractors::{AppJson, Caller};
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Account
    pub owner_id: AccountId,
    /// Current balance
    pub balance: Money,
}

/// The caller's balance.
pub async fn balance<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
) -> WebResult<Json<BalanceResponse>> {
    let balance = state.engine.balance(principal.id).await?;
    Ok(Json(BalanceResponse {
        owner_id: principal.id,
        balance,
    }))
}

/// Statement filter.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only entries of this kind
    pub kind: Option<LedgerKind>,
}

/// The caller's ledger, most recent first, with totals.
pub async fn history<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
    Query(query): Query<HistoryQuery>,
) -> WebResult<Json<Statement>> {
    Ok(Json(state.engine.statement(principal.id, query.kind).await?))
}

/// Deposit request.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    /// Amount, e.g. `"2500.00"` or `2500`. Kept raw so a bad amount is
    /// reported as `INVALID_AMOUNT`.
    pub amount: Value,
    /// How it was paid
    pub payment_method: PaymentMethod,
}

fn parse_amount(raw: &Value) -> Result<Money, BoxOfficeError> {
    let text = match raw {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => {
            return Err(BoxOfficeError::InvalidAmount {
                field: "amount",
                reason: "expected a decimal string or number".to_string(),
            });
        }
    };
    text.parse::<Money>().map_err(|e| BoxOfficeError::InvalidAmount {
        field: "amount",
        reason: e.to_string(),
    })
}

/// Deposit response.
#[derive(Debug, Serialize)]
pub struct DepositResponse {
    /// The ledger entry written
    pub entry: LedgerEntry,
    /// Balance after the deposit
    pub balance_after: Money,
}

/// Credit a deposit to the caller.
pub async fn deposit<S: Store>(
    State(state): State<AppState<S>>,
    Caller(principal): Caller,
    AppJson(request): AppJson<DepositRequest>,
) -> WebResult<(StatusCode, Json<DepositResponse>)> {
    let amount = parse_amount(&request.amount)?;
    let recorded = state
        .engine
        .deposit(principal.id, amount, request.payment_method)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            entry: recorded.entry,
            balance_after: recorded.balance_after,
        }),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_accepts_strings_and_numbers() {
        assert_eq!(parse_amount(&json!("2500.50")).unwrap(), Money::from_cents(250_050));
        assert_eq!(parse_amount(&json!(1000)).unwrap(), Money::from_units(1000));
    }

    #[test]
    fn test_bad_amounts_are_invalid_amounts() {
        for raw in [json!("-5"), json!(-5), json!("1.234"), json!(1.234), json!(null), json!("abc")] {
            let err = parse_amount(&raw).unwrap_err();
            assert_eq!(err.code(), "INVALID_AMOUNT", "{raw}");
        }
    }
}
