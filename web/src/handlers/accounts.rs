//! Account opening.

use axum::{Json, extract::State, http::StatusCode};
use boxoffice_core::referral::Registration;
use boxoffice_core::store::Store;
use boxoffice_core::types::Account;
use serde::Deserialize;

use crate::WebResult;
use crate::extractors::AppJson;
use crate::state::AppState;

/// Registration form.
#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    /// Name shown on tickets
    pub display_name: String,
    /// Contact email
    pub email: String,
    /// Code of the account that referred this one
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Open an account. A valid referral code credits the referrer.
pub async fn open_account<S: Store>(
    State(state): State<AppState<S>>,
    AppJson(request): AppJson<OpenAccountRequest>,
) -> WebResult<(StatusCode, Json<Account>)> {
    let account = state
        .engine
        .open_account(Registration {
            display_name: request.display_name,
            email: request.email,
            referral_code: request.referral_code,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}
