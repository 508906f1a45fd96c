//! Router configuration.

use axum::{
    Router,
    routing::{get, post},
};
use boxoffice_core::store::Store;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, health, purchases, wallet};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;

/// Build the complete router.
///
/// Health checks sit at the root; everything else under `/api`.
pub fn build_router<S: Store>(state: AppState<S>) -> Router {
    let api_routes = Router::new()
        // Purchases
        .route(
            "/purchases",
            post(purchases::create_purchase::<S>).get(purchases::list_purchases::<S>),
        )
        .route(
            "/purchases/:id",
            get(purchases::get_purchase::<S>).delete(purchases::cancel_purchase::<S>),
        )
        .route("/purchases/recent", get(purchases::recent_purchases::<S>))
        .route("/purchases/statistics", get(purchases::statistics::<S>))
        .route(
            "/purchases/by-event/:event_id",
            get(purchases::purchases_by_event::<S>),
        )
        // Door scanners
        .route("/purchases/scan/:token", get(purchases::scan_token::<S>))
        .route(
            "/purchases/validate/:token",
            post(purchases::validate_token::<S>),
        )
        // Wallet
        .route("/wallet/balance", get(wallet::balance::<S>))
        .route("/wallet/history", get(wallet::history::<S>))
        .route("/wallet/deposit", post(wallet::deposit::<S>))
        // Accounts
        .route("/accounts", post(accounts::open_account::<S>));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check::<S>))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
