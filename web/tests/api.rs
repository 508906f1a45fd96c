//! HTTP API tests.
//!
//! Drive the router end to end over the in-memory store: routing, caller
//! extraction, status mapping and response bodies.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use boxoffice_core::types::{AccountId, Money, TicketId};
use boxoffice_testing::{AccountSeed, Harness};
use boxoffice_web::{AppState, build_router};
use chrono::Duration;
use serde_json::{Value, json};

const BASE_URL: &str = "http://tickets.test";

struct Api {
    harness: Harness,
    server: TestServer,
}

impl Api {
    fn new() -> Self {
        let harness = Harness::new();
        let state = AppState::new(harness.engine.clone(), BASE_URL);
        let server = TestServer::new(build_router(state)).expect("test server");
        Self { harness, server }
    }

    fn buyer(&self, name: &str, units: u64) -> AccountId {
        self.harness
            .store
            .seed_account(AccountSeed::new(name).balance(Money::from_units(units)))
            .id
    }

    fn ticket(&self, price_units: u64, stock: u32) -> TicketId {
        let event = self.harness.store.seed_event("Night Concert");
        self.harness
            .store
            .seed_ticket(event, "VIP", Money::from_units(price_units), stock)
    }
}

fn principal_id(id: AccountId) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-principal-id"),
        HeaderValue::from_str(&id.to_string()).unwrap(),
    )
}

fn admin_role() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-principal-role"),
        HeaderValue::from_static("admin"),
    )
}

async fn buy(api: &Api, buyer: AccountId, ticket: TicketId, quantity: u32) -> Value {
    let (name, value) = principal_id(buyer);
    let response = api
        .server
        .post("/api/purchases")
        .add_header(name, value)
        .json(&json!({ "ticket_id": ticket, "quantity": quantity }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}

#[tokio::test]
async fn test_health_and_readiness() {
    let api = Api::new();

    let health = api.server.get("/health").await;
    health.assert_status_ok();
    assert_eq!(health.json::<Value>()["status"], "ok");

    let ready = api.server.get("/ready").await;
    ready.assert_status_ok();
    assert_eq!(ready.json::<Value>()["database"], true);
}

#[tokio::test]
async fn test_purchase_returns_receipt_and_verification_url() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 1000);
    let ticket = api.ticket(500, 2);

    let body = buy(&api, buyer, ticket, 1).await;

    let token = body["purchase"]["redemption_token"].as_str().unwrap();
    assert_eq!(token.len(), 32);
    assert_eq!(
        body["verification_url"],
        format!("{BASE_URL}/api/purchases/scan/{token}")
    );
    assert_eq!(body["balance_after"], "500.00");
    assert_eq!(body["stock_after"], 1);
    assert_eq!(body["purchase"]["total_paid"], "500.00");
}

#[tokio::test]
async fn test_missing_principal_is_unauthorized() {
    let api = Api::new();
    let ticket = api.ticket(500, 1);

    let response = api
        .server
        .post("/api/purchases")
        .json(&json!({ "ticket_id": ticket }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_insufficient_balance_is_a_conflict_with_details() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 100);
    let ticket = api.ticket(500, 1);
    let (name, value) = principal_id(buyer);

    let response = api
        .server
        .post("/api/purchases")
        .add_header(name, value)
        .json(&json!({ "ticket_id": ticket, "quantity": 1 }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "INSUFFICIENT_BALANCE");
    assert_eq!(body["details"]["required"], "500.00");
    assert_eq!(body["details"]["available"], "100.00");
    assert_eq!(api.harness.store.ticket(ticket).unwrap().remaining_stock, 1);
}

#[tokio::test]
async fn test_zero_quantity_is_unprocessable() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 1000);
    let ticket = api.ticket(500, 1);
    let (name, value) = principal_id(buyer);

    let response = api
        .server
        .post("/api/purchases")
        .add_header(name, value)
        .json(&json!({ "ticket_id": ticket, "quantity": 0 }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "INVALID_QUANTITY");
}

#[tokio::test]
async fn test_scan_then_validate_once() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 500);
    let ticket = api.ticket(500, 1);
    let body = buy(&api, buyer, ticket, 1).await;
    let token = body["purchase"]["redemption_token"].as_str().unwrap();

    let scanned = api.server.get(&format!("/api/purchases/scan/{token}")).await;
    scanned.assert_status_ok();
    let view = scanned.json::<Value>();
    assert_eq!(view["buyer"]["display_name"], "Ada");
    assert_eq!(view["event"]["title"], "Night Concert");
    assert_eq!(view["purchase"]["redeemed"], false);

    let validated = api
        .server
        .post(&format!("/api/purchases/validate/{token}"))
        .await;
    validated.assert_status_ok();
    assert_eq!(validated.json::<Value>()["ticket"]["purchase"]["redeemed"], true);

    let again = api
        .server
        .post(&format!("/api/purchases/validate/{token}"))
        .await;
    again.assert_status(StatusCode::CONFLICT);
    let body = again.json::<Value>();
    assert_eq!(body["code"], "ALREADY_REDEEMED");
    assert!(body["details"]["redeemed_at"].is_string());
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let api = Api::new();

    let response = api.server.get("/api/purchases/scan/deadbeef").await;

    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["code"], "TOKEN_NOT_FOUND");
}

#[tokio::test]
async fn test_cancel_requires_owner_or_admin() {
    let api = Api::new();
    let owner = api.buyer("Ada", 1000);
    let stranger = api.buyer("Mallory", 0);
    let admin = api
        .harness
        .store
        .seed_account(AccountSeed::new("Root").admin())
        .id;
    let ticket = api.ticket(500, 2);
    let first = buy(&api, owner, ticket, 1).await;
    let second = buy(&api, owner, ticket, 1).await;

    let (name, value) = principal_id(stranger);
    let forbidden = api
        .server
        .delete(&format!("/api/purchases/{}", first["purchase"]["id"]))
        .add_header(name, value)
        .await;
    forbidden.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(forbidden.json::<Value>()["code"], "NOT_PURCHASE_OWNER");

    let (name, value) = principal_id(owner);
    let cancelled = api
        .server
        .delete(&format!("/api/purchases/{}", first["purchase"]["id"]))
        .add_header(name, value)
        .await;
    cancelled.assert_status_ok();
    assert_eq!(cancelled.json::<Value>()["refunded"], "500.00");

    let (name, value) = principal_id(admin);
    let (role, admin_value) = admin_role();
    let by_admin = api
        .server
        .delete(&format!("/api/purchases/{}", second["purchase"]["id"]))
        .add_header(name, value)
        .add_header(role, admin_value)
        .await;
    by_admin.assert_status_ok();

    assert_eq!(api.harness.store.ticket(ticket).unwrap().remaining_stock, 2);
    assert_eq!(
        api.harness.store.account(owner).unwrap().balance,
        Money::from_units(1000)
    );
}

#[tokio::test]
async fn test_cancel_after_window_is_a_conflict() {
    let api = Api::new();
    let owner = api.buyer("Ada", 500);
    let ticket = api.ticket(500, 1);
    let body = buy(&api, owner, ticket, 1).await;

    api.harness
        .clock
        .advance(Duration::hours(24) + Duration::seconds(1));

    let (name, value) = principal_id(owner);
    let response = api
        .server
        .delete(&format!("/api/purchases/{}", body["purchase"]["id"]))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "CANCELLATION_WINDOW_EXPIRED");
    assert!(body["details"]["deadline"].is_string());
}

#[tokio::test]
async fn test_purchases_listed_for_caller() {
    let api = Api::new();
    let ada = api.buyer("Ada", 1500);
    let grace = api.buyer("Grace", 500);
    let ticket = api.ticket(500, 5);
    buy(&api, ada, ticket, 1).await;
    buy(&api, ada, ticket, 2).await;
    buy(&api, grace, ticket, 1).await;

    let (name, value) = principal_id(ada);
    let response = api.server.get("/api/purchases").add_header(name, value).await;

    response.assert_status_ok();
    let list = response.json::<Value>();
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["purchase"]["quantity"], 2);
}

#[tokio::test]
async fn test_wallet_deposit_balance_and_history() {
    let api = Api::new();
    let owner = api.buyer("Ada", 0);
    let (name, value) = principal_id(owner);

    let deposit = api
        .server
        .post("/api/wallet/deposit")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "amount": "2500.00", "payment_method": "mobile_money" }))
        .await;
    deposit.assert_status(StatusCode::CREATED);
    assert_eq!(deposit.json::<Value>()["balance_after"], "2500.00");

    let too_small = api
        .server
        .post("/api/wallet/deposit")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "amount": "499.99", "payment_method": "card" }))
        .await;
    too_small.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(too_small.json::<Value>()["details"]["field"], "amount");

    let balance = api
        .server
        .get("/api/wallet/balance")
        .add_header(name.clone(), value.clone())
        .await;
    balance.assert_status_ok();
    assert_eq!(balance.json::<Value>()["balance"], "2500.00");

    let history = api
        .server
        .get("/api/wallet/history")
        .add_query_param("kind", "deposit")
        .add_header(name, value)
        .await;
    history.assert_status_ok();
    let statement = history.json::<Value>();
    assert_eq!(statement["entries"].as_array().unwrap().len(), 1);
    assert_eq!(statement["entries"][0]["payment_method"], "mobile_money");
    assert_eq!(statement["total_credits"], "2500.00");
    assert_eq!(statement["total_debits"], "0.00");
}

#[tokio::test]
async fn test_open_account_with_referral() {
    let api = Api::new();
    let referrer = api
        .harness
        .store
        .seed_account(AccountSeed::new("Grace").referral_code("GRACE1"))
        .id;

    let response = api
        .server
        .post("/api/accounts")
        .json(&json!({
            "display_name": "Alan",
            "email": "alan@example.com",
            "referral_code": "grace1"
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let account = response.json::<Value>();
    assert_eq!(account["email"], "alan@example.com");
    assert_eq!(account["balance"], "0.00");
    assert!(account["referral_code"].is_string());

    let referrer = api.harness.store.account(referrer).unwrap();
    assert_eq!(referrer.referral_count, 1);
    assert_eq!(referrer.balance, Money::from_units(100));

    let unknown = api
        .server
        .post("/api/accounts")
        .json(&json!({
            "display_name": "Bob",
            "email": "bob@example.com",
            "referral_code": "NOPE00"
        }))
        .await;
    unknown.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(unknown.json::<Value>()["code"], "UNKNOWN_REFERRAL_CODE");
}

#[tokio::test]
async fn test_bad_deposit_amounts_are_invalid_amounts() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 0);
    let (name, value) = principal_id(buyer);

    for amount in [json!("-5"), json!(-5), json!("1.234"), json!(1.234), json!(true)] {
        let response = api
            .server
            .post("/api/wallet/deposit")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "amount": amount, "payment_method": "card" }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "INVALID_AMOUNT", "{amount}");
        assert_eq!(body["details"]["field"], "amount");
    }
    assert_eq!(api.harness.store.account(buyer).unwrap().balance, Money::ZERO);
}

#[tokio::test]
async fn test_negative_quantity_is_an_invalid_quantity() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 1000);
    let ticket = api.ticket(500, 2);
    let (name, value) = principal_id(buyer);

    let response = api
        .server
        .post("/api/purchases")
        .add_header(name, value)
        .json(&json!({ "ticket_id": ticket, "quantity": -1 }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "INVALID_QUANTITY");
    assert_eq!(body["details"]["quantity"], -1);
    assert_eq!(api.harness.store.ticket(ticket).unwrap().remaining_stock, 2);
}

#[tokio::test]
async fn test_malformed_bodies_use_the_error_envelope() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 1000);
    let (name, value) = principal_id(buyer);

    let wrong_type = api
        .server
        .post("/api/purchases")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "ticket_id": "front-row" }))
        .await;
    wrong_type.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body = wrong_type.json::<Value>();
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

    let not_json = api
        .server
        .post("/api/accounts")
        .text("display_name=Ada")
        .await;
    not_json.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(not_json.json::<Value>()["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_free_ticket_purchase_and_cancel() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 0);
    let ticket = api.ticket(0, 1);

    let body = buy(&api, buyer, ticket, 1).await;
    assert_eq!(body["balance_after"], "0.00");
    assert_eq!(body["purchase"]["total_paid"], "0.00");

    let id = body["purchase"]["id"].as_i64().unwrap();
    let (name, value) = principal_id(buyer);
    let response = api
        .server
        .delete(&format!("/api/purchases/{id}"))
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    let summary = response.json::<Value>();
    assert_eq!(summary["refunded"], "0.00");
    assert_eq!(summary["refund_entry_id"], Value::Null);
    assert_eq!(api.harness.store.ticket(ticket).unwrap().remaining_stock, 1);
}

#[tokio::test]
async fn test_purchase_detail_for_owner_and_admin() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 1000);
    let stranger = api.buyer("Mallory", 0);
    let admin = api
        .harness
        .store
        .seed_account(AccountSeed::new("Root").admin())
        .id;
    let ticket = api.ticket(500, 2);
    let id = buy(&api, buyer, ticket, 1).await["purchase"]["id"]
        .as_i64()
        .unwrap();
    let path = format!("/api/purchases/{id}");

    let (name, value) = principal_id(buyer);
    let own = api.server.get(&path).add_header(name, value).await;
    own.assert_status_ok();
    let body = own.json::<Value>();
    assert_eq!(body["purchase"]["id"], id);
    assert_eq!(body["event"]["title"], "Night Concert");

    let (name, value) = principal_id(admin);
    let (role, admin_value) = admin_role();
    api.server
        .get(&path)
        .add_header(name, value)
        .add_header(role, admin_value)
        .await
        .assert_status_ok();

    let (name, value) = principal_id(stranger);
    let denied = api.server.get(&path).add_header(name, value).await;
    denied.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(denied.json::<Value>()["code"], "NOT_PURCHASE_OWNER");

    let (name, value) = principal_id(buyer);
    let missing = api
        .server
        .get(&format!("/api/purchases/{}", id + 100))
        .add_header(name, value)
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sales_reports_are_admin_only() {
    let api = Api::new();
    let buyer = api.buyer("Ada", 10_000);
    let admin = api
        .harness
        .store
        .seed_account(AccountSeed::new("Root").admin())
        .id;
    let ticket = api.ticket(500, 10);
    let event = api.harness.store.ticket(ticket).unwrap().event_id;
    buy(&api, buyer, ticket, 2).await;
    api.harness.clock.advance(Duration::minutes(5));
    buy(&api, buyer, ticket, 1).await;

    let reports = [
        "/api/purchases/statistics".to_string(),
        "/api/purchases/recent".to_string(),
        format!("/api/purchases/by-event/{event}"),
    ];
    for path in &reports {
        let (name, value) = principal_id(buyer);
        let denied = api.server.get(path).add_header(name, value).await;
        denied.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(denied.json::<Value>()["code"], "ADMIN_REQUIRED", "{path}");
    }

    let get_as_admin = |path: &str| {
        let (name, value) = principal_id(admin);
        let (role, admin_value) = admin_role();
        api.server
            .get(path)
            .add_header(name, value)
            .add_header(role, admin_value)
    };

    let stats = get_as_admin("/api/purchases/statistics").await;
    stats.assert_status_ok();
    let stats = stats.json::<Value>();
    assert_eq!(stats["total_purchases"], 2);
    assert_eq!(stats["units_sold"], 3);
    assert_eq!(stats["revenue"], "1500.00");
    assert_eq!(stats["best_selling_ticket"]["label"], "VIP");
    assert_eq!(stats["most_popular_event"]["title"], "Night Concert");

    let recent = get_as_admin("/api/purchases/recent").await;
    recent.assert_status_ok();
    let recent = recent.json::<Vec<Value>>();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["purchase"]["quantity"], 1);

    let by_event = get_as_admin(&format!("/api/purchases/by-event/{event}")).await;
    by_event.assert_status_ok();
    assert_eq!(by_event.json::<Vec<Value>>().len(), 2);
}
