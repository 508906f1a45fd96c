//! Race tests: many tasks hit the same rows at once.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use boxoffice_core::error::BoxOfficeError;
use boxoffice_core::referral::Registration;
use boxoffice_core::types::{Money, Principal, Role};
use boxoffice_testing::{AccountSeed, Harness};
use futures::future::join_all;

fn units(n: u64) -> Money {
    Money::from_units(n)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redeems_succeed_exactly_once() {
    let h = Harness::new();
    let buyer = h
        .store
        .seed_account(AccountSeed::new("Ada").balance(units(500)));
    let event = h.store.seed_event("Concert");
    let ticket = h.store.seed_ticket(event, "VIP", units(500), 1);
    let receipt = h.engine.purchase(buyer.id, ticket, 1).await.unwrap();

    let tasks = (0..20).map(|_| {
        let engine = h.engine.clone();
        let token = receipt.purchase.redemption_token.clone();
        tokio::spawn(async move { engine.redeem(&token).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let already = results
        .iter()
        .filter(|r| matches!(r, Err(BoxOfficeError::AlreadyRedeemed { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(already, 19);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buyers_cannot_oversell_the_last_unit() {
    let h = Harness::new();
    let event = h.store.seed_event("Concert");
    let ticket = h.store.seed_ticket(event, "VIP", units(500), 1);
    let buyers: Vec<_> = (0..10)
        .map(|i| {
            h.store.seed_account(
                AccountSeed::new(&format!("Buyer {i}")).balance(units(1000)),
            )
        })
        .collect();

    let tasks = buyers.iter().map(|buyer| {
        let engine = h.engine.clone();
        let buyer_id = buyer.id;
        tokio::spawn(async move { engine.purchase(buyer_id, ticket, 1).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(BoxOfficeError::InsufficientStock { .. })))
            .count(),
        9
    );
    assert_eq!(h.store.ticket(ticket).unwrap().remaining_stock, 0);
    assert_eq!(h.store.purchase_count(), 1);
    assert!(h.store.unreconciled_accounts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_never_overdraw_a_wallet() {
    let h = Harness::new();
    let buyer = h
        .store
        .seed_account(AccountSeed::new("Ada").balance(units(2500)));
    let event = h.store.seed_event("Concert");
    let ticket = h.store.seed_ticket(event, "VIP", units(500), 10);

    let tasks = (0..10).map(|_| {
        let engine = h.engine.clone();
        let buyer_id = buyer.id;
        tokio::spawn(async move { engine.purchase(buyer_id, ticket, 1).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(BoxOfficeError::InsufficientBalance { .. })))
            .count(),
        5
    );
    assert_eq!(h.store.account(buyer.id).unwrap().balance, Money::ZERO);
    assert_eq!(h.store.ticket(ticket).unwrap().remaining_stock, 5);
    assert!(h.store.unreconciled_accounts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_referrals_lose_no_updates() {
    let h = Harness::new();
    let referrer = h
        .store
        .seed_account(AccountSeed::new("Grace").referral_code("GRACE1"));

    let tasks = (0..10).map(|i| {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            engine
                .open_account(Registration {
                    display_name: format!("Friend {i}"),
                    email: format!("friend{i}@example.com"),
                    referral_code: Some("GRACE1".to_string()),
                })
                .await
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let referrer = h.store.account(referrer.id).unwrap();
    assert_eq!(referrer.referral_count, 10);
    assert_eq!(referrer.balance, units(1000));
    assert!(h.store.unreconciled_accounts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_and_redeem_race_has_one_winner() {
    for _ in 0..10 {
        let h = Harness::new();
        let buyer = h
            .store
            .seed_account(AccountSeed::new("Ada").balance(units(500)));
        let event = h.store.seed_event("Concert");
        let ticket = h.store.seed_ticket(event, "VIP", units(500), 1);
        let receipt = h.engine.purchase(buyer.id, ticket, 1).await.unwrap();

        let redeem = {
            let engine = h.engine.clone();
            let token = receipt.purchase.redemption_token.clone();
            tokio::spawn(async move { engine.redeem(&token).await })
        };
        let cancel = {
            let engine = h.engine.clone();
            let principal = Principal::new(buyer.id, Role::User);
            let purchase_id = receipt.purchase.id;
            tokio::spawn(async move { engine.cancel(purchase_id, principal).await })
        };
        let redeemed = redeem.await.unwrap();
        let cancelled = cancel.await.unwrap();

        assert!(
            redeemed.is_ok() != cancelled.is_ok(),
            "exactly one of redeem and cancel must win"
        );
        if cancelled.is_ok() {
            assert_eq!(redeemed.unwrap_err(), BoxOfficeError::TokenNotFound);
            assert_eq!(h.store.ticket(ticket).unwrap().remaining_stock, 1);
        } else {
            assert!(matches!(
                cancelled.unwrap_err(),
                BoxOfficeError::AlreadyRedeemed { .. }
            ));
            assert_eq!(h.store.ticket(ticket).unwrap().remaining_stock, 0);
        }
        assert!(h.store.unreconciled_accounts().is_empty());
    }
}
