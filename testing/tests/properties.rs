//! Property tests: random operation sequences keep the books balanced.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use boxoffice_core::types::{Money, PaymentMethod, Principal, PurchaseId, Role};
use boxoffice_testing::{AccountSeed, Harness};
use chrono::Duration;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Buy { buyer: usize, quantity: u32 },
    Cancel { pick: usize },
    Redeem { pick: usize },
    Deposit { buyer: usize, units: u64 },
    Wait { hours: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0_usize..3, 0_u32..4).prop_map(|(buyer, quantity)| Op::Buy { buyer, quantity }),
        2 => any::<usize>().prop_map(|pick| Op::Cancel { pick }),
        2 => any::<usize>().prop_map(|pick| Op::Redeem { pick }),
        1 => (0_usize..3, 400_u64..2000).prop_map(|(buyer, units)| Op::Deposit { buyer, units }),
        1 => (1_i64..30).prop_map(|hours| Op::Wait { hours }),
    ]
}

const INITIAL_STOCK: u32 = 12;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn books_always_balance(ops in proptest::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::new();
            let buyers: Vec<_> = (0..3)
                .map(|i| h.store.seed_account(
                    AccountSeed::new(&format!("Buyer {i}")).balance(Money::from_units(1500)),
                ))
                .collect();
            let event = h.store.seed_event("Festival");
            let ticket = h.store.seed_ticket(event, "Pass", Money::from_units(350), INITIAL_STOCK);
            let mut issued: Vec<(PurchaseId, usize)> = Vec::new();

            for op in ops {
                match op {
                    Op::Buy { buyer, quantity } => {
                        if let Ok(receipt) = h.engine.purchase(buyers[buyer].id, ticket, quantity).await {
                            issued.push((receipt.purchase.id, buyer));
                        }
                    }
                    Op::Cancel { pick } if !issued.is_empty() => {
                        let (purchase_id, buyer) = issued[pick % issued.len()];
                        let principal = Principal::new(buyers[buyer].id, Role::User);
                        let _ = h.engine.cancel(purchase_id, principal).await;
                    }
                    Op::Redeem { pick } if !issued.is_empty() => {
                        let (purchase_id, _) = issued[pick % issued.len()];
                        if let Some(purchase) = h.store.purchase(purchase_id) {
                            let _ = h.engine.redeem(&purchase.redemption_token).await;
                        }
                    }
                    Op::Deposit { buyer, units } => {
                        let _ = h
                            .engine
                            .deposit(buyers[buyer].id, Money::from_units(units), PaymentMethod::Cash)
                            .await;
                    }
                    Op::Wait { hours } => h.clock.advance(Duration::hours(hours)),
                    Op::Cancel { .. } | Op::Redeem { .. } => {}
                }

                prop_assert!(h.store.unreconciled_accounts().is_empty());

                let sold: u32 = issued
                    .iter()
                    .filter_map(|(id, _)| h.store.purchase(*id))
                    .map(|p| p.quantity)
                    .sum();
                let remaining = h.store.ticket(ticket).unwrap().remaining_stock;
                prop_assert_eq!(remaining + sold, INITIAL_STOCK);
            }
            Ok(())
        })?;
    }
}
