//! Test data builders and a ready-made engine harness.

use crate::in_memory::InMemoryStore;
use crate::mocks::{ManualClock, test_clock};
use boxoffice_core::engine::{BoxOffice, EnginePolicy};
use boxoffice_core::environment::Clock;
use boxoffice_core::types::{Money, Role};
use std::sync::Arc;

/// Builder for accounts inserted with [`InMemoryStore::seed_account`].
#[derive(Clone, Debug)]
pub struct AccountSeed {
    pub(crate) display_name: String,
    pub(crate) email: String,
    pub(crate) role: Role,
    pub(crate) active: bool,
    pub(crate) balance: Money,
    pub(crate) referral_code: Option<String>,
}

impl AccountSeed {
    /// Active `user` account with a zero balance and an email derived from
    /// `display_name`.
    #[must_use]
    pub fn new(display_name: &str) -> Self {
        let local: String = display_name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();
        Self {
            display_name: display_name.to_string(),
            email: format!("{local}@example.com"),
            role: Role::User,
            active: true,
            balance: Money::ZERO,
            referral_code: None,
        }
    }

    /// Opening balance, recorded as a deposit.
    #[must_use]
    pub const fn balance(mut self, balance: Money) -> Self {
        self.balance = balance;
        self
    }

    /// Administrator role.
    #[must_use]
    pub const fn admin(mut self) -> Self {
        self.role = Role::Admin;
        self
    }

    /// Deactivated account.
    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Referral code other accounts can quote.
    #[must_use]
    pub fn referral_code(mut self, code: &str) -> Self {
        self.referral_code = Some(code.to_string());
        self
    }

    /// Explicit email.
    #[must_use]
    pub fn email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }
}

/// An engine over a fresh [`InMemoryStore`] and a [`ManualClock`] starting at
/// 2025-01-01 00:00:00 UTC.
///
/// # Example
///
/// ```
/// use boxoffice_testing::Harness;
/// use boxoffice_core::types::Money;
///
/// let harness = Harness::new();
/// let event = harness.store.seed_event("Concert");
/// let ticket = harness.store.seed_ticket(event, "VIP", Money::from_units(500), 1);
/// assert_eq!(harness.store.ticket(ticket).map(|t| t.remaining_stock), Some(1));
/// ```
#[derive(Clone)]
pub struct Harness {
    /// Shared store; seed and inspect it directly.
    pub store: InMemoryStore,
    /// Clock the engine reads.
    pub clock: Arc<ManualClock>,
    /// The engine under test.
    pub engine: BoxOffice<InMemoryStore>,
}

impl Harness {
    /// Harness with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(EnginePolicy::default())
    }

    /// Harness with an explicit policy.
    #[must_use]
    pub fn with_policy(policy: EnginePolicy) -> Self {
        let store = InMemoryStore::new();
        let clock = Arc::new(ManualClock::new(test_clock().now()));
        let engine = BoxOffice::with_clock(Arc::new(store.clone()), clock.clone(), policy);
        Self {
            store,
            clock,
            engine,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
