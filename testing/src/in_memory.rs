//! In-memory [`Store`] with row-level locking.
//!
//! Mirrors the PostgreSQL store closely enough to exercise the engine's
//! concurrency guarantees without a database:
//!
//! - every row a unit of work locks is guarded by its own `tokio` mutex, held
//!   until commit or drop
//! - writes are staged in the unit of work and applied in one step at commit,
//!   so no other task ever sees partial state
//! - identifiers come from sequences and are never reused, even after a
//!   rollback
//!
//! Uniqueness of emails, referral codes, redemption tokens and ledger
//! references is checked at insert time and again at commit.

use crate::fixtures::AccountSeed;
use crate::mocks::test_clock;
use boxoffice_core::environment::Clock;
use boxoffice_core::store::{
    EMAIL_CONSTRAINT, LEDGER_REFERENCE_CONSTRAINT, REDEMPTION_TOKEN_CONSTRAINT,
    REFERRAL_CODE_CONSTRAINT, Store, StoreError, UnitOfWork,
};
use boxoffice_core::token::mint_ledger_reference;
use boxoffice_core::types::{
    Account, AccountId, BuyerSummary, EventId, EventSales, EventSummary, LedgerEntry,
    LedgerEntryId, LedgerKind, Money, NewAccount, NewLedgerEntry, NewPurchase, PaymentMethod,
    Purchase, PurchaseId, PurchaseView, RedemptionToken, SalesStatistics, TicketId,
    TicketOffering, TicketSales, TicketSummary,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum RowKey {
    Account(AccountId),
    Ticket(TicketId),
    Purchase(PurchaseId),
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    events: BTreeMap<EventId, EventSummary>,
    tickets: BTreeMap<TicketId, TicketOffering>,
    purchases: BTreeMap<PurchaseId, Purchase>,
    ledger: Vec<LedgerEntry>,
}

impl Tables {
    fn view(&self, purchase: &Purchase) -> Result<PurchaseView, StoreError> {
        build_view(
            purchase,
            self.accounts.get(&purchase.buyer_id),
            self.tickets.get(&purchase.ticket_id),
            &self.events,
        )
    }

    /// Views of every purchase matching `keep`, most recent first.
    fn views_where(
        &self,
        keep: impl Fn(&Purchase) -> bool,
    ) -> Result<Vec<PurchaseView>, StoreError> {
        let mut purchases: Vec<&Purchase> =
            self.purchases.values().filter(|purchase| keep(purchase)).collect();
        purchases.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at).then(b.id.cmp(&a.id)));
        purchases.into_iter().map(|purchase| self.view(purchase)).collect()
    }

    fn statistics(&self) -> Result<SalesStatistics, StoreError> {
        let mut units_sold: u64 = 0;
        let mut revenue = Money::ZERO;
        let mut by_ticket: BTreeMap<TicketId, u64> = BTreeMap::new();
        let mut by_event: BTreeMap<EventId, u64> = BTreeMap::new();

        for purchase in self.purchases.values() {
            let units = u64::from(purchase.quantity);
            units_sold = units_sold.saturating_add(units);
            revenue = revenue.checked_add(purchase.total_paid).ok_or_else(|| {
                StoreError::Corrupt("revenue overflows".to_string())
            })?;
            *by_ticket.entry(purchase.ticket_id).or_default() += units;
            let ticket = self.tickets.get(&purchase.ticket_id).ok_or_else(|| {
                StoreError::Corrupt(format!("purchase {} has no ticket", purchase.id))
            })?;
            *by_event.entry(ticket.event_id).or_default() += units;
        }

        let best_selling_ticket = top(&by_ticket).and_then(|(ticket_id, units)| {
            self.tickets.get(&ticket_id).map(|ticket| TicketSales {
                ticket_id,
                label: ticket.label.clone(),
                units,
            })
        });
        let most_popular_event = top(&by_event).and_then(|(event_id, units)| {
            self.events.get(&event_id).map(|event| EventSales {
                event_id,
                title: event.title.clone(),
                units,
            })
        });

        Ok(SalesStatistics {
            total_purchases: u64::try_from(self.purchases.len()).unwrap_or(u64::MAX),
            units_sold,
            revenue,
            best_selling_ticket,
            most_popular_event,
        })
    }
}

/// Highest count, ties to the lowest key.
fn top<K: Copy + Ord>(counts: &BTreeMap<K, u64>) -> Option<(K, u64)> {
    counts
        .iter()
        .fold(None, |best: Option<(K, u64)>, (&key, &units)| match best {
            Some((_, best_units)) if best_units >= units => best,
            _ => Some((key, units)),
        })
}

#[derive(Debug, Default)]
struct Sequences {
    account: AtomicI64,
    event: AtomicI64,
    ticket: AtomicI64,
    purchase: AtomicI64,
    ledger: AtomicI64,
}

fn next(sequence: &AtomicI64) -> i64 {
    sequence.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Debug, Default)]
struct Faults {
    fail_next_commit: AtomicBool,
    token_collisions: AtomicU32,
    reference_collisions: AtomicU32,
}

/// Consumes one pending injected collision, if any.
fn take_collision(pending: &AtomicU32) -> bool {
    pending
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    sequences: Sequences,
    faults: Faults,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: RowKey) -> Arc<RowMutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }
}

/// In-memory store for tests.
///
/// Clones share the same tables.
///
/// # Example
///
/// ```
/// use boxoffice_testing::{AccountSeed, InMemoryStore};
/// use boxoffice_core::types::Money;
///
/// let store = InMemoryStore::new();
/// let event = store.seed_event("Concert");
/// let ticket = store.seed_ticket(event, "VIP", Money::from_units(500), 10);
/// let buyer = store.seed_account(AccountSeed::new("Ada").balance(Money::from_units(1000)));
///
/// assert_eq!(store.ticket(ticket).map(|t| t.remaining_stock), Some(10));
/// assert_eq!(buyer.balance, Money::from_units(1000));
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════
    // Seeding
    // ═══════════════════════════════════════════════════════════

    /// Inserts an account directly, bypassing the engine.
    ///
    /// A non-zero opening balance is written as a `deposit` ledger entry so
    /// the account reconciles. Seeded rows are stamped with [`test_clock`]'s
    /// time.
    #[must_use]
    pub fn seed_account(&self, seed: AccountSeed) -> Account {
        let now = test_clock().now();
        let id = AccountId::new(next(&self.shared.sequences.account));
        let account = Account {
            id,
            display_name: seed.display_name,
            email: seed.email,
            role: seed.role,
            active: seed.active,
            balance: seed.balance,
            referral_code: seed.referral_code,
            referral_count: 0,
            created_at: now,
        };

        let mut tables = self.shared.tables();
        if !seed.balance.is_zero() {
            tables.ledger.push(LedgerEntry {
                id: LedgerEntryId::new(next(&self.shared.sequences.ledger)),
                reference: mint_ledger_reference(LedgerKind::Deposit),
                owner_id: id,
                kind: LedgerKind::Deposit,
                amount: seed.balance,
                purchase_ref: None,
                payment_method: Some(PaymentMethod::Cash),
                memo: Some("opening balance".to_string()),
                created_at: now,
            });
        }
        tables.accounts.insert(id, account.clone());
        account
    }

    /// Inserts an event.
    #[must_use]
    pub fn seed_event(&self, title: &str) -> EventId {
        let id = EventId::new(next(&self.shared.sequences.event));
        self.shared.tables().events.insert(
            id,
            EventSummary {
                id,
                title: title.to_string(),
                starts_on: None,
                venue: None,
                image_url: None,
            },
        );
        id
    }

    /// Inserts a ticket offering.
    #[must_use]
    pub fn seed_ticket(&self, event_id: EventId, label: &str, unit_price: Money, stock: u32) -> TicketId {
        let id = TicketId::new(next(&self.shared.sequences.ticket));
        self.shared.tables().tickets.insert(
            id,
            TicketOffering {
                id,
                event_id,
                label: label.to_string(),
                unit_price,
                remaining_stock: stock,
            },
        );
        id
    }

    /// Activates or deactivates an account.
    pub fn set_account_active(&self, id: AccountId, active: bool) {
        if let Some(account) = self.shared.tables().accounts.get_mut(&id) {
            account.active = active;
        }
    }

    /// Changes a ticket's current price.
    pub fn set_unit_price(&self, id: TicketId, unit_price: Money) {
        if let Some(ticket) = self.shared.tables().tickets.get_mut(&id) {
            ticket.unit_price = unit_price;
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════

    /// Committed ticket row.
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> Option<TicketOffering> {
        self.shared.tables().tickets.get(&id).cloned()
    }

    /// Committed account row.
    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.shared.tables().accounts.get(&id).cloned()
    }

    /// Committed purchase row.
    #[must_use]
    pub fn purchase(&self, id: PurchaseId) -> Option<Purchase> {
        self.shared.tables().purchases.get(&id).cloned()
    }

    /// Number of committed purchases.
    #[must_use]
    pub fn purchase_count(&self) -> usize {
        self.shared.tables().purchases.len()
    }

    /// Every committed ledger entry, oldest first.
    #[must_use]
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.shared.tables().ledger.clone()
    }

    /// Accounts whose cached balance differs from the net of their ledger.
    ///
    /// Empty whenever the store is consistent.
    #[must_use]
    pub fn unreconciled_accounts(&self) -> Vec<AccountId> {
        let tables = self.shared.tables();
        tables
            .accounts
            .values()
            .filter(|account| {
                let net: i128 = tables
                    .ledger
                    .iter()
                    .filter(|entry| entry.owner_id == account.id)
                    .map(LedgerEntry::signed_cents)
                    .sum();
                net != i128::from(account.balance.cents())
            })
            .map(|account| account.id)
            .collect()
    }

    // ═══════════════════════════════════════════════════════════
    // Fault injection
    // ═══════════════════════════════════════════════════════════

    /// Makes the next commit fail with a database error, discarding its writes.
    pub fn fail_next_commit(&self) {
        self.shared.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Makes the next `count` purchase inserts fail on the token constraint.
    pub fn collide_next_tokens(&self, count: u32) {
        self.shared.faults.token_collisions.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` ledger appends fail on the reference constraint.
    pub fn collide_next_references(&self, count: u32) {
        self.shared.faults.reference_collisions.store(count, Ordering::SeqCst);
    }
}

impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    fn begin(&self) -> BoxFuture<'_, Result<Self::Tx, StoreError>> {
        let tx = InMemoryTx::new(Arc::clone(&self.shared));
        Box::pin(async move { Ok(tx) })
    }

    fn find_view_by_token<'a>(
        &'a self,
        token: &'a RedemptionToken,
    ) -> BoxFuture<'a, Result<Option<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let tables = self.shared.tables();
            tables
                .purchases
                .values()
                .find(|purchase| &purchase.redemption_token == token)
                .map(|purchase| tables.view(purchase))
                .transpose()
        })
    }

    fn find_account(&self, id: AccountId) -> BoxFuture<'_, Result<Option<Account>, StoreError>> {
        Box::pin(async move { Ok(self.account(id)) })
    }

    fn ledger_history(
        &self,
        owner: AccountId,
    ) -> BoxFuture<'_, Result<Vec<LedgerEntry>, StoreError>> {
        Box::pin(async move {
            let mut entries: Vec<LedgerEntry> = self
                .shared
                .tables()
                .ledger
                .iter()
                .filter(|entry| entry.owner_id == owner)
                .cloned()
                .collect();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(entries)
        })
    }

    fn purchases_by_buyer(
        &self,
        buyer: AccountId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let tables = self.shared.tables();
            let mut purchases: Vec<&Purchase> = tables
                .purchases
                .values()
                .filter(|purchase| purchase.buyer_id == buyer)
                .collect();
            purchases.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at).then(b.id.cmp(&a.id)));
            purchases.into_iter().map(|purchase| tables.view(purchase)).collect()
        })
    }

    fn find_purchase_view(
        &self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let tables = self.shared.tables();
            tables.purchases.get(&id).map(|purchase| tables.view(purchase)).transpose()
        })
    }

    fn purchases_by_event(
        &self,
        event: EventId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let tables = self.shared.tables();
            tables.views_where(|purchase| {
                tables
                    .tickets
                    .get(&purchase.ticket_id)
                    .is_some_and(|ticket| ticket.event_id == event)
            })
        })
    }

    fn purchases_since(
        &self,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>> {
        Box::pin(async move {
            self.shared
                .tables()
                .views_where(|purchase| purchase.purchased_at >= since)
        })
    }

    fn sales_statistics(&self) -> BoxFuture<'_, Result<SalesStatistics, StoreError>> {
        Box::pin(async move { self.shared.tables().statistics() })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// Locked rows are copied into the unit of work and edited there; new rows
/// live only here until commit.
pub struct InMemoryTx {
    shared: Arc<Shared>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    accounts: HashMap<AccountId, Account>,
    new_accounts: Vec<AccountId>,
    tickets: HashMap<TicketId, TicketOffering>,
    purchases: HashMap<PurchaseId, Purchase>,
    new_purchases: Vec<PurchaseId>,
    deleted: HashSet<PurchaseId>,
    ledger: Vec<LedgerEntry>,
}

impl InMemoryTx {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            held: HashMap::new(),
            accounts: HashMap::new(),
            new_accounts: Vec::new(),
            tickets: HashMap::new(),
            purchases: HashMap::new(),
            new_purchases: Vec::new(),
            deleted: HashSet::new(),
            ledger: Vec::new(),
        }
    }

    async fn lock(&mut self, key: RowKey) {
        if self.held.contains_key(&key) {
            return;
        }
        let guard = self.shared.row_lock(key).lock_owned().await;
        self.held.insert(key, guard);
    }

    async fn lock_account_row(&mut self, id: AccountId) -> Option<Account> {
        self.lock(RowKey::Account(id)).await;
        if let Some(account) = self.accounts.get(&id) {
            return Some(account.clone());
        }
        let committed = self.shared.tables().accounts.get(&id).cloned();
        if let Some(account) = &committed {
            self.accounts.insert(id, account.clone());
        }
        committed
    }

    async fn lock_ticket_row(&mut self, id: TicketId) -> Option<&mut TicketOffering> {
        self.lock(RowKey::Ticket(id)).await;
        if !self.tickets.contains_key(&id) {
            let committed = self.shared.tables().tickets.get(&id).cloned();
            self.tickets.insert(id, committed?);
        }
        self.tickets.get_mut(&id)
    }

    async fn lock_purchase_row(&mut self, id: PurchaseId) -> Option<Purchase> {
        self.lock(RowKey::Purchase(id)).await;
        if self.deleted.contains(&id) {
            return None;
        }
        if let Some(purchase) = self.purchases.get(&id) {
            return Some(purchase.clone());
        }
        let committed = self.shared.tables().purchases.get(&id).cloned();
        if let Some(purchase) = &committed {
            self.purchases.insert(id, purchase.clone());
        }
        committed
    }

    fn locked_account(&mut self, id: AccountId) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("account {id} is not locked")))
    }

    fn check_unique_account(&self, tables: &Tables, account: &Account) -> Result<(), StoreError> {
        let others = tables
            .accounts
            .values()
            .chain(self.accounts.values())
            .filter(|other| other.id != account.id);
        for other in others {
            if other.email == account.email {
                return Err(StoreError::UniqueViolation {
                    constraint: EMAIL_CONSTRAINT.to_string(),
                });
            }
            if other.referral_code.is_some() && other.referral_code == account.referral_code {
                return Err(StoreError::UniqueViolation {
                    constraint: REFERRAL_CODE_CONSTRAINT.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_unique_token(&self, tables: &Tables, purchase: &Purchase) -> Result<(), StoreError> {
        let taken = tables
            .purchases
            .values()
            .chain(self.purchases.values())
            .any(|other| other.id != purchase.id && other.redemption_token == purchase.redemption_token);
        if taken {
            return Err(StoreError::UniqueViolation {
                constraint: REDEMPTION_TOKEN_CONSTRAINT.to_string(),
            });
        }
        Ok(())
    }

    fn check_unique_reference(&self, tables: &Tables, entry: &LedgerEntry) -> Result<(), StoreError> {
        let taken = tables
            .ledger
            .iter()
            .chain(self.ledger.iter())
            .any(|other| other.id != entry.id && other.reference == entry.reference);
        if taken {
            return Err(StoreError::UniqueViolation {
                constraint: LEDGER_REFERENCE_CONSTRAINT.to_string(),
            });
        }
        Ok(())
    }

    fn apply(self) -> Result<(), StoreError> {
        if self.shared.faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }

        let shared = Arc::clone(&self.shared);
        let mut tables = shared.tables();

        for id in &self.new_accounts {
            if let Some(account) = self.accounts.get(id) {
                self.check_unique_account(&tables, account)?;
            }
        }
        for id in &self.new_purchases {
            if let Some(purchase) = self.purchases.get(id) {
                self.check_unique_token(&tables, purchase)?;
            }
        }
        for entry in &self.ledger {
            self.check_unique_reference(&tables, entry)?;
        }

        let Self {
            held,
            accounts,
            tickets,
            purchases,
            deleted,
            ledger,
            ..
        } = self;

        tables.accounts.extend(accounts);
        tables.tickets.extend(tickets);
        tables.purchases.extend(purchases);
        for id in &deleted {
            tables.purchases.remove(id);
        }
        tables.ledger.extend(ledger);

        drop(tables);
        drop(held);
        Ok(())
    }
}

impl UnitOfWork for InMemoryTx {
    fn lock_account(
        &mut self,
        id: AccountId,
    ) -> BoxFuture<'_, Result<Option<Account>, StoreError>> {
        Box::pin(async move { Ok(self.lock_account_row(id).await) })
    }

    fn lock_account_by_referral_code<'a>(
        &'a mut self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Option<Account>, StoreError>> {
        Box::pin(async move {
            let matches = |account: &Account| account.referral_code.as_deref() == Some(code);
            let staged = self.accounts.values().find(|a| matches(a)).map(|a| a.id);
            let id = match staged {
                Some(id) => Some(id),
                None => self.shared.tables().accounts.values().find(|a| matches(a)).map(|a| a.id),
            };
            match id {
                Some(id) => Ok(self.lock_account_row(id).await.filter(matches)),
                None => Ok(None),
            }
        })
    }

    fn insert_account(
        &mut self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<Account, StoreError>> {
        Box::pin(async move {
            let id = AccountId::new(next(&self.shared.sequences.account));
            let account = Account {
                id,
                display_name: account.display_name,
                email: account.email,
                role: boxoffice_core::types::Role::User,
                active: true,
                balance: Money::ZERO,
                referral_code: Some(account.referral_code),
                referral_count: 0,
                created_at: account.created_at,
            };
            {
                let tables = self.shared.tables();
                self.check_unique_account(&tables, &account)?;
            }
            self.accounts.insert(id, account.clone());
            self.new_accounts.push(id);
            Ok(account)
        })
    }

    fn set_balance(
        &mut self,
        id: AccountId,
        balance: Money,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.locked_account(id)?.balance = balance;
            Ok(())
        })
    }

    fn increment_referral_count(&mut self, id: AccountId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let account = self.locked_account(id)?;
            account.referral_count = account.referral_count.saturating_add(1);
            Ok(())
        })
    }

    fn find_ticket(
        &mut self,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<TicketOffering>, StoreError>> {
        Box::pin(async move {
            if let Some(ticket) = self.tickets.get(&id) {
                return Ok(Some(ticket.clone()));
            }
            Ok(self.shared.tables().tickets.get(&id).cloned())
        })
    }

    fn reserve_stock(
        &mut self,
        id: TicketId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<Option<u32>, StoreError>> {
        Box::pin(async move {
            let Some(ticket) = self.lock_ticket_row(id).await else {
                return Ok(None);
            };
            let previous = ticket.remaining_stock;
            match previous.checked_sub(quantity) {
                Some(remaining) => {
                    ticket.remaining_stock = remaining;
                    Ok(Some(previous))
                }
                None => Ok(None),
            }
        })
    }

    fn release_stock(
        &mut self,
        id: TicketId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if let Some(ticket) = self.lock_ticket_row(id).await {
                ticket.remaining_stock = ticket.remaining_stock.saturating_add(quantity);
            }
            Ok(())
        })
    }

    fn insert_purchase(
        &mut self,
        purchase: NewPurchase,
    ) -> BoxFuture<'_, Result<Purchase, StoreError>> {
        Box::pin(async move {
            if take_collision(&self.shared.faults.token_collisions) {
                return Err(StoreError::UniqueViolation {
                    constraint: REDEMPTION_TOKEN_CONSTRAINT.to_string(),
                });
            }

            let id = PurchaseId::new(next(&self.shared.sequences.purchase));
            let purchase = Purchase {
                id,
                buyer_id: purchase.buyer_id,
                ticket_id: purchase.ticket_id,
                quantity: purchase.quantity,
                unit_price: purchase.unit_price,
                total_paid: purchase.total_paid,
                purchased_at: purchase.purchased_at,
                redemption_token: purchase.redemption_token,
                redeemed: false,
                redeemed_at: None,
            };
            {
                let tables = self.shared.tables();
                self.check_unique_token(&tables, &purchase)?;
            }
            self.purchases.insert(id, purchase.clone());
            self.new_purchases.push(id);
            Ok(purchase)
        })
    }

    fn lock_purchase(
        &mut self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<Purchase>, StoreError>> {
        Box::pin(async move { Ok(self.lock_purchase_row(id).await) })
    }

    fn lock_purchase_by_token<'a>(
        &'a mut self,
        token: &'a RedemptionToken,
    ) -> BoxFuture<'a, Result<Option<Purchase>, StoreError>> {
        Box::pin(async move {
            let staged = self
                .purchases
                .values()
                .find(|p| &p.redemption_token == token)
                .map(|p| p.id);
            let id = match staged {
                Some(id) => Some(id),
                None => self
                    .shared
                    .tables()
                    .purchases
                    .values()
                    .find(|p| &p.redemption_token == token)
                    .map(|p| p.id),
            };
            match id {
                Some(id) => Ok(self
                    .lock_purchase_row(id)
                    .await
                    .filter(|p| &p.redemption_token == token)),
                None => Ok(None),
            }
        })
    }

    fn mark_redeemed(
        &mut self,
        id: PurchaseId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            match self.purchases.get_mut(&id) {
                Some(purchase) if !purchase.redeemed => {
                    purchase.redeemed = true;
                    purchase.redeemed_at = Some(at);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn delete_purchase(&mut self, id: PurchaseId) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            if self.purchases.remove(&id).is_some() {
                self.deleted.insert(id);
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    fn append_ledger_entry(
        &mut self,
        entry: NewLedgerEntry,
    ) -> BoxFuture<'_, Result<LedgerEntry, StoreError>> {
        Box::pin(async move {
            if take_collision(&self.shared.faults.reference_collisions) {
                return Err(StoreError::UniqueViolation {
                    constraint: LEDGER_REFERENCE_CONSTRAINT.to_string(),
                });
            }

            let entry = LedgerEntry {
                id: LedgerEntryId::new(next(&self.shared.sequences.ledger)),
                reference: entry.reference,
                owner_id: entry.owner_id,
                kind: entry.kind,
                amount: entry.amount,
                purchase_ref: entry.purchase_ref,
                payment_method: entry.payment_method,
                memo: entry.memo,
                created_at: entry.created_at,
            };
            {
                let tables = self.shared.tables();
                self.check_unique_reference(&tables, &entry)?;
            }
            self.ledger.push(entry.clone());
            Ok(entry)
        })
    }

    fn link_ledger_entry(
        &mut self,
        entry: LedgerEntryId,
        purchase: PurchaseId,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let staged = self
                .ledger
                .iter_mut()
                .find(|e| e.id == entry)
                .ok_or_else(|| {
                    StoreError::Corrupt(format!("ledger entry {entry} not written in this unit"))
                })?;
            staged.purchase_ref = Some(purchase);
            Ok(())
        })
    }

    fn purchase_view(
        &mut self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<PurchaseView>, StoreError>> {
        Box::pin(async move {
            if self.deleted.contains(&id) {
                return Ok(None);
            }
            let tables = self.shared.tables();
            let Some(purchase) = self.purchases.get(&id).or_else(|| tables.purchases.get(&id))
            else {
                return Ok(None);
            };
            let buyer = self
                .accounts
                .get(&purchase.buyer_id)
                .or_else(|| tables.accounts.get(&purchase.buyer_id));
            let ticket = self
                .tickets
                .get(&purchase.ticket_id)
                .or_else(|| tables.tickets.get(&purchase.ticket_id));
            build_view(purchase, buyer, ticket, &tables.events).map(Some)
        })
    }

    fn commit(self) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(async move { self.apply() })
    }

    fn rollback(self) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(async move {
            drop(self);
            Ok(())
        })
    }
}

fn build_view(
    purchase: &Purchase,
    buyer: Option<&Account>,
    ticket: Option<&TicketOffering>,
    events: &BTreeMap<EventId, EventSummary>,
) -> Result<PurchaseView, StoreError> {
    let corrupt = |what: &str| StoreError::Corrupt(format!("purchase {} has no {what}", purchase.id));
    let buyer = buyer.ok_or_else(|| corrupt("buyer"))?;
    let ticket = ticket.ok_or_else(|| corrupt("ticket"))?;
    let event = events.get(&ticket.event_id).ok_or_else(|| corrupt("event"))?;
    Ok(PurchaseView {
        purchase: purchase.clone(),
        buyer: BuyerSummary {
            id: buyer.id,
            display_name: buyer.display_name.clone(),
            email: buyer.email.clone(),
        },
        ticket: TicketSummary {
            id: ticket.id,
            label: ticket.label.clone(),
            current_unit_price: ticket.unit_price,
        },
        event: event.clone(),
    })
}
