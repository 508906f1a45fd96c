//! `PostgreSQL` implementation of the storage traits.

use boxoffice_core::store::{Store, StoreError, UnitOfWork};
use boxoffice_core::types::{
    Account, AccountId, BuyerSummary, EventId, EventSales, EventSummary, LedgerEntry,
    LedgerEntryId, LedgerKind, Money, NewAccount, NewLedgerEntry, NewPurchase, PaymentMethod,
    Purchase, PurchaseId, PurchaseView, RedemptionToken, Role, SalesStatistics, TicketId,
    TicketOffering, TicketSales, TicketSummary,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Acquire, Postgres, Row, Transaction};

const ACCOUNT_COLUMNS: &str = "id, display_name, email, role, active, balance_cents, \
     referral_code, referral_count, created_at";

const TICKET_COLUMNS: &str = "id, event_id, label, unit_price_cents, remaining_stock";

const PURCHASE_COLUMNS: &str = "id, buyer_id, ticket_id, quantity, unit_price_cents, \
     total_paid_cents, purchased_at, redemption_token, redeemed, redeemed_at";

const LEDGER_COLUMNS: &str =
    "id, reference, owner_id, kind, amount_cents, purchase_ref, payment_method, memo, created_at";

const VIEW_SELECT: &str = r"
    SELECT p.id, p.buyer_id, p.ticket_id, p.quantity, p.unit_price_cents,
           p.total_paid_cents, p.purchased_at, p.redemption_token, p.redeemed,
           p.redeemed_at,
           a.display_name AS buyer_name, a.email AS buyer_email,
           t.label AS ticket_label, t.unit_price_cents AS ticket_unit_price_cents,
           t.event_id,
           e.title AS event_title, e.starts_on AS event_starts_on,
           e.venue AS event_venue, e.image_url AS event_image_url
    FROM purchases p
    JOIN accounts a ON a.id = p.buyer_id
    JOIN ticket_offerings t ON t.id = p.ticket_id
    JOIN events e ON e.id = t.event_id";

/// `PostgreSQL`-backed store.
///
/// Every unit of work is one database transaction. Rows are locked with
/// `SELECT ... FOR UPDATE`, stock moves through conditional updates, and
/// uniqueness comes from the schema's constraints.
///
/// # Example
///
/// ```no_run
/// use boxoffice_postgres::PostgresStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresStore::new("postgres://localhost/boxoffice").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to `database_url` with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Box office schema migrated");
        Ok(())
    }
}

impl Store for PostgresStore {
    type Tx = PgUnitOfWork;

    fn begin(&self) -> BoxFuture<'_, Result<Self::Tx, StoreError>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(map_db_err)?;
            Ok(PgUnitOfWork { tx })
        })
    }

    fn find_view_by_token<'a>(
        &'a self,
        token: &'a RedemptionToken,
    ) -> BoxFuture<'a, Result<Option<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let sql = format!("{VIEW_SELECT} WHERE p.redemption_token = $1");
            sqlx::query(&sql)
                .bind(token.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(view_from_row)
                .transpose()
        })
    }

    fn find_account(&self, id: AccountId) -> BoxFuture<'_, Result<Option<Account>, StoreError>> {
        Box::pin(async move {
            let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
            sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(account_from_row)
                .transpose()
        })
    }

    fn ledger_history(
        &self,
        owner: AccountId,
    ) -> BoxFuture<'_, Result<Vec<LedgerEntry>, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE owner_id = $1 \
                 ORDER BY created_at DESC, id DESC"
            );
            sqlx::query(&sql)
                .bind(owner.get())
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?
                .iter()
                .map(ledger_from_row)
                .collect()
        })
    }

    fn purchases_by_buyer(
        &self,
        buyer: AccountId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let sql =
                format!("{VIEW_SELECT} WHERE p.buyer_id = $1 ORDER BY p.purchased_at DESC, p.id DESC");
            sqlx::query(&sql)
                .bind(buyer.get())
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?
                .iter()
                .map(view_from_row)
                .collect()
        })
    }

    fn find_purchase_view(
        &self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let sql = format!("{VIEW_SELECT} WHERE p.id = $1");
            sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(view_from_row)
                .transpose()
        })
    }

    fn purchases_by_event(
        &self,
        event: EventId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let sql =
                format!("{VIEW_SELECT} WHERE t.event_id = $1 ORDER BY p.purchased_at DESC, p.id DESC");
            sqlx::query(&sql)
                .bind(event.get())
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?
                .iter()
                .map(view_from_row)
                .collect()
        })
    }

    fn purchases_since(
        &self,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "{VIEW_SELECT} WHERE p.purchased_at >= $1 ORDER BY p.purchased_at DESC, p.id DESC"
            );
            sqlx::query(&sql)
                .bind(since)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?
                .iter()
                .map(view_from_row)
                .collect()
        })
    }

    fn sales_statistics(&self) -> BoxFuture<'_, Result<SalesStatistics, StoreError>> {
        Box::pin(async move {
            // One snapshot for the three reads.
            let mut tx = self.pool.begin().await.map_err(map_db_err)?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;

            let totals = sqlx::query(
                r"
                SELECT COUNT(*)::BIGINT AS total_purchases,
                       COALESCE(SUM(quantity), 0)::BIGINT AS units_sold,
                       COALESCE(SUM(total_paid_cents), 0)::BIGINT AS revenue_cents
                FROM purchases
                ",
            )
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?;

            let best_selling_ticket = sqlx::query(
                r"
                SELECT t.id, t.label, SUM(p.quantity)::BIGINT AS units
                FROM purchases p
                JOIN ticket_offerings t ON t.id = p.ticket_id
                GROUP BY t.id, t.label
                ORDER BY units DESC, t.id ASC
                LIMIT 1
                ",
            )
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_err)?
            .map(|row| -> Result<TicketSales, StoreError> {
                Ok(TicketSales {
                    ticket_id: TicketId::new(get(&row, "id")?),
                    label: get(&row, "label")?,
                    units: total(&row, "units")?,
                })
            })
            .transpose()?;

            let most_popular_event = sqlx::query(
                r"
                SELECT e.id, e.title, SUM(p.quantity)::BIGINT AS units
                FROM purchases p
                JOIN ticket_offerings t ON t.id = p.ticket_id
                JOIN events e ON e.id = t.event_id
                GROUP BY e.id, e.title
                ORDER BY units DESC, e.id ASC
                LIMIT 1
                ",
            )
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_err)?
            .map(|row| -> Result<EventSales, StoreError> {
                Ok(EventSales {
                    event_id: EventId::new(get(&row, "id")?),
                    title: get(&row, "title")?,
                    units: total(&row, "units")?,
                })
            })
            .transpose()?;

            tx.commit().await.map_err(map_db_err)?;

            Ok(SalesStatistics {
                total_purchases: total(&totals, "total_purchases")?,
                units_sold: total(&totals, "units_sold")?,
                revenue: money(&totals, "revenue_cents")?,
                best_selling_ticket,
                most_popular_event,
            })
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;
            Ok(())
        })
    }
}

/// One database transaction.
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl UnitOfWork for PgUnitOfWork {
    fn lock_account(
        &mut self,
        id: AccountId,
    ) -> BoxFuture<'_, Result<Option<Account>, StoreError>> {
        Box::pin(async move {
            let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE");
            sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(account_from_row)
                .transpose()
        })
    }

    fn lock_account_by_referral_code<'a>(
        &'a mut self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Option<Account>, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE referral_code = $1 FOR UPDATE"
            );
            sqlx::query(&sql)
                .bind(code)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(account_from_row)
                .transpose()
        })
    }

    fn insert_account(
        &mut self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<Account, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO accounts (display_name, email, referral_code, created_at) \
                 VALUES ($1, $2, $3, $4) RETURNING {ACCOUNT_COLUMNS}"
            );
            // Savepoint: a unique violation must not abort the outer transaction.
            let mut savepoint = (&mut *self.tx).begin().await.map_err(map_db_err)?;
            let inserted = sqlx::query(&sql)
                .bind(&account.display_name)
                .bind(&account.email)
                .bind(&account.referral_code)
                .bind(account.created_at)
                .fetch_one(&mut *savepoint)
                .await;
            match inserted {
                Ok(row) => {
                    savepoint.commit().await.map_err(map_db_err)?;
                    account_from_row(&row)
                }
                Err(e) => {
                    savepoint.rollback().await.map_err(map_db_err)?;
                    Err(map_db_err(e))
                }
            }
        })
    }

    fn set_balance(
        &mut self,
        id: AccountId,
        balance: Money,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query("UPDATE accounts SET balance_cents = $2 WHERE id = $1")
                .bind(id.get())
                .bind(cents_to_db(balance)?)
                .execute(&mut *self.tx)
                .await
                .map_err(map_db_err)?;
            Ok(())
        })
    }

    fn increment_referral_count(&mut self, id: AccountId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query("UPDATE accounts SET referral_count = referral_count + 1 WHERE id = $1")
                .bind(id.get())
                .execute(&mut *self.tx)
                .await
                .map_err(map_db_err)?;
            Ok(())
        })
    }

    fn find_ticket(
        &mut self,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<TicketOffering>, StoreError>> {
        Box::pin(async move {
            let sql = format!("SELECT {TICKET_COLUMNS} FROM ticket_offerings WHERE id = $1");
            sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(ticket_from_row)
                .transpose()
        })
    }

    fn reserve_stock(
        &mut self,
        id: TicketId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<Option<u32>, StoreError>> {
        Box::pin(async move {
            // Stock is an INTEGER; a larger request can never be satisfied.
            let Ok(requested) = i32::try_from(quantity) else {
                return Ok(None);
            };
            let remaining: Option<i32> = sqlx::query_scalar(
                r"
                UPDATE ticket_offerings
                SET remaining_stock = remaining_stock - $2
                WHERE id = $1 AND remaining_stock >= $2
                RETURNING remaining_stock
                ",
            )
            .bind(id.get())
            .bind(requested)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_err)?;

            remaining
                .map(|remaining| {
                    u32::try_from(remaining)
                        .ok()
                        .and_then(|remaining| remaining.checked_add(quantity))
                        .ok_or_else(|| StoreError::Corrupt(format!("ticket {id} stock {remaining}")))
                })
                .transpose()
        })
    }

    fn release_stock(
        &mut self,
        id: TicketId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let quantity = i32::try_from(quantity)
                .map_err(|_| StoreError::Corrupt(format!("release of {quantity} units")))?;
            sqlx::query(
                "UPDATE ticket_offerings SET remaining_stock = remaining_stock + $2 WHERE id = $1",
            )
            .bind(id.get())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
            Ok(())
        })
    }

    fn insert_purchase(
        &mut self,
        purchase: NewPurchase,
    ) -> BoxFuture<'_, Result<Purchase, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO purchases (buyer_id, ticket_id, quantity, unit_price_cents, \
                 total_paid_cents, purchased_at, redemption_token) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PURCHASE_COLUMNS}"
            );
            let quantity = i32::try_from(purchase.quantity)
                .map_err(|_| StoreError::Corrupt(format!("quantity {}", purchase.quantity)))?;
            let unit_price = cents_to_db(purchase.unit_price)?;
            let total = cents_to_db(purchase.total_paid)?;

            let mut savepoint = (&mut *self.tx).begin().await.map_err(map_db_err)?;
            let inserted = sqlx::query(&sql)
                .bind(purchase.buyer_id.get())
                .bind(purchase.ticket_id.get())
                .bind(quantity)
                .bind(unit_price)
                .bind(total)
                .bind(purchase.purchased_at)
                .bind(purchase.redemption_token.as_str())
                .fetch_one(&mut *savepoint)
                .await;
            match inserted {
                Ok(row) => {
                    savepoint.commit().await.map_err(map_db_err)?;
                    purchase_from_row(&row)
                }
                Err(e) => {
                    savepoint.rollback().await.map_err(map_db_err)?;
                    Err(map_db_err(e))
                }
            }
        })
    }

    fn lock_purchase(
        &mut self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<Purchase>, StoreError>> {
        Box::pin(async move {
            let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1 FOR UPDATE");
            sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(purchase_from_row)
                .transpose()
        })
    }

    fn lock_purchase_by_token<'a>(
        &'a mut self,
        token: &'a RedemptionToken,
    ) -> BoxFuture<'a, Result<Option<Purchase>, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE redemption_token = $1 FOR UPDATE"
            );
            sqlx::query(&sql)
                .bind(token.as_str())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(purchase_from_row)
                .transpose()
        })
    }

    fn mark_redeemed(
        &mut self,
        id: PurchaseId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE purchases SET redeemed = TRUE, redeemed_at = $2 WHERE id = $1 AND NOT redeemed",
            )
            .bind(id.get())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn delete_purchase(&mut self, id: PurchaseId) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM purchases WHERE id = $1")
                .bind(id.get())
                .execute(&mut *self.tx)
                .await
                .map_err(map_db_err)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn append_ledger_entry(
        &mut self,
        entry: NewLedgerEntry,
    ) -> BoxFuture<'_, Result<LedgerEntry, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO ledger_entries (reference, owner_id, kind, amount_cents, \
                 purchase_ref, payment_method, memo, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {LEDGER_COLUMNS}"
            );
            let amount = cents_to_db(entry.amount)?;

            let mut savepoint = (&mut *self.tx).begin().await.map_err(map_db_err)?;
            let inserted = sqlx::query(&sql)
                .bind(&entry.reference)
                .bind(entry.owner_id.get())
                .bind(entry.kind.as_str())
                .bind(amount)
                .bind(entry.purchase_ref.map(PurchaseId::get))
                .bind(entry.payment_method.map(PaymentMethod::as_str))
                .bind(entry.memo.as_deref())
                .bind(entry.created_at)
                .fetch_one(&mut *savepoint)
                .await;
            match inserted {
                Ok(row) => {
                    savepoint.commit().await.map_err(map_db_err)?;
                    ledger_from_row(&row)
                }
                Err(e) => {
                    savepoint.rollback().await.map_err(map_db_err)?;
                    Err(map_db_err(e))
                }
            }
        })
    }

    fn link_ledger_entry(
        &mut self,
        entry: LedgerEntryId,
        purchase: PurchaseId,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE ledger_entries SET purchase_ref = $2 WHERE id = $1 AND purchase_ref IS NULL",
            )
            .bind(entry.get())
            .bind(purchase.get())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
            if result.rows_affected() == 1 {
                Ok(())
            } else {
                Err(StoreError::Corrupt(format!(
                    "ledger entry {entry} missing or already linked"
                )))
            }
        })
    }

    fn purchase_view(
        &mut self,
        id: PurchaseId,
    ) -> BoxFuture<'_, Result<Option<PurchaseView>, StoreError>> {
        Box::pin(async move {
            let sql = format!("{VIEW_SELECT} WHERE p.id = $1");
            sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_db_err)?
                .as_ref()
                .map(view_from_row)
                .transpose()
        })
    }

    fn commit(self) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(async move { self.tx.commit().await.map_err(map_db_err) })
    }

    fn rollback(self) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(async move { self.tx.rollback().await.map_err(map_db_err) })
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// Maps a driver error onto [`StoreError`].
///
/// Unique violations keep their constraint name; deadlocks (`40P01`) and
/// serialization failures (`40001`) become [`StoreError::Aborted`].
fn map_db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation {
                constraint: db.constraint().unwrap_or_default().to_string(),
            };
        }
        if matches!(db.code().as_deref(), Some("40P01" | "40001")) {
            tracing::warn!(error = %db, "Transaction aborted by the database");
            metrics::counter!("boxoffice_store_aborts_total").increment(1);
            return StoreError::Aborted(db.message().to_string());
        }
    }
    StoreError::Database(e.to_string())
}

// ============================================================================
// Row decoding
// ============================================================================

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn money(row: &PgRow, column: &str) -> Result<Money, StoreError> {
    let cents: i64 = get(row, column)?;
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Corrupt(format!("negative amount in {column}")))
}

fn count(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let value: i32 = get(row, column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative count in {column}")))
}

fn total(row: &PgRow, column: &str) -> Result<u64, StoreError> {
    let value: i64 = get(row, column)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative total in {column}")))
}

fn cents_to_db(amount: Money) -> Result<i64, StoreError> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Corrupt(format!("amount {amount} exceeds BIGINT")))
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let role: String = get(row, "role")?;
    Ok(Account {
        id: AccountId::new(get(row, "id")?),
        display_name: get(row, "display_name")?,
        email: get(row, "email")?,
        role: Role::parse(&role).ok_or_else(|| StoreError::Corrupt(format!("role {role}")))?,
        active: get(row, "active")?,
        balance: money(row, "balance_cents")?,
        referral_code: get(row, "referral_code")?,
        referral_count: count(row, "referral_count")?,
        created_at: get(row, "created_at")?,
    })
}

fn ticket_from_row(row: &PgRow) -> Result<TicketOffering, StoreError> {
    Ok(TicketOffering {
        id: TicketId::new(get(row, "id")?),
        event_id: EventId::new(get(row, "event_id")?),
        label: get(row, "label")?,
        unit_price: money(row, "unit_price_cents")?,
        remaining_stock: count(row, "remaining_stock")?,
    })
}

fn purchase_from_row(row: &PgRow) -> Result<Purchase, StoreError> {
    let token: String = get(row, "redemption_token")?;
    Ok(Purchase {
        id: PurchaseId::new(get(row, "id")?),
        buyer_id: AccountId::new(get(row, "buyer_id")?),
        ticket_id: TicketId::new(get(row, "ticket_id")?),
        quantity: count(row, "quantity")?,
        unit_price: money(row, "unit_price_cents")?,
        total_paid: money(row, "total_paid_cents")?,
        purchased_at: get(row, "purchased_at")?,
        redemption_token: RedemptionToken::new(token),
        redeemed: get(row, "redeemed")?,
        redeemed_at: get(row, "redeemed_at")?,
    })
}

fn ledger_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let kind: String = get(row, "kind")?;
    let method: Option<String> = get(row, "payment_method")?;
    let payment_method = method
        .map(|m| {
            PaymentMethod::parse(&m).ok_or_else(|| StoreError::Corrupt(format!("payment method {m}")))
        })
        .transpose()?;
    let purchase_ref: Option<i64> = get(row, "purchase_ref")?;
    Ok(LedgerEntry {
        id: LedgerEntryId::new(get(row, "id")?),
        reference: get(row, "reference")?,
        owner_id: AccountId::new(get(row, "owner_id")?),
        kind: LedgerKind::parse(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("ledger kind {kind}")))?,
        amount: money(row, "amount_cents")?,
        purchase_ref: purchase_ref.map(PurchaseId::new),
        payment_method,
        memo: get(row, "memo")?,
        created_at: get(row, "created_at")?,
    })
}

fn view_from_row(row: &PgRow) -> Result<PurchaseView, StoreError> {
    let purchase = purchase_from_row(row)?;
    let event_id = EventId::new(get(row, "event_id")?);
    Ok(PurchaseView {
        buyer: BuyerSummary {
            id: purchase.buyer_id,
            display_name: get(row, "buyer_name")?,
            email: get(row, "buyer_email")?,
        },
        ticket: TicketSummary {
            id: purchase.ticket_id,
            label: get(row, "ticket_label")?,
            current_unit_price: money(row, "ticket_unit_price_cents")?,
        },
        event: EventSummary {
            id: event_id,
            title: get(row, "event_title")?,
            starts_on: get(row, "event_starts_on")?,
            venue: get(row, "event_venue")?,
            image_url: get(row, "event_image_url")?,
        },
        purchase,
    })
}
