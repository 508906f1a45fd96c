//! Domain types for the box office engine.
//!
//! Identifiers, money, accounts, ticket offerings, purchases and ledger
//! entries. Everything here is plain data; the rules that mutate it live in
//! the [`ledger`](crate::ledger), [`inventory`](crate::inventory),
//! [`purchase`](crate::purchase), [`redemption`](crate::redemption) and
//! [`cancellation`](crate::cancellation) modules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw storage identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw storage identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identity of an account (buyer, referrer or administrator).
    AccountId
);
numeric_id!(
    /// Identity of a ticket offering.
    TicketId
);
numeric_id!(
    /// Identity of an event (display only).
    EventId
);
numeric_id!(
    /// Identity of a purchase.
    PurchaseId
);
numeric_id!(
    /// Identity of a ledger entry.
    LedgerEntryId
);

// ============================================================================
// Money
// ============================================================================

/// Fixed-point amount with two decimals, stored as cents.
///
/// Amounts are unsigned: the direction of a balance change is carried by the
/// [`LedgerKind`], never by the sign of the amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates an amount from whole currency units (saturating).
    #[must_use]
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(100))
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Subtracts `other`, `None` if the result would be negative.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Multiplies by a quantity, `None` on overflow.
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Reasons a decimal string is not a valid [`Money`] amount.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    /// Input was empty.
    #[error("amount is empty")]
    Empty,
    /// Input carried a minus sign.
    #[error("amount must not be negative")]
    Negative,
    /// More than two digits after the decimal point.
    #[error("amount has more than two decimal places")]
    TooPrecise,
    /// Non-digit characters.
    #[error("amount is not a decimal number")]
    Malformed,
    /// Does not fit in 64 bits of cents.
    #[error("amount is too large")]
    Overflow,
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyParseError::Empty);
        }
        if s.starts_with('-') {
            return Err(MoneyParseError::Negative);
        }
        let s = s.strip_prefix('+').unwrap_or(s);

        let (units, fraction) = match s.split_once('.') {
            Some((units, fraction)) => (units, fraction),
            None => (s, ""),
        };
        if units.is_empty() && fraction.is_empty() {
            return Err(MoneyParseError::Malformed);
        }
        if fraction.len() > 2 {
            return Err(MoneyParseError::TooPrecise);
        }
        if !units.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(MoneyParseError::Malformed);
        }

        let units: u64 = if units.is_empty() {
            0
        } else {
            units.parse().map_err(|_| MoneyParseError::Overflow)?
        };
        let fraction: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| MoneyParseError::Malformed)? * 10,
            _ => fraction.parse().map_err(|_| MoneyParseError::Malformed)?,
        };

        units
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction))
            .map(Self)
            .ok_or(MoneyParseError::Overflow)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative decimal amount with at most two decimals")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                v.checked_mul(100)
                    .map(Money::from_cents)
                    .ok_or_else(|| E::custom(MoneyParseError::Overflow))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(MoneyParseError::Negative))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// Role tag supplied by the authentication layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular buyer.
    #[default]
    User,
    /// Back-office operator.
    Admin,
}

impl Role {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Parses the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller, as handed over by the authentication layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable numeric identity.
    pub id: AccountId,
    /// Role tag.
    pub role: Role,
}

impl Principal {
    /// Creates a principal.
    #[must_use]
    pub const fn new(id: AccountId, role: Role) -> Self {
        Self { id, role }
    }

    /// Returns true for administrators.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// A wallet-carrying account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Name shown on tickets and receipts.
    pub display_name: String,
    /// Contact email, unique.
    pub email: String,
    /// Role tag.
    pub role: Role,
    /// Inactive accounts cannot buy.
    pub active: bool,
    /// Cached balance; always equals the net of the account's ledger.
    pub balance: Money,
    /// Code other users quote to credit this account a referral bonus.
    pub referral_code: Option<String>,
    /// How many accounts were opened with this account's referral code.
    pub referral_count: u32,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
}

/// Data for a new account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    /// Name shown on tickets and receipts.
    pub display_name: String,
    /// Contact email.
    pub email: String,
    /// Freshly minted referral code.
    pub referral_code: String,
    /// Opening time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Catalogue (read-mostly, owned by event management)
// ============================================================================

/// Event display fields, passed through untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event identifier.
    pub id: EventId,
    /// Title.
    pub title: String,
    /// Date of the event.
    pub starts_on: Option<NaiveDate>,
    /// Venue.
    pub venue: Option<String>,
    /// Poster image.
    pub image_url: Option<String>,
}

/// A ticket type on sale for an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketOffering {
    /// Ticket identifier.
    pub id: TicketId,
    /// Event the ticket admits to.
    pub event_id: EventId,
    /// Ticket type, e.g. "VIP".
    pub label: String,
    /// Current price of one unit.
    pub unit_price: Money,
    /// Units left; only the inventory guard changes it.
    pub remaining_stock: u32,
}

// ============================================================================
// Purchases
// ============================================================================

/// Opaque single-use redemption token (the QR code payload).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedemptionToken(String);

impl RedemptionToken {
    /// Wraps a token string, e.g. one read from a scanned code.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Debug for RedemptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedemptionToken({}…)", self.fingerprint())
    }
}

impl fmt::Display for RedemptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a purchase's token stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RedemptionState {
    /// Minted and not yet scanned.
    Issued,
    /// Scanned at the door. Terminal.
    Redeemed {
        /// When the token was redeemed.
        at: DateTime<Utc>,
    },
}

/// A completed ticket purchase.
///
/// Monetary fields are frozen at creation; only the redemption fields change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Purchase identifier.
    pub id: PurchaseId,
    /// Who paid.
    pub buyer_id: AccountId,
    /// What was bought.
    pub ticket_id: TicketId,
    /// Number of units, at least 1.
    pub quantity: u32,
    /// Unit price when the purchase was made.
    pub unit_price: Money,
    /// `unit_price * quantity`.
    pub total_paid: Money,
    /// Purchase time; starts the cancellation window.
    pub purchased_at: DateTime<Utc>,
    /// Single-use token.
    pub redemption_token: RedemptionToken,
    /// Whether the token has been used.
    pub redeemed: bool,
    /// When the token was used.
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Purchase {
    /// Current redemption state.
    #[must_use]
    pub fn state(&self) -> RedemptionState {
        match (self.redeemed, self.redeemed_at) {
            (true, Some(at)) => RedemptionState::Redeemed { at },
            // redeemed without a timestamp cannot be written by this crate
            (true, None) => RedemptionState::Redeemed {
                at: self.purchased_at,
            },
            (false, _) => RedemptionState::Issued,
        }
    }
}

/// Row data for a purchase about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPurchase {
    /// Who pays.
    pub buyer_id: AccountId,
    /// What is bought.
    pub ticket_id: TicketId,
    /// Number of units.
    pub quantity: u32,
    /// Frozen unit price.
    pub unit_price: Money,
    /// Frozen total.
    pub total_paid: Money,
    /// Purchase time.
    pub purchased_at: DateTime<Utc>,
    /// Candidate token; storage rejects duplicates.
    pub redemption_token: RedemptionToken,
}

/// Buyer fields shown on a scanned ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerSummary {
    /// Account identifier.
    pub id: AccountId,
    /// Display name.
    pub display_name: String,
    /// Email.
    pub email: String,
}

/// Ticket fields shown on a scanned ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    /// Ticket identifier.
    pub id: TicketId,
    /// Ticket type.
    pub label: String,
    /// Today's price, which may differ from what was paid.
    pub current_unit_price: Money,
}

/// A purchase with denormalized buyer, ticket and event display data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseView {
    /// The purchase itself.
    pub purchase: Purchase,
    /// Who bought it.
    pub buyer: BuyerSummary,
    /// What was bought.
    pub ticket: TicketSummary,
    /// Which event it admits to.
    pub event: EventSummary,
}

/// Result of a successful purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// The new purchase, token included.
    pub purchase: Purchase,
    /// The `purchase_debit` ledger entry; `None` for a free ticket.
    pub debit_entry_id: Option<LedgerEntryId>,
    /// Buyer balance after the debit.
    pub balance_after: Money,
    /// Ticket stock after the reservation.
    pub stock_after: u32,
}

/// Result of a successful cancellation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSummary {
    /// The deleted purchase.
    pub purchase_id: PurchaseId,
    /// Ticket whose stock was restored.
    pub ticket_id: TicketId,
    /// Units put back on sale.
    pub quantity_restored: u32,
    /// Amount credited back.
    pub refunded: Money,
    /// Buyer balance after the refund.
    pub new_balance: Money,
    /// The `refund_credit` ledger entry; `None` when nothing was paid.
    pub refund_entry_id: Option<LedgerEntryId>,
    /// When the cancellation happened.
    pub cancelled_at: DateTime<Utc>,
}

// ============================================================================
// Ledger
// ============================================================================

/// Kind of balance-affecting event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Money paid in by the owner.
    Deposit,
    /// Ticket purchase.
    PurchaseDebit,
    /// Cancelled purchase paid back.
    RefundCredit,
    /// Bonus for referring a new account.
    ReferralBonus,
}

impl LedgerKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Deposit,
        Self::PurchaseDebit,
        Self::RefundCredit,
        Self::ReferralBonus,
    ];

    /// True when the entry increases the balance.
    #[must_use]
    pub const fn is_credit(self) -> bool {
        !matches!(self, Self::PurchaseDebit)
    }

    /// Prefix of the human-readable references of entries of this kind.
    #[must_use]
    pub const fn reference_prefix(self) -> &'static str {
        match self {
            Self::Deposit => "DEP",
            Self::PurchaseDebit => "PUR",
            Self::RefundCredit => "RFD",
            Self::ReferralBonus => "BON",
        }
    }

    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::PurchaseDebit => "purchase_debit",
            Self::RefundCredit => "refund_credit",
            Self::ReferralBonus => "referral_bonus",
        }
    }

    /// Parses the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a deposit was paid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Mobile money transfer.
    MobileMoney,
    /// Bank card.
    Card,
    /// Bank transfer.
    BankTransfer,
    /// Cash at the counter.
    Cash,
}

impl PaymentMethod {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MobileMoney => "mobile_money",
            Self::Card => "card",
            Self::BankTransfer => "bank_transfer",
            Self::Cash => "cash",
        }
    }

    /// Parses the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mobile_money" => Some(Self::MobileMoney),
            "card" => Some(Self::Card),
            "bank_transfer" => Some(Self::BankTransfer),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

/// Immutable record of one balance change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry identifier.
    pub id: LedgerEntryId,
    /// Unique human-readable reference, e.g. `DEP-3F9A0C12B7`.
    pub reference: String,
    /// Whose balance changed.
    pub owner_id: AccountId,
    /// Direction and cause.
    pub kind: LedgerKind,
    /// Unsigned magnitude, strictly positive.
    pub amount: Money,
    /// Purchase that caused the entry, if any.
    pub purchase_ref: Option<PurchaseId>,
    /// Deposit payment method.
    pub payment_method: Option<PaymentMethod>,
    /// Free-form note.
    pub memo: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// The entry's effect on the balance, in signed cents.
    #[must_use]
    pub const fn signed_cents(&self) -> i128 {
        let cents = self.amount.cents() as i128;
        if self.kind.is_credit() { cents } else { -cents }
    }
}

/// Row data for a ledger entry about to be appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLedgerEntry {
    /// Whose balance changes.
    pub owner_id: AccountId,
    /// Direction and cause.
    pub kind: LedgerKind,
    /// Unsigned magnitude.
    pub amount: Money,
    /// Purchase reference.
    pub purchase_ref: Option<PurchaseId>,
    /// Deposit payment method.
    pub payment_method: Option<PaymentMethod>,
    /// Free-form note.
    pub memo: Option<String>,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
    /// Reference candidate, minted by the ledger on every append attempt.
    pub reference: String,
}

impl NewLedgerEntry {
    /// Entry with no purchase reference, payment method or memo.
    #[must_use]
    pub const fn new(
        owner_id: AccountId,
        kind: LedgerKind,
        amount: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id,
            kind,
            amount,
            purchase_ref: None,
            payment_method: None,
            memo: None,
            created_at,
            reference: String::new(),
        }
    }

    /// Attaches a purchase reference.
    #[must_use]
    pub const fn for_purchase(mut self, purchase_id: PurchaseId) -> Self {
        self.purchase_ref = Some(purchase_id);
        self
    }

    /// Attaches a payment method.
    #[must_use]
    pub const fn paid_with(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    /// Attaches a memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// Units sold of one ticket offering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSales {
    /// Ticket identifier.
    pub ticket_id: TicketId,
    /// Ticket type.
    pub label: String,
    /// Units sold.
    pub units: u64,
}

/// Units sold across the offerings of one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSales {
    /// Event identifier.
    pub event_id: EventId,
    /// Event title.
    pub title: String,
    /// Units sold.
    pub units: u64,
}

/// Aggregate sales over every live purchase.
///
/// Cancelled purchases are deleted and so never count. Ties on units go to
/// the lowest identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesStatistics {
    /// Number of purchases.
    pub total_purchases: u64,
    /// Units across all purchases.
    pub units_sold: u64,
    /// Sum of `total_paid`.
    pub revenue: Money,
    /// Offering with the most units sold.
    pub best_selling_ticket: Option<TicketSales>,
    /// Event with the most units sold.
    pub most_popular_event: Option<EventSales>,
}

/// Ledger history of one owner with running totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Whose statement this is.
    pub owner_id: AccountId,
    /// Entries, most recent first.
    pub entries: Vec<LedgerEntry>,
    /// Sum of credit entries in `entries`.
    pub total_credits: Money,
    /// Sum of debit entries in `entries`.
    pub total_debits: Money,
}

impl Statement {
    /// Builds a statement, summing credits and debits.
    ///
    /// Sums saturate; a single owner cannot plausibly exceed `u64` cents.
    #[must_use]
    pub fn from_entries(owner_id: AccountId, entries: Vec<LedgerEntry>) -> Self {
        let (credits, debits) = entries.iter().fold((0_u64, 0_u64), |(c, d), entry| {
            if entry.kind.is_credit() {
                (c.saturating_add(entry.amount.cents()), d)
            } else {
                (c, d.saturating_add(entry.amount.cents()))
            }
        });
        Self {
            owner_id,
            entries,
            total_credits: Money::from_cents(credits),
            total_debits: Money::from_cents(debits),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn money_parses_decimal_strings() {
        assert_eq!("1000".parse::<Money>().unwrap(), Money::from_units(1000));
        assert_eq!("12.5".parse::<Money>().unwrap(), Money::from_cents(1250));
        assert_eq!("12.05".parse::<Money>().unwrap(), Money::from_cents(1205));
        assert_eq!(".75".parse::<Money>().unwrap(), Money::from_cents(75));
        assert_eq!(" 3.00 ".parse::<Money>().unwrap(), Money::from_cents(300));
    }

    #[test]
    fn money_rejects_bad_input() {
        assert_eq!("".parse::<Money>(), Err(MoneyParseError::Empty));
        assert_eq!("-1".parse::<Money>(), Err(MoneyParseError::Negative));
        assert_eq!("1.234".parse::<Money>(), Err(MoneyParseError::TooPrecise));
        assert_eq!("1,50".parse::<Money>(), Err(MoneyParseError::Malformed));
        assert_eq!(".".parse::<Money>(), Err(MoneyParseError::Malformed));
        assert_eq!(
            "999999999999999999999".parse::<Money>(),
            Err(MoneyParseError::Overflow)
        );
    }

    #[test]
    fn money_serializes_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(50_005)).unwrap();
        assert_eq!(json, "\"500.05\"");

        let back: Money = serde_json::from_str("\"500.05\"").unwrap();
        assert_eq!(back, Money::from_cents(50_005));

        let whole: Money = serde_json::from_str("500").unwrap();
        assert_eq!(whole, Money::from_units(500));

        assert!(serde_json::from_str::<Money>("-5").is_err());
    }

    #[test]
    fn checked_arithmetic() {
        let price = Money::from_units(500);
        assert_eq!(price.checked_mul(2), Some(Money::from_units(1000)));
        assert_eq!(Money::from_units(100).checked_sub(price), None);
        assert_eq!(Money::from_cents(u64::MAX).checked_add(price), None);
    }

    #[test]
    fn ledger_kind_direction() {
        assert!(LedgerKind::Deposit.is_credit());
        assert!(LedgerKind::RefundCredit.is_credit());
        assert!(LedgerKind::ReferralBonus.is_credit());
        assert!(!LedgerKind::PurchaseDebit.is_credit());
        for kind in LedgerKind::ALL {
            assert_eq!(LedgerKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn token_debug_hides_the_secret() {
        let token = RedemptionToken::new("0123456789abcdef0123456789abcdef");
        assert_eq!(format!("{token:?}"), "RedemptionToken(01234567…)");
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(cents in 0_u64..=u64::MAX / 1000) {
            let money = Money::from_cents(cents);
            prop_assert_eq!(money.to_string().parse::<Money>(), Ok(money));
        }

        #[test]
        fn statement_totals_match_entries(amounts in proptest::collection::vec((1_u64..1_000_000, 0_usize..4), 0..40)) {
            let now = Utc::now();
            let entries: Vec<LedgerEntry> = amounts
                .iter()
                .enumerate()
                .map(|(i, (cents, kind))| LedgerEntry {
                    id: LedgerEntryId::new(i64::try_from(i).unwrap_or_default()),
                    reference: format!("DEP-{i:010X}"),
                    owner_id: AccountId::new(1),
                    kind: LedgerKind::ALL[*kind],
                    amount: Money::from_cents(*cents),
                    purchase_ref: None,
                    payment_method: None,
                    memo: None,
                    created_at: now,
                })
                .collect();
            let net: i128 = entries.iter().map(LedgerEntry::signed_cents).sum();
            let statement = Statement::from_entries(AccountId::new(1), entries);
            prop_assert_eq!(
                i128::from(statement.total_credits.cents()) - i128::from(statement.total_debits.cents()),
                net
            );
        }
    }
}
