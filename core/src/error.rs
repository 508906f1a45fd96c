//! Error taxonomy for the purchase, redemption and wallet operations.

use crate::store::StoreError;
use crate::types::{AccountId, Money, PurchaseId, TicketId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, BoxOfficeError>;

/// How a caller should treat a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input. Do not retry unchanged.
    Validation,
    /// The request is well-formed but the current state forbids it.
    Conflict,
    /// The referenced record does not exist.
    NotFound,
    /// The caller may not act on the referenced record.
    Forbidden,
    /// Storage or integrity failure. Nothing was committed; safe to retry.
    Fatal,
}

/// Every failure the engine can report.
///
/// Conflict variants carry the state a caller needs to explain the refusal
/// without a follow-up query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoxOfficeError {
    // ═══════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════
    /// Quantity below 1, or too large to count.
    #[error("Quantity must be at least 1, got {quantity}")]
    InvalidQuantity {
        /// Requested quantity
        quantity: i64,
    },

    /// Zero, negative, out-of-range or overflowing amount.
    #[error("Invalid {field}: {reason}")]
    InvalidAmount {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Malformed request field other than an amount.
    #[error("Invalid {field}: {reason}")]
    InvalidInput {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Referral code quoted at account opening does not exist.
    #[error("Referral code {code} does not exist")]
    UnknownReferralCode {
        /// The code as given
        code: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Business-rule conflicts
    // ═══════════════════════════════════════════════════════════
    /// Not enough units left.
    #[error("Insufficient stock for ticket {ticket_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Ticket
        ticket_id: TicketId,
        /// Units asked for
        requested: u32,
        /// Units left
        available: u32,
    },

    /// A debit would drive the balance below zero.
    #[error("Insufficient balance for account {owner_id}: required {required}, available {available}")]
    InsufficientBalance {
        /// Account
        owner_id: AccountId,
        /// Debit amount
        required: Money,
        /// Current balance
        available: Money,
    },

    /// The token was already used.
    #[error("Purchase {purchase_id} was already redeemed at {redeemed_at}")]
    AlreadyRedeemed {
        /// Purchase
        purchase_id: PurchaseId,
        /// Original redemption time
        redeemed_at: DateTime<Utc>,
    },

    /// Too late to cancel.
    #[error("Purchase {purchase_id} can no longer be cancelled (deadline was {deadline})")]
    CancellationWindowExpired {
        /// Purchase
        purchase_id: PurchaseId,
        /// Purchase time
        purchased_at: DateTime<Utc>,
        /// Last instant a cancellation was accepted
        deadline: DateTime<Utc>,
    },

    /// Buyer account is deactivated.
    #[error("Account {buyer_id} is inactive")]
    BuyerInactive {
        /// Buyer
        buyer_id: AccountId,
    },

    /// Another account already uses this email.
    #[error("Email {email} is already registered")]
    EmailTaken {
        /// The email as given
        email: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Not found
    // ═══════════════════════════════════════════════════════════
    /// No such ticket offering.
    #[error("Ticket {ticket_id} not found")]
    TicketNotFound {
        /// Ticket
        ticket_id: TicketId,
    },

    /// No such purchase.
    #[error("Purchase {purchase_id} not found")]
    PurchaseNotFound {
        /// Purchase
        purchase_id: PurchaseId,
    },

    /// No purchase carries this token.
    #[error("Redemption token not found")]
    TokenNotFound,

    /// No such account.
    #[error("Account {account_id} not found")]
    AccountNotFound {
        /// Account
        account_id: AccountId,
    },

    // ═══════════════════════════════════════════════════════════
    // Authorization
    // ═══════════════════════════════════════════════════════════
    /// Only the buyer or an administrator may see or cancel a purchase.
    #[error("Account {requester_id} does not own purchase {purchase_id}")]
    NotPurchaseOwner {
        /// Purchase
        purchase_id: PurchaseId,
        /// Who asked
        requester_id: AccountId,
    },

    /// Sales-wide reads are for administrators.
    #[error("Account {requester_id} is not an administrator")]
    AdminRequired {
        /// Who asked
        requester_id: AccountId,
    },

    // ═══════════════════════════════════════════════════════════
    // Integrity / fatal
    // ═══════════════════════════════════════════════════════════
    /// Every freshly generated token collided.
    #[error("Could not mint a unique redemption token after {attempts} attempts")]
    TokenSpaceExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Every freshly generated referral code collided.
    #[error("Could not mint a unique referral code after {attempts} attempts")]
    ReferralCodeSpaceExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Every freshly generated ledger reference collided.
    #[error("Could not mint a unique ledger reference after {attempts} attempts")]
    LedgerReferenceSpaceExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Storage failure, including failed commits.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl BoxOfficeError {
    /// Category of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// # use boxoffice_core::error::{BoxOfficeError, ErrorKind};
    /// assert_eq!(BoxOfficeError::TokenNotFound.kind(), ErrorKind::NotFound);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuantity { .. }
            | Self::InvalidAmount { .. }
            | Self::InvalidInput { .. }
            | Self::UnknownReferralCode { .. } => ErrorKind::Validation,
            Self::InsufficientStock { .. }
            | Self::InsufficientBalance { .. }
            | Self::AlreadyRedeemed { .. }
            | Self::CancellationWindowExpired { .. }
            | Self::BuyerInactive { .. }
            | Self::EmailTaken { .. } => ErrorKind::Conflict,
            Self::TicketNotFound { .. }
            | Self::PurchaseNotFound { .. }
            | Self::TokenNotFound
            | Self::AccountNotFound { .. } => ErrorKind::NotFound,
            Self::NotPurchaseOwner { .. } | Self::AdminRequired { .. } => ErrorKind::Forbidden,
            Self::TokenSpaceExhausted { .. }
            | Self::ReferralCodeSpaceExhausted { .. }
            | Self::LedgerReferenceSpaceExhausted { .. }
            | Self::Storage(_) => ErrorKind::Fatal,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity { .. } => "INVALID_QUANTITY",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::UnknownReferralCode { .. } => "UNKNOWN_REFERRAL_CODE",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::AlreadyRedeemed { .. } => "ALREADY_REDEEMED",
            Self::CancellationWindowExpired { .. } => "CANCELLATION_WINDOW_EXPIRED",
            Self::BuyerInactive { .. } => "BUYER_INACTIVE",
            Self::EmailTaken { .. } => "EMAIL_TAKEN",
            Self::TicketNotFound { .. } => "TICKET_NOT_FOUND",
            Self::PurchaseNotFound { .. } => "PURCHASE_NOT_FOUND",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            Self::NotPurchaseOwner { .. } => "NOT_PURCHASE_OWNER",
            Self::AdminRequired { .. } => "ADMIN_REQUIRED",
            Self::TokenSpaceExhausted { .. } => "TOKEN_SPACE_EXHAUSTED",
            Self::ReferralCodeSpaceExhausted { .. } => "REFERRAL_CODE_SPACE_EXHAUSTED",
            Self::LedgerReferenceSpaceExhausted { .. } => "LEDGER_REFERENCE_SPACE_EXHAUSTED",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns `true` when retrying the same request may succeed.
    ///
    /// Only fatal errors qualify: nothing partial was committed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(
            BoxOfficeError::InvalidQuantity { quantity: 0 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BoxOfficeError::InsufficientStock {
                ticket_id: TicketId::new(1),
                requested: 2,
                available: 1,
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            BoxOfficeError::PurchaseNotFound {
                purchase_id: PurchaseId::new(9)
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BoxOfficeError::NotPurchaseOwner {
                purchase_id: PurchaseId::new(9),
                requester_id: AccountId::new(2),
            }
            .kind(),
            ErrorKind::Forbidden
        );
        let fatal = BoxOfficeError::Storage(StoreError::Database("connection reset".into()));
        assert_eq!(fatal.kind(), ErrorKind::Fatal);
        assert!(fatal.is_retryable());
    }

    #[test]
    fn conflict_messages_carry_state() {
        let err = BoxOfficeError::InsufficientBalance {
            owner_id: AccountId::new(3),
            required: Money::from_units(500),
            available: Money::from_units(100),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance for account 3: required 500.00, available 100.00"
        );
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        assert!(!err.is_retryable());
    }
}
