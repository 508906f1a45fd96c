//! Random identifiers handed to users: redemption tokens, referral codes and
//! ledger references.
//!
//! All come from the operating system CSPRNG. Uniqueness is not checked
//! here; storage enforces it and callers retry on collision.

use crate::types::{LedgerKind, RedemptionToken};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::fmt::Write as _;

/// Length of a referral code.
pub const REFERRAL_CODE_LEN: usize = 6;

const REFERRAL_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Mints a redemption token: 128 random bits as 32 lowercase hex characters.
#[must_use]
pub fn mint_redemption_token() -> RedemptionToken {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(32);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    RedemptionToken::new(hex)
}

/// Mints a referral code of [`REFERRAL_CODE_LEN`] characters from `A-Z0-9`.
#[must_use]
pub fn mint_referral_code() -> String {
    (0..REFERRAL_CODE_LEN)
        .map(|_| char::from(REFERRAL_ALPHABET[OsRng.gen_range(0..REFERRAL_ALPHABET.len())]))
        .collect()
}

/// Mints a ledger reference: the kind's prefix, a dash, then 40 random bits
/// as 10 uppercase hex characters, e.g. `DEP-3F9A0C12B7`.
#[must_use]
pub fn mint_ledger_reference(kind: LedgerKind) -> String {
    let mut bytes = [0_u8; 5];
    OsRng.fill_bytes(&mut bytes);
    let mut reference = String::with_capacity(14);
    reference.push_str(kind.reference_prefix());
    reference.push('-');
    for byte in bytes {
        let _ = write!(reference, "{byte:02X}");
    }
    reference
}

/// Normalizes a referral code typed by a user.
#[must_use]
pub fn normalize_referral_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_32_hex_chars() {
        let token = mint_redemption_token();
        assert_eq!(token.as_str().len(), 32);
        assert!(
            token
                .as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }

    #[test]
    fn tokens_do_not_repeat() {
        let tokens: HashSet<_> = (0..1000).map(|_| mint_redemption_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn referral_codes_use_the_alphabet() {
        for _ in 0..100 {
            let code = mint_referral_code();
            assert_eq!(code.len(), REFERRAL_CODE_LEN);
            assert!(code.bytes().all(|b| REFERRAL_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn ledger_references_carry_the_kind_prefix() {
        let reference = mint_ledger_reference(LedgerKind::Deposit);
        assert_eq!(reference.len(), 14);
        assert!(reference.starts_with("DEP-"));
        assert!(
            reference[4..]
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())
        );
        assert!(mint_ledger_reference(LedgerKind::PurchaseDebit).starts_with("PUR-"));
    }

    #[test]
    fn normalizes_user_input() {
        assert_eq!(normalize_referral_code("  ab12cd "), "AB12CD");
    }
}
