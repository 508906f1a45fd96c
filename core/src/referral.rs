//! Account opening and referral bonuses.

use crate::error::{BoxOfficeError, Result};
use crate::ledger;
use crate::store::{EMAIL_CONSTRAINT, REFERRAL_CODE_CONSTRAINT, UnitOfWork};
use crate::token::{mint_referral_code, normalize_referral_code};
use crate::types::{Account, LedgerKind, Money, NewAccount, NewLedgerEntry};
use chrono::{DateTime, Utc};

/// Data supplied when opening an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Name shown on tickets.
    pub display_name: String,
    /// Contact email, unique across accounts.
    pub email: String,
    /// Code of the account that referred this one.
    pub referral_code: Option<String>,
}

/// Bonus rules applied at account opening.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferralPolicy {
    /// Credited to the referrer.
    pub bonus: Money,
    /// Referral code mint attempts before giving up.
    pub code_attempts: u32,
}

/// Opens an account inside `tx`, crediting the referrer if there is one.
///
/// The referrer's row is locked before its counter and balance change, so
/// concurrent referrals of the same account are serialized.
///
/// # Errors
///
/// - [`BoxOfficeError::InvalidInput`] for a blank name or malformed email
/// - [`BoxOfficeError::UnknownReferralCode`]
/// - [`BoxOfficeError::EmailTaken`]
/// - [`BoxOfficeError::ReferralCodeSpaceExhausted`]
/// - [`BoxOfficeError::Storage`] on storage failure
pub async fn open_account<U: UnitOfWork>(
    tx: &mut U,
    registration: Registration,
    policy: ReferralPolicy,
    now: DateTime<Utc>,
) -> Result<Account> {
    let display_name = registration.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(BoxOfficeError::InvalidInput {
            field: "display_name",
            reason: "must not be blank".to_string(),
        });
    }
    let email = registration.email.trim().to_ascii_lowercase();
    if !is_plausible_email(&email) {
        return Err(BoxOfficeError::InvalidInput {
            field: "email",
            reason: "must look like name@domain".to_string(),
        });
    }

    let referrer = match registration.referral_code.as_deref().map(normalize_referral_code) {
        Some(code) if !code.is_empty() => {
            let found = tx.lock_account_by_referral_code(&code).await?;
            Some(found.ok_or(BoxOfficeError::UnknownReferralCode { code })?)
        }
        _ => None,
    };

    let mut attempt = 0;
    let account = loop {
        attempt += 1;
        let candidate = NewAccount {
            display_name: display_name.clone(),
            email: email.clone(),
            referral_code: mint_referral_code(),
            created_at: now,
        };
        match tx.insert_account(candidate).await {
            Ok(account) => break account,
            Err(err) if err.violates(EMAIL_CONSTRAINT) => {
                return Err(BoxOfficeError::EmailTaken { email });
            }
            Err(err) if err.violates(REFERRAL_CODE_CONSTRAINT) => {
                tracing::warn!(attempt, "Referral code collision");
                if attempt >= policy.code_attempts {
                    return Err(BoxOfficeError::ReferralCodeSpaceExhausted { attempts: attempt });
                }
            }
            Err(err) => return Err(err.into()),
        }
    };

    if let Some(referrer) = referrer {
        tx.increment_referral_count(referrer.id).await?;
        if !policy.bonus.is_zero() {
            ledger::record(
                tx,
                NewLedgerEntry::new(referrer.id, LedgerKind::ReferralBonus, policy.bonus, now)
                    .with_memo(format!("Referral of account {}", account.id)),
            )
            .await?;
        }
        tracing::info!(referrer_id = %referrer.id, account_id = %account.id, "Referral credited");
    }

    Ok(account)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_plausible_email;

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(!is_plausible_email("ada@example"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada example@x.com"));
        assert!(!is_plausible_email("ada"));
    }
}
