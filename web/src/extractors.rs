//! Caller and body extraction.
//!
//! Authentication itself happens upstream. The gateway verifies the session
//! and forwards the caller as two headers, `X-Principal-Id` and
//! `X-Principal-Role`; this service trusts them.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use boxoffice_core::types::{AccountId, Principal, Role};

use crate::error::AppError;

/// Header carrying the caller's account id.
pub const PRINCIPAL_ID_HEADER: &str = "X-Principal-Id";

/// Header carrying the caller's role (`user` or `admin`, default `user`).
pub const PRINCIPAL_ROLE_HEADER: &str = "X-Principal-Role";

/// Authenticated caller.
///
/// Rejects with 401 when the id header is missing or malformed, or when the
/// role is unknown.
///
/// # Example
///
/// ```ignore
/// async fn handler(Caller(principal): Caller) -> String {
///     format!("Hello, account {}", principal.id)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).map(Self)
    }
}

/// JSON body whose rejections render as [`AppError`] envelopes.
///
/// Use instead of [`axum::Json`] for request bodies.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, AppError> {
    let id = headers
        .get(PRINCIPAL_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing principal"))?
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| AppError::unauthorized("Malformed principal id"))?;

    let role = match headers.get(PRINCIPAL_ROLE_HEADER) {
        None => Role::User,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| Role::parse(&v.trim().to_ascii_lowercase()))
            .ok_or_else(|| AppError::unauthorized("Unknown principal role"))?,
    };

    Ok(Principal::new(AccountId::new(id), role))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_principal_defaults_to_user() {
        let principal = principal_from_headers(&headers(&[(PRINCIPAL_ID_HEADER, "42")])).unwrap();
        assert_eq!(principal, Principal::new(AccountId::new(42), Role::User));
    }

    #[test]
    fn test_admin_role() {
        let principal = principal_from_headers(&headers(&[
            (PRINCIPAL_ID_HEADER, "1"),
            (PRINCIPAL_ROLE_HEADER, "Admin"),
        ]))
        .unwrap();
        assert!(principal.is_admin());
    }

    #[test]
    fn test_missing_or_bad_principal_is_unauthorized() {
        for map in [
            headers(&[]),
            headers(&[(PRINCIPAL_ID_HEADER, "abc")]),
            headers(&[(PRINCIPAL_ID_HEADER, "1"), (PRINCIPAL_ROLE_HEADER, "root")]),
        ] {
            let err = principal_from_headers(&map).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
