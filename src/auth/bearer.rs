//! Strict `Authorization: Bearer` parsing.
//!
//! The scheme is case-sensitive, exactly one header is accepted, and the
//! token must be printable ASCII with no embedded whitespace. Anything
//! else (`bearer`, `Basic`, repeated `Bearer` prefixes, NUL bytes) is an
//! authentication failure before any credential lookup happens.

use axum::http::{header, HeaderMap};

use crate::error::{DbError, DbResult};

const SCHEME: &str = "Bearer ";

/// Extract the bearer token or fail with `Unauthorized`.
pub fn extract_bearer(headers: &HeaderMap) -> DbResult<String> {
    let mut values = headers.get_all(header::AUTHORIZATION).iter();
    let value = values
        .next()
        .ok_or_else(|| DbError::unauthorized("missing authorization header"))?;
    if values.next().is_some() {
        return Err(DbError::unauthorized("multiple authorization headers"));
    }

    // Non-ASCII header bytes fail to_str(); NULs never get this far because
    // HeaderValue forbids them, but the token check below would catch them.
    let raw = value
        .to_str()
        .map_err(|_| DbError::unauthorized("malformed authorization header"))?;

    let token = raw
        .strip_prefix(SCHEME)
        .ok_or_else(|| DbError::unauthorized("unsupported authorization scheme"))?;

    if token.is_empty()
        || token
            .bytes()
            .any(|b| !(0x21..=0x7e).contains(&b))
    {
        return Err(DbError::unauthorized("malformed bearer token"));
    }

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn test_valid_bearer() {
        let headers = headers_with("Bearer dk_abc123_XYZ");
        assert_eq!(extract_bearer(&headers).unwrap(), "dk_abc123_XYZ");
    }

    #[test]
    fn test_missing_header() {
        assert!(extract_bearer(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_wrong_schemes_rejected() {
        for value in [
            "bearer xxxxxxxx",
            "BEARER xxxxxxxx",
            "Basic dXNlcjpwYXNz",
            "Token abc123",
            "Bearer",
            "invalid",
        ] {
            let headers = headers_with(value);
            assert!(extract_bearer(&headers).is_err(), "{value:?} must be rejected");
        }
    }

    #[test]
    fn test_repeated_bearer_prefix_rejected() {
        // "Bearer Bearer Bearer abc" leaves whitespace inside the token.
        let headers = headers_with("Bearer Bearer Bearer abc");
        assert!(extract_bearer(&headers).is_err());
    }

    #[test]
    fn test_multiple_headers_rejected() {
        let mut headers = HeaderMap::new();
        headers.append(header::AUTHORIZATION, HeaderValue::from_static("Bearer one"));
        headers.append(header::AUTHORIZATION, HeaderValue::from_static("Bearer two"));
        assert!(extract_bearer(&headers).is_err());
    }

    #[test]
    fn test_empty_and_whitespace_tokens_rejected() {
        for value in ["Bearer ", "Bearer  two words", "Bearer \ttab"] {
            if let Ok(v) = HeaderValue::from_str(value) {
                let mut headers = HeaderMap::new();
                headers.insert(header::AUTHORIZATION, v);
                assert!(extract_bearer(&headers).is_err(), "{value:?} must be rejected");
            }
        }
    }
}
