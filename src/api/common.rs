//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints.

use axum::http::{header, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::api::middleware::{ApiError, SESSION_COOKIE};
use crate::models::ListParams;

// ============================================================================
// Pagination
// ============================================================================

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for public APIs
pub fn default_page_size() -> u32 {
    12
}

/// Default page size for admin APIs
pub fn default_per_page() -> u32 {
    20
}

/// Public pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.page_size)
    }
}

/// Admin pagination query parameters
#[derive(Debug, Deserialize)]
pub struct AdminPaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl AdminPaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Empty strings in query filters mean "no filter"
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional enum filter from the query string
pub fn parse_filter<T>(value: Option<&str>, what: &str) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::validation_error(format!("Invalid {}: {}", what, raw))),
    }
}

// ============================================================================
// Session cookie
// ============================================================================

/// `Set-Cookie` header carrying a fresh session token
pub fn session_cookie(token: &str, days: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        days * 24 * 60 * 60
    );
    let value = HeaderValue::from_str(&cookie).map_err(ApiError::internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

/// `Set-Cookie` header that drops the session cookie
pub fn clear_session_cookie() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    #[test]
    fn test_session_cookie_max_age() {
        let headers = session_cookie("abc", 7).unwrap();
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=604800"));
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter::<UserRole>(None, "role").unwrap(), None);
        assert_eq!(parse_filter::<UserRole>(Some(" "), "role").unwrap(), None);
        assert_eq!(
            parse_filter::<UserRole>(Some("admin"), "role").unwrap(),
            Some(UserRole::Admin)
        );
        assert!(parse_filter::<UserRole>(Some("root"), "role").is_err());
    }

    #[test]
    fn test_pagination_clamps() {
        let query = AdminPaginationQuery { page: 0, per_page: 1000 };
        let params = query.params();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
    }
}
