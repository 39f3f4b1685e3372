//! Tenant identity and request-level extraction.

use std::fmt;
use std::str::FromStr;

use crate::error::{TenancyError, TenancyResult};

/// An opaque tenant identifier.
///
/// Tenant ids are externally supplied (subdomain or header) and matched
/// exactly against the registry; no normalization is applied beyond
/// rejecting the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id, rejecting empty input.
    pub fn new(id: impl Into<String>) -> TenancyResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TenancyError::config("tenant id must not be empty"));
        }
        Ok(Self(id))
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tenant's private schema name (`tenant_<id>`).
    pub fn schema(&self) -> String {
        format!("tenant_{}", self.0)
    }

    /// The schema name quoted as a SQL identifier.
    ///
    /// Tenant ids are externally supplied, so the schema name is always
    /// interpolated into `SET search_path` as a quoted identifier.
    pub(crate) fn quoted_schema(&self) -> String {
        format!("\"{}\"", self.schema().replace('"', "\"\""))
    }

    /// Resolve a tenant id from a request `Host` value.
    ///
    /// The first subdomain label is the tenant (`acme.example.com` ->
    /// `acme`), including the single-label dev case `acme.localhost`. Bare
    /// domains resolve to nothing.
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.split(':').next().unwrap_or(host);
        let labels: Vec<&str> = host.split('.').collect();
        let sub = match labels.as_slice() {
            [sub, _, _, ..] => *sub,
            [sub, "localhost"] => *sub,
            _ => return None,
        };
        Self::new(sub).ok()
    }

    /// Resolve a tenant id from an `x-tenant-id` header value.
    pub fn from_header(value: &str) -> Option<Self> {
        Self::new(value.trim()).ok()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = TenancyError;

    fn from_str(s: &str) -> TenancyResult<Self> {
        Self::new(s)
    }
}
