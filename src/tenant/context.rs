use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a tenant as carried in the `X-Tenant-Id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i32);

impl TenantId {
    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i32>().map(TenantId)
    }
}

impl From<i32> for TenantId {
    fn from(value: i32) -> Self {
        TenantId(value)
    }
}

/// Tenant state for a single request.
///
/// One value is created per inbound request by the tenant resolver and then
/// handed to every persistence session opened while serving that request.
/// It is `Copy` and never stored behind shared mutable state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: Option<TenantId>,
}

impl TenantContext {
    /// A context that has not been resolved yet. Scoped reads match nothing
    /// and scoped inserts are refused.
    pub fn unset() -> Self {
        Self { tenant_id: None }
    }

    pub fn for_tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
        }
    }

    pub fn get(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn set(&mut self, tenant_id: impl Into<TenantId>) {
        self.tenant_id = Some(tenant_id.into());
    }

    pub fn is_set(&self) -> bool {
        self.tenant_id.is_some()
    }
}
