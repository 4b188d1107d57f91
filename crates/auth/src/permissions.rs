use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission name such as `"bills.approve"`. `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    pub fn is_read(&self) -> bool {
        self.as_str().ends_with(".read")
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every permission the API checks.
pub mod catalog {
    use super::Permission;

    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const ORGS_CREATE: Permission = Permission::from_static("orgs.create");
    pub const ORGS_WRITE: Permission = Permission::from_static("orgs.write");
    pub const AUDIT_READ: Permission = Permission::from_static("audit.read");

    pub const VENDORS_READ: Permission = Permission::from_static("vendors.read");
    pub const VENDORS_WRITE: Permission = Permission::from_static("vendors.write");
    pub const BILLS_READ: Permission = Permission::from_static("bills.read");
    pub const BILLS_WRITE: Permission = Permission::from_static("bills.write");
    pub const BILLS_APPROVE: Permission = Permission::from_static("bills.approve");
    pub const PAYMENTS_READ: Permission = Permission::from_static("payments.read");
    pub const PAYMENTS_WRITE: Permission = Permission::from_static("payments.write");

    pub const LEDGER_READ: Permission = Permission::from_static("ledger.read");
    pub const LEDGER_POST: Permission = Permission::from_static("ledger.post");

    pub const COSTING_READ: Permission = Permission::from_static("costing.read");
    pub const COSTING_WRITE: Permission = Permission::from_static("costing.write");
    pub const COSTING_POST: Permission = Permission::from_static("costing.post");

    pub const QUALITY_READ: Permission = Permission::from_static("quality.read");
    pub const QUALITY_WRITE: Permission = Permission::from_static("quality.write");

    pub const REPORTS_READ: Permission = Permission::from_static("reports.read");
    pub const REPORTS_WRITE: Permission = Permission::from_static("reports.write");

    pub const PLANNING_READ: Permission = Permission::from_static("planning.read");
    pub const PLANNING_WRITE: Permission = Permission::from_static("planning.write");

    /// All read permissions except the audit trail.
    pub const BUSINESS_READS: &[Permission] = &[
        VENDORS_READ,
        BILLS_READ,
        PAYMENTS_READ,
        LEDGER_READ,
        COSTING_READ,
        QUALITY_READ,
        REPORTS_READ,
        PLANNING_READ,
    ];
}
