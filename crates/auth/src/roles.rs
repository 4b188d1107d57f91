use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::permissions::{Permission, catalog};

/// Role name carried in tokens. Unknown roles grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Built-in role policy.
pub fn role_permissions(role: &str) -> Vec<Permission> {
    use catalog::*;

    match role {
        "admin" => vec![WILDCARD],
        "ap_clerk" => vec![
            VENDORS_READ,
            VENDORS_WRITE,
            BILLS_READ,
            BILLS_WRITE,
            PAYMENTS_READ,
            PAYMENTS_WRITE,
            LEDGER_READ,
        ],
        "ap_manager" => {
            let mut perms = role_permissions("ap_clerk");
            perms.push(BILLS_APPROVE);
            perms.push(REPORTS_READ);
            perms
        }
        "cost_accountant" => vec![
            COSTING_READ,
            COSTING_WRITE,
            COSTING_POST,
            LEDGER_READ,
            LEDGER_POST,
            VENDORS_READ,
            REPORTS_READ,
        ],
        "quality_manager" => vec![QUALITY_READ, QUALITY_WRITE, VENDORS_READ, REPORTS_READ],
        "analyst" => {
            let mut perms = BUSINESS_READS.to_vec();
            perms.push(REPORTS_WRITE);
            perms.push(PLANNING_WRITE);
            perms
        }
        "viewer" => BUSINESS_READS.to_vec(),
        _ => Vec::new(),
    }
}

/// Union of the permissions granted by `roles`, deduplicated and sorted.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let set: BTreeSet<String> = roles
        .iter()
        .flat_map(|r| role_permissions(r.as_str()))
        .map(|p| p.as_str().to_string())
        .collect();
    set.into_iter().map(Permission::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_wildcard() {
        assert_eq!(role_permissions("admin"), vec![catalog::WILDCARD]);
    }

    #[test]
    fn manager_extends_clerk_with_approval() {
        let clerk = role_permissions("ap_clerk");
        let manager = role_permissions("ap_manager");
        assert!(!clerk.contains(&catalog::BILLS_APPROVE));
        assert!(manager.contains(&catalog::BILLS_APPROVE));
        assert!(clerk.iter().all(|p| manager.contains(p)));
    }

    #[test]
    fn viewer_only_reads() {
        assert!(role_permissions("viewer").iter().all(Permission::is_read));
        assert!(role_permissions("mystery").is_empty());
    }

    #[test]
    fn union_dedupes() {
        let perms = permissions_for_roles(&[Role::new("viewer"), Role::new("analyst")]);
        let mut names: Vec<_> = perms.iter().map(|p| p.as_str()).collect();
        let len = names.len();
        names.dedup();
        assert_eq!(names.len(), len);
        assert!(perms.contains(&catalog::PLANNING_WRITE));
    }
}
