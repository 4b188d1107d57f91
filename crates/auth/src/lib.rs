//! `ironbooks-auth`: token verification, role policy and the organization (tenant) aggregate.
//!
//! Independent of HTTP; the API layer only feeds it bearer strings and reads back
//! claims and authorization decisions.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod organization;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use organization::{
    Organization, OrganizationCommand, OrganizationEvent, OrganizationId, RegisterOrganization,
    RenameOrganization, validate_slug,
};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::{Role, permissions_for_roles, role_permissions};
