//! Organization aggregate: the named tenant addressed by URL slug.
//!
//! The stream id is derived from the tenant id, so each tenant can register
//! exactly one organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money::Currency;
use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

typed_id!(
    /// Organization identifier (one per tenant).
    OrganizationId
);

impl OrganizationId {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::from_uuid(*tenant_id.as_uuid()))
    }
}

/// URL slugs: 3–63 chars of `[a-z0-9-]`, no leading or trailing hyphen.
pub fn validate_slug(slug: &str) -> Result<String, DomainError> {
    let slug = slug.trim();
    let len = slug.len();
    if !(3..=63).contains(&len) {
        return Err(DomainError::validation("slug must be 3 to 63 characters"));
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(DomainError::validation(
            "slug may only contain lowercase letters, digits and hyphens",
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(DomainError::validation("slug cannot start or end with a hyphen"));
    }
    Ok(slug.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    id: OrganizationId,
    tenant_id: Option<TenantId>,
    slug: String,
    name: String,
    base_currency: Option<Currency>,
    version: u64,
    created: bool,
}

impl Organization {
    pub fn empty(id: OrganizationId) -> Self {
        Self {
            id,
            tenant_id: None,
            slug: String::new(),
            name: String::new(),
            base_currency: None,
            version: 0,
            created: false,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_currency(&self) -> Option<&Currency> {
        self.base_currency.as_ref()
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOrganization {
    pub tenant_id: TenantId,
    pub slug: String,
    pub name: String,
    pub base_currency: String,
    pub registered_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOrganization {
    pub tenant_id: TenantId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizationCommand {
    Register(RegisterOrganization),
    Rename(RenameOrganization),
}

ironbooks_events::tenant_command!(OrganizationCommand { Register, Rename });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRegistered {
    pub tenant_id: TenantId,
    pub organization_id: OrganizationId,
    pub slug: String,
    pub name: String,
    pub base_currency: Currency,
    pub registered_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRenamed {
    pub tenant_id: TenantId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizationEvent {
    Registered(OrganizationRegistered),
    Renamed(OrganizationRenamed),
}

impl Event for OrganizationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrganizationEvent::Registered(_) => "auth.organization.registered",
            OrganizationEvent::Renamed(_) => "auth.organization.renamed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrganizationEvent::Registered(e) => e.occurred_at,
            OrganizationEvent::Renamed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Organization {
    type Command = OrganizationCommand;
    type Event = OrganizationEvent;

    const AGGREGATE_TYPE: &'static str = "auth.organization";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrganizationEvent::Registered(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.slug = e.slug.clone();
                self.name = e.name.clone();
                self.base_currency = Some(e.base_currency.clone());
                self.created = true;
            }
            OrganizationEvent::Renamed(e) => {
                self.name = e.name.clone();
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            OrganizationCommand::Register(cmd) => {
                if self.created {
                    return Err(DomainError::conflict(
                        "an organization is already registered for this tenant",
                    ));
                }
                if OrganizationId::for_tenant(cmd.tenant_id) != self.id {
                    return Err(DomainError::invariant("organization id does not match tenant"));
                }
                Ok(vec![OrganizationEvent::Registered(OrganizationRegistered {
                    tenant_id: cmd.tenant_id,
                    organization_id: self.id,
                    slug: validate_slug(&cmd.slug)?,
                    name: text::required_max("name", &cmd.name, 200)?,
                    base_currency: Currency::parse(&cmd.base_currency)?,
                    registered_by: cmd.registered_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrganizationCommand::Rename(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                let name = text::required_max("name", &cmd.name, 200)?;
                if name == self.name {
                    return Ok(vec![]);
                }
                Ok(vec![OrganizationEvent::Renamed(OrganizationRenamed {
                    tenant_id: cmd.tenant_id,
                    name,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
