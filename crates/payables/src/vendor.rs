use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money::Currency;
use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, text, typed_id};
use ironbooks_events::Event;

use crate::terms::PaymentTerms;

typed_id!(
    /// Vendor (supplier) identifier.
    VendorId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Contact {
    fn normalized(&self) -> Result<Self, DomainError> {
        let email = text::optional(self.email.as_deref());
        if let Some(email) = &email {
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                return Err(DomainError::validation(format!("invalid email '{email}'")));
            }
        }
        Ok(Self {
            email,
            phone: text::optional(self.phone.as_deref()),
            address: text::optional(self.address.as_deref()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    id: VendorId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    contact: Contact,
    default_terms: PaymentTerms,
    currency: Option<Currency>,
    status: VendorStatus,
    version: u64,
    created: bool,
}

impl Vendor {
    pub fn empty(id: VendorId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            contact: Contact::default(),
            default_terms: PaymentTerms::default(),
            currency: None,
            status: VendorStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn default_terms(&self) -> PaymentTerms {
        self.default_terms
    }

    pub fn status(&self) -> VendorStatus {
        self.status
    }

    pub fn currency(&self) -> Option<&Currency> {
        self.currency.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterVendor {
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub contact: Contact,
    pub default_terms: PaymentTerms,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVendor {
    pub tenant_id: TenantId,
    pub name: Option<String>,
    pub contact: Option<Contact>,
    pub default_terms: Option<PaymentTerms>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateVendor {
    pub tenant_id: TenantId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateVendor {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorCommand {
    Register(RegisterVendor),
    Update(UpdateVendor),
    Deactivate(DeactivateVendor),
    Reactivate(ReactivateVendor),
}

ironbooks_events::tenant_command!(VendorCommand { Register, Update, Deactivate, Reactivate });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRegistered {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub code: String,
    pub name: String,
    pub contact: Contact,
    pub default_terms: PaymentTerms,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorUpdated {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub name: String,
    pub contact: Contact,
    pub default_terms: PaymentTerms,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorDeactivated {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorReactivated {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorEvent {
    Registered(VendorRegistered),
    Updated(VendorUpdated),
    Deactivated(VendorDeactivated),
    Reactivated(VendorReactivated),
}

impl Event for VendorEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VendorEvent::Registered(_) => "payables.vendor.registered",
            VendorEvent::Updated(_) => "payables.vendor.updated",
            VendorEvent::Deactivated(_) => "payables.vendor.deactivated",
            VendorEvent::Reactivated(_) => "payables.vendor.reactivated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VendorEvent::Registered(e) => e.occurred_at,
            VendorEvent::Updated(e) => e.occurred_at,
            VendorEvent::Deactivated(e) => e.occurred_at,
            VendorEvent::Reactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Vendor {
    type Command = VendorCommand;
    type Event = VendorEvent;

    const AGGREGATE_TYPE: &'static str = "payables.vendor";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VendorEvent::Registered(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.default_terms = e.default_terms;
                self.currency = Some(e.currency.clone());
                self.status = VendorStatus::Active;
                self.created = true;
            }
            VendorEvent::Updated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.default_terms = e.default_terms;
            }
            VendorEvent::Deactivated(_) => self.status = VendorStatus::Inactive,
            VendorEvent::Reactivated(_) => self.status = VendorStatus::Active,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            VendorCommand::Register(cmd) => self.handle_register(cmd),
            VendorCommand::Update(cmd) => self.handle_update(cmd),
            VendorCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
            VendorCommand::Reactivate(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Vendor {
    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterVendor) -> Result<Vec<VendorEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("vendor already exists"));
        }

        let code = text::required_max("code", &cmd.code, 32)?;
        if code.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("vendor code cannot contain whitespace"));
        }

        Ok(vec![VendorEvent::Registered(VendorRegistered {
            tenant_id: cmd.tenant_id,
            vendor_id: self.id,
            code,
            name: text::required_max("name", &cmd.name, 200)?,
            contact: cmd.contact.normalized()?,
            default_terms: cmd.default_terms,
            currency: Currency::parse(&cmd.currency)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateVendor) -> Result<Vec<VendorEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;

        let name = match &cmd.name {
            Some(name) => text::required_max("name", name, 200)?,
            None => self.name.clone(),
        };
        let contact = match &cmd.contact {
            Some(contact) => contact.normalized()?,
            None => self.contact.clone(),
        };
        let default_terms = cmd.default_terms.unwrap_or(self.default_terms);

        if name == self.name && contact == self.contact && default_terms == self.default_terms {
            return Ok(vec![]);
        }

        Ok(vec![VendorEvent::Updated(VendorUpdated {
            tenant_id: cmd.tenant_id,
            vendor_id: self.id,
            name,
            contact,
            default_terms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateVendor) -> Result<Vec<VendorEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status == VendorStatus::Inactive {
            return Err(DomainError::invariant("vendor is already inactive"));
        }
        Ok(vec![VendorEvent::Deactivated(VendorDeactivated {
            tenant_id: cmd.tenant_id,
            vendor_id: self.id,
            reason: text::optional(cmd.reason.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateVendor) -> Result<Vec<VendorEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status == VendorStatus::Active {
            return Err(DomainError::invariant("vendor is already active"));
        }
        Ok(vec![VendorEvent::Reactivated(VendorReactivated {
            tenant_id: cmd.tenant_id,
            vendor_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn register_cmd(tenant_id: TenantId) -> VendorCommand {
        VendorCommand::Register(RegisterVendor {
            tenant_id,
            code: "ACME".to_string(),
            name: "  Acme Supplies  ".to_string(),
            contact: Contact {
                email: Some("ap@acme.test".to_string()),
                phone: Some(" ".to_string()),
                address: None,
            },
            default_terms: PaymentTerms::net(45).unwrap(),
            currency: "USD".to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn registered(tenant_id: TenantId) -> Vendor {
        let mut vendor = Vendor::empty(VendorId::generate());
        for e in vendor.handle(&register_cmd(tenant_id)).unwrap() {
            vendor.apply(&e);
        }
        vendor
    }

    #[test]
    fn register_normalizes_fields() {
        let vendor = registered(test_tenant_id());
        assert_eq!(vendor.name(), "Acme Supplies");
        assert_eq!(vendor.contact().phone, None);
        assert_eq!(vendor.default_terms().days(), 45);
        assert_eq!(vendor.status(), VendorStatus::Active);
    }

    #[test]
    fn invalid_email_is_rejected() {
        let vendor = Vendor::empty(VendorId::generate());
        let mut cmd = register_cmd(test_tenant_id());
        if let VendorCommand::Register(c) = &mut cmd {
            c.contact.email = Some("nobody".to_string());
        }
        assert!(matches!(vendor.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn deactivate_then_reactivate() {
        let tenant_id = test_tenant_id();
        let mut vendor = registered(tenant_id);

        let deactivate = VendorCommand::Deactivate(DeactivateVendor {
            tenant_id,
            reason: Some("duplicate record".to_string()),
            occurred_at: Utc::now(),
        });
        for e in vendor.handle(&deactivate).unwrap() {
            vendor.apply(&e);
        }
        assert_eq!(vendor.status(), VendorStatus::Inactive);
        assert!(vendor.handle(&deactivate).is_err());

        let reactivate = VendorCommand::Reactivate(ReactivateVendor {
            tenant_id,
            occurred_at: Utc::now(),
        });
        for e in vendor.handle(&reactivate).unwrap() {
            vendor.apply(&e);
        }
        assert_eq!(vendor.status(), VendorStatus::Active);
    }

    #[test]
    fn update_without_changes_emits_nothing() {
        let tenant_id = test_tenant_id();
        let vendor = registered(tenant_id);
        let events = vendor
            .handle(&VendorCommand::Update(UpdateVendor {
                tenant_id,
                name: Some("Acme Supplies".to_string()),
                contact: None,
                default_terms: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn commands_on_missing_vendor_are_not_found() {
        let vendor = Vendor::empty(VendorId::generate());
        let err = vendor
            .handle(&VendorCommand::Reactivate(ReactivateVendor {
                tenant_id: test_tenant_id(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
