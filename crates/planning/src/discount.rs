//! Purchase discount codes and quoting.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money;
use ironbooks_core::{Aggregate, AggregateId, DomainError, DomainResult, TenantId, text, typed_id};
use ironbooks_events::Event;

typed_id!(
    /// Discount identifier.
    DiscountId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage { bps: u32 },
    FixedAmount { amount: i64 },
}

impl DiscountKind {
    fn validate(&self) -> DomainResult<()> {
        match *self {
            DiscountKind::Percentage { bps } if !(1..=10_000).contains(&bps) => Err(
                DomainError::validation("percentage must be between 1 and 10000 basis points"),
            ),
            DiscountKind::FixedAmount { amount } => money::ensure_positive("amount", amount),
            DiscountKind::Percentage { .. } => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountStatus {
    Active,
    Inactive,
}

/// Discount codes are upper-case letters, digits, `-` and `_`, at most 32 long.
pub fn normalize_code(code: &str) -> DomainResult<String> {
    let code = text::required_max("code", code, 32)?.to_ascii_uppercase();
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(DomainError::validation(
            "code may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discount {
    id: DiscountId,
    tenant_id: Option<TenantId>,
    code: String,
    description: String,
    kind: DiscountKind,
    valid_from: Option<NaiveDate>,
    valid_until: Option<NaiveDate>,
    min_purchase: i64,
    status: DiscountStatus,
    version: u64,
    created: bool,
}

impl Discount {
    pub fn empty(id: DiscountId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            description: String::new(),
            kind: DiscountKind::Percentage { bps: 0 },
            valid_from: None,
            valid_until: None,
            min_purchase: 0,
            status: DiscountStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn kind(&self) -> DiscountKind {
        self.kind
    }

    pub fn status(&self) -> DiscountStatus {
        self.status
    }

    pub fn is_active_on(&self, on: NaiveDate) -> bool {
        self.created
            && self.status == DiscountStatus::Active
            && self.valid_from.is_some_and(|from| from <= on)
            && self.valid_until.is_none_or(|until| on <= until)
    }

    /// Discount for a purchase of `amount` on `on`; zero when it does not apply.
    pub fn quote(&self, amount: i64, on: NaiveDate) -> DomainResult<i64> {
        money::ensure_non_negative("amount", amount)?;
        if !self.is_active_on(on) || amount < self.min_purchase {
            return Ok(0);
        }
        let discount = match self.kind {
            DiscountKind::Percentage { bps } => money::apply_rate_bps(amount, bps)?,
            DiscountKind::FixedAmount { amount } => amount,
        };
        Ok(discount.min(amount))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDiscount {
    pub tenant_id: TenantId,
    pub code: String,
    pub description: String,
    pub kind: DiscountKind,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub min_purchase: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateDiscount {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountCommand {
    Create(CreateDiscount),
    Deactivate(DeactivateDiscount),
}

ironbooks_events::tenant_command!(DiscountCommand { Create, Deactivate });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCreated {
    pub tenant_id: TenantId,
    pub discount_id: DiscountId,
    pub code: String,
    pub description: String,
    pub kind: DiscountKind,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub min_purchase: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountDeactivated {
    pub tenant_id: TenantId,
    pub discount_id: DiscountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountEvent {
    Created(DiscountCreated),
    Deactivated(DiscountDeactivated),
}

impl Event for DiscountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DiscountEvent::Created(_) => "planning.discount.created",
            DiscountEvent::Deactivated(_) => "planning.discount.deactivated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DiscountEvent::Created(e) => e.occurred_at,
            DiscountEvent::Deactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Discount {
    type Command = DiscountCommand;
    type Event = DiscountEvent;

    const AGGREGATE_TYPE: &'static str = "planning.discount";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DiscountEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.description = e.description.clone();
                self.kind = e.kind;
                self.valid_from = Some(e.valid_from);
                self.valid_until = e.valid_until;
                self.min_purchase = e.min_purchase;
                self.status = DiscountStatus::Active;
                self.created = true;
            }
            DiscountEvent::Deactivated(_) => self.status = DiscountStatus::Inactive,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            DiscountCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("discount already exists"));
                }
                cmd.kind.validate()?;
                money::ensure_non_negative("min_purchase", cmd.min_purchase)?;
                if cmd.valid_until.is_some_and(|until| until < cmd.valid_from) {
                    return Err(DomainError::validation("valid_until must not precede valid_from"));
                }
                Ok(vec![DiscountEvent::Created(DiscountCreated {
                    tenant_id: cmd.tenant_id,
                    discount_id: self.id,
                    code: normalize_code(&cmd.code)?,
                    description: text::required_max("description", &cmd.description, 500)?,
                    kind: cmd.kind,
                    valid_from: cmd.valid_from,
                    valid_until: cmd.valid_until,
                    min_purchase: cmd.min_purchase,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DiscountCommand::Deactivate(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                if self.status == DiscountStatus::Inactive {
                    return Ok(vec![]);
                }
                Ok(vec![DiscountEvent::Deactivated(DiscountDeactivated {
                    tenant_id: cmd.tenant_id,
                    discount_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
