//! Landed cost: freight, duty and similar charges capitalized into received lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money;
use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

use crate::apportion::apportion;
use crate::sku::normalize_sku;

typed_id!(
    /// Landed cost document identifier.
    LandedCostId
);

/// Basis used to spread the charges across lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    Value,
    Weight,
    Volume,
    Quantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    Freight,
    Customs,
    Handling,
    Insurance,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandedCostStatus {
    Draft,
    Allocated,
    Posted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostLineInput {
    pub sku: String,
    pub quantity: i64,
    pub value: i64,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostLine {
    pub line_no: u32,
    pub sku: String,
    pub quantity: i64,
    pub value: i64,
    pub weight: i64,
    pub volume: i64,
}

impl LandedCostLine {
    fn basis(&self, method: AllocationMethod) -> u64 {
        let raw = match method {
            AllocationMethod::Value => self.value,
            AllocationMethod::Weight => self.weight,
            AllocationMethod::Volume => self.volume,
            AllocationMethod::Quantity => self.quantity,
        };
        raw.max(0) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeInput {
    pub kind: ChargeKind,
    pub description: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCharge {
    pub charge_no: u32,
    pub kind: ChargeKind,
    pub description: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAllocation {
    pub line_no: u32,
    pub sku: String,
    pub allocated: i64,
    pub landed_total: i64,
    pub landed_unit_cost: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandedCost {
    id: LandedCostId,
    tenant_id: Option<TenantId>,
    reference: String,
    method: AllocationMethod,
    lines: Vec<LandedCostLine>,
    charges: Vec<LandedCharge>,
    allocations: Vec<LineAllocation>,
    status: LandedCostStatus,
    version: u64,
    created: bool,
}

impl LandedCost {
    pub fn empty(id: LandedCostId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: String::new(),
            method: AllocationMethod::Value,
            lines: Vec::new(),
            charges: Vec::new(),
            allocations: Vec::new(),
            status: LandedCostStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn method(&self) -> AllocationMethod {
        self.method
    }

    pub fn lines(&self) -> &[LandedCostLine] {
        &self.lines
    }

    pub fn charges(&self) -> &[LandedCharge] {
        &self.charges
    }

    pub fn allocations(&self) -> &[LineAllocation] {
        &self.allocations
    }

    pub fn status(&self) -> LandedCostStatus {
        self.status
    }

    pub fn total_charges(&self) -> Result<i64, DomainError> {
        money::checked_sum(self.charges.iter().map(|c| c.amount))
    }

    /// Apportion the current charges across the lines.
    pub fn compute_allocations(&self) -> Result<Vec<LineAllocation>, DomainError> {
        let total = self.total_charges()?;
        let basis: Vec<u64> = self.lines.iter().map(|l| l.basis(self.method)).collect();
        let shares = apportion(total, &basis)?;

        self.lines
            .iter()
            .zip(shares)
            .map(|(line, allocated)| {
                let landed_total = money::checked_sum([line.value, allocated])?;
                let landed_unit_cost =
                    money::div_round_half_up(landed_total as i128, line.quantity as i128)?;
                Ok(LineAllocation {
                    line_no: line.line_no,
                    sku: line.sku.clone(),
                    allocated,
                    landed_total,
                    landed_unit_cost,
                })
            })
            .collect()
    }

    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[LandedCostStatus], action: &str) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::invariant(format!(
                "cannot {action} a landed cost in status {:?}",
                self.status
            )));
        }
        Ok(())
    }
}

fn build_lines(inputs: &[LandedCostLineInput]) -> Result<Vec<LandedCostLine>, DomainError> {
    if inputs.is_empty() {
        return Err(DomainError::validation("at least one line is required"));
    }
    inputs
        .iter()
        .enumerate()
        .map(|(idx, input)| {
            money::ensure_positive("quantity", input.quantity)?;
            money::ensure_non_negative("value", input.value)?;
            money::ensure_non_negative("weight", input.weight)?;
            money::ensure_non_negative("volume", input.volume)?;
            Ok(LandedCostLine {
                line_no: idx as u32 + 1,
                sku: normalize_sku(&input.sku)?,
                quantity: input.quantity,
                value: input.value,
                weight: input.weight,
                volume: input.volume,
            })
        })
        .collect()
}

fn build_charge(charge_no: u32, input: &ChargeInput) -> Result<LandedCharge, DomainError> {
    money::ensure_positive("amount", input.amount)?;
    Ok(LandedCharge {
        charge_no,
        kind: input.kind,
        description: text::required_max("description", &input.description, 200)?,
        amount: input.amount,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLandedCost {
    pub tenant_id: TenantId,
    pub reference: String,
    pub method: AllocationMethod,
    pub lines: Vec<LandedCostLineInput>,
    pub charges: Vec<ChargeInput>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCharge {
    pub tenant_id: TenantId,
    pub charge: ChargeInput,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateLandedCost {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLandedCost {
    pub tenant_id: TenantId,
    pub posted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelLandedCost {
    pub tenant_id: TenantId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandedCostCommand {
    Create(CreateLandedCost),
    AddCharge(AddCharge),
    Allocate(AllocateLandedCost),
    Post(PostLandedCost),
    Cancel(CancelLandedCost),
}

ironbooks_events::tenant_command!(LandedCostCommand { Create, AddCharge, Allocate, Post, Cancel });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostCreated {
    pub tenant_id: TenantId,
    pub landed_cost_id: LandedCostId,
    pub reference: String,
    pub method: AllocationMethod,
    pub lines: Vec<LandedCostLine>,
    pub charges: Vec<LandedCharge>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeAdded {
    pub tenant_id: TenantId,
    pub landed_cost_id: LandedCostId,
    pub charge: LandedCharge,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostAllocated {
    pub tenant_id: TenantId,
    pub landed_cost_id: LandedCostId,
    pub total_charges: i64,
    pub allocations: Vec<LineAllocation>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostPosted {
    pub tenant_id: TenantId,
    pub landed_cost_id: LandedCostId,
    pub total_charges: i64,
    pub posted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostCancelled {
    pub tenant_id: TenantId,
    pub landed_cost_id: LandedCostId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandedCostEvent {
    Created(LandedCostCreated),
    ChargeAdded(ChargeAdded),
    Allocated(LandedCostAllocated),
    Posted(LandedCostPosted),
    Cancelled(LandedCostCancelled),
}

impl Event for LandedCostEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LandedCostEvent::Created(_) => "costing.landed_cost.created",
            LandedCostEvent::ChargeAdded(_) => "costing.landed_cost.charge_added",
            LandedCostEvent::Allocated(_) => "costing.landed_cost.allocated",
            LandedCostEvent::Posted(_) => "costing.landed_cost.posted",
            LandedCostEvent::Cancelled(_) => "costing.landed_cost.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LandedCostEvent::Created(e) => e.occurred_at,
            LandedCostEvent::ChargeAdded(e) => e.occurred_at,
            LandedCostEvent::Allocated(e) => e.occurred_at,
            LandedCostEvent::Posted(e) => e.occurred_at,
            LandedCostEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for LandedCost {
    type Command = LandedCostCommand;
    type Event = LandedCostEvent;

    const AGGREGATE_TYPE: &'static str = "costing.landed_cost";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LandedCostEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.method = e.method;
                self.lines = e.lines.clone();
                self.charges = e.charges.clone();
                self.allocations.clear();
                self.status = LandedCostStatus::Draft;
                self.created = true;
            }
            LandedCostEvent::ChargeAdded(e) => self.charges.push(e.charge.clone()),
            LandedCostEvent::Allocated(e) => {
                self.allocations = e.allocations.clone();
                self.status = LandedCostStatus::Allocated;
            }
            LandedCostEvent::Posted(_) => self.status = LandedCostStatus::Posted,
            LandedCostEvent::Cancelled(_) => self.status = LandedCostStatus::Cancelled,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            LandedCostCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("landed cost already exists"));
                }
                let lines = build_lines(&cmd.lines)?;
                let charges = cmd
                    .charges
                    .iter()
                    .enumerate()
                    .map(|(idx, c)| build_charge(idx as u32 + 1, c))
                    .collect::<Result<Vec<_>, _>>()?;
                money::checked_sum(charges.iter().map(|c| c.amount))?;

                Ok(vec![LandedCostEvent::Created(LandedCostCreated {
                    tenant_id: cmd.tenant_id,
                    landed_cost_id: self.id,
                    reference: text::required_max("reference", &cmd.reference, 100)?,
                    method: cmd.method,
                    lines,
                    charges,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LandedCostCommand::AddCharge(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[LandedCostStatus::Draft], "add a charge to")?;
                let charge = build_charge(self.charges.len() as u32 + 1, &cmd.charge)?;
                money::checked_sum([self.total_charges()?, charge.amount])?;
                Ok(vec![LandedCostEvent::ChargeAdded(ChargeAdded {
                    tenant_id: cmd.tenant_id,
                    landed_cost_id: self.id,
                    charge,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LandedCostCommand::Allocate(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[LandedCostStatus::Draft], "allocate")?;
                if self.charges.is_empty() {
                    return Err(DomainError::invariant("landed cost has no charges"));
                }
                Ok(vec![LandedCostEvent::Allocated(LandedCostAllocated {
                    tenant_id: cmd.tenant_id,
                    landed_cost_id: self.id,
                    total_charges: self.total_charges()?,
                    allocations: self.compute_allocations()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LandedCostCommand::Post(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[LandedCostStatus::Allocated], "post")?;
                Ok(vec![LandedCostEvent::Posted(LandedCostPosted {
                    tenant_id: cmd.tenant_id,
                    landed_cost_id: self.id,
                    total_charges: self.total_charges()?,
                    posted_by: cmd.posted_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LandedCostCommand::Cancel(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(
                    &[LandedCostStatus::Draft, LandedCostStatus::Allocated],
                    "cancel",
                )?;
                Ok(vec![LandedCostEvent::Cancelled(LandedCostCancelled {
                    tenant_id: cmd.tenant_id,
                    landed_cost_id: self.id,
                    reason: text::optional(cmd.reason.as_deref()),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(sku: &str, quantity: i64, value: i64, weight: i64) -> LandedCostLineInput {
        LandedCostLineInput {
            sku: sku.to_string(),
            quantity,
            value,
            weight,
            volume: 0,
        }
    }

    fn charge(amount: i64) -> ChargeInput {
        ChargeInput {
            kind: ChargeKind::Freight,
            description: "ocean freight".to_string(),
            amount,
        }
    }

    fn created(
        tenant_id: TenantId,
        method: AllocationMethod,
        lines: Vec<LandedCostLineInput>,
        charges: Vec<ChargeInput>,
    ) -> Result<LandedCost, DomainError> {
        let mut lc = LandedCost::empty(LandedCostId::generate());
        let events = lc.handle(&LandedCostCommand::Create(CreateLandedCost {
            tenant_id,
            reference: "SHIP-0042".to_string(),
            method,
            lines,
            charges,
            occurred_at: Utc::now(),
        }))?;
        for e in events {
            lc.apply(&e);
        }
        Ok(lc)
    }

    fn allocate(lc: &mut LandedCost, tenant_id: TenantId) -> Result<(), DomainError> {
        let events = lc.handle(&LandedCostCommand::Allocate(AllocateLandedCost {
            tenant_id,
            occurred_at: Utc::now(),
        }))?;
        for e in events {
            lc.apply(&e);
        }
        Ok(())
    }

    #[test]
    fn value_method_allocates_and_computes_unit_cost() {
        let tenant_id = TenantId::new();
        let mut lc = created(
            tenant_id,
            AllocationMethod::Value,
            vec![line("A", 10, 30_000, 0), line("B", 3, 10_000, 0)],
            vec![charge(1_000), charge(1)],
        )
        .unwrap();
        allocate(&mut lc, tenant_id).unwrap();

        let allocations = lc.allocations();
        assert_eq!(allocations[0].allocated, 751);
        assert_eq!(allocations[1].allocated, 250);
        assert_eq!(allocations[0].landed_total, 30_751);
        assert_eq!(allocations[0].landed_unit_cost, 3_075);
        // 10_250 / 3 = 3416.67
        assert_eq!(allocations[1].landed_unit_cost, 3_417);
        assert_eq!(lc.status(), LandedCostStatus::Allocated);
    }

    #[test]
    fn zero_basis_everywhere_is_rejected() {
        let tenant_id = TenantId::new();
        let mut lc = created(
            tenant_id,
            AllocationMethod::Weight,
            vec![line("A", 1, 100, 0), line("B", 1, 100, 0)],
            vec![charge(500)],
        )
        .unwrap();
        let err = allocate(&mut lc, tenant_id).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn charges_cannot_be_added_after_allocation() {
        let tenant_id = TenantId::new();
        let mut lc = created(
            tenant_id,
            AllocationMethod::Quantity,
            vec![line("A", 4, 100, 0)],
            vec![charge(80)],
        )
        .unwrap();
        allocate(&mut lc, tenant_id).unwrap();

        let err = lc
            .handle(&LandedCostCommand::AddCharge(AddCharge {
                tenant_id,
                charge: charge(10),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn post_requires_allocation() {
        let tenant_id = TenantId::new();
        let lc = created(
            tenant_id,
            AllocationMethod::Quantity,
            vec![line("A", 4, 100, 0)],
            vec![charge(80)],
        )
        .unwrap();
        let err = lc
            .handle(&LandedCostCommand::Post(PostLandedCost {
                tenant_id,
                posted_by: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #[test]
        fn allocations_sum_to_charges(
            method in prop_oneof![
                Just(AllocationMethod::Value),
                Just(AllocationMethod::Weight),
                Just(AllocationMethod::Quantity),
            ],
            lines in proptest::collection::vec((1i64..500, 1i64..1_000_000, 1i64..10_000), 1..12),
            charges in proptest::collection::vec(1i64..5_000_000, 1..5),
        ) {
            let tenant_id = TenantId::new();
            let inputs = lines
                .iter()
                .enumerate()
                .map(|(i, (q, v, w))| line(&format!("SKU-{i}"), *q, *v, *w))
                .collect();
            let charge_inputs = charges.iter().map(|a| charge(*a)).collect();
            let mut lc = created(tenant_id, method, inputs, charge_inputs).unwrap();
            allocate(&mut lc, tenant_id).unwrap();

            let allocated: i64 = lc.allocations().iter().map(|a| a.allocated).sum();
            prop_assert_eq!(allocated, charges.iter().sum::<i64>());
        }
    }
}
