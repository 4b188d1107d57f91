//! Standard (expected) unit cost per SKU.
//!
//! The cost only changes through a posted revaluation, so every change has an
//! audit record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money;
use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, text, typed_id};
use ironbooks_events::Event;

use crate::revaluation::RevaluationId;
use crate::sku::normalize_sku;

typed_id!(
    /// Standard cost record identifier (one per SKU).
    StandardCostId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostHistoryEntry {
    pub effective_from: NaiveDate,
    pub unit_cost: i64,
    pub revaluation_id: Option<RevaluationId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardCost {
    id: StandardCostId,
    tenant_id: Option<TenantId>,
    sku: String,
    description: String,
    unit_cost: i64,
    history: Vec<CostHistoryEntry>,
    version: u64,
    created: bool,
}

impl StandardCost {
    pub fn empty(id: StandardCostId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            description: String::new(),
            unit_cost: 0,
            history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit_cost(&self) -> i64 {
        self.unit_cost
    }

    pub fn history(&self) -> &[CostHistoryEntry] {
        &self.history
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishStandardCost {
    pub tenant_id: TenantId,
    pub sku: String,
    pub description: String,
    pub unit_cost: i64,
    pub effective_from: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDescription {
    pub tenant_id: TenantId,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Move the cost to `new_unit_cost`, provided it is still `expected_unit_cost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRevaluation {
    pub tenant_id: TenantId,
    pub revaluation_id: RevaluationId,
    pub expected_unit_cost: i64,
    pub new_unit_cost: i64,
    pub effective_from: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Undo the latest applied revaluation when that revaluation never got posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertRevaluation {
    pub tenant_id: TenantId,
    pub revaluation_id: RevaluationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandardCostCommand {
    Establish(EstablishStandardCost),
    UpdateDescription(UpdateDescription),
    ApplyRevaluation(ApplyRevaluation),
    RevertRevaluation(RevertRevaluation),
}

ironbooks_events::tenant_command!(StandardCostCommand {
    Establish,
    UpdateDescription,
    ApplyRevaluation,
    RevertRevaluation,
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardCostEstablished {
    pub tenant_id: TenantId,
    pub standard_cost_id: StandardCostId,
    pub sku: String,
    pub description: String,
    pub unit_cost: i64,
    pub effective_from: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionUpdated {
    pub tenant_id: TenantId,
    pub standard_cost_id: StandardCostId,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardCostRevalued {
    pub tenant_id: TenantId,
    pub standard_cost_id: StandardCostId,
    pub revaluation_id: RevaluationId,
    pub previous_unit_cost: i64,
    pub unit_cost: i64,
    pub effective_from: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevaluationReverted {
    pub tenant_id: TenantId,
    pub standard_cost_id: StandardCostId,
    pub revaluation_id: RevaluationId,
    /// Cost restored by the revert.
    pub unit_cost: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandardCostEvent {
    Established(StandardCostEstablished),
    DescriptionUpdated(DescriptionUpdated),
    Revalued(StandardCostRevalued),
    Reverted(RevaluationReverted),
}

impl Event for StandardCostEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StandardCostEvent::Established(_) => "costing.standard_cost.established",
            StandardCostEvent::DescriptionUpdated(_) => "costing.standard_cost.description_updated",
            StandardCostEvent::Revalued(_) => "costing.standard_cost.revalued",
            StandardCostEvent::Reverted(_) => "costing.standard_cost.revaluation_reverted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StandardCostEvent::Established(e) => e.occurred_at,
            StandardCostEvent::DescriptionUpdated(e) => e.occurred_at,
            StandardCostEvent::Revalued(e) => e.occurred_at,
            StandardCostEvent::Reverted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StandardCost {
    type Command = StandardCostCommand;
    type Event = StandardCostEvent;

    const AGGREGATE_TYPE: &'static str = "costing.standard_cost";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StandardCostEvent::Established(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.description = e.description.clone();
                self.unit_cost = e.unit_cost;
                self.history = vec![CostHistoryEntry {
                    effective_from: e.effective_from,
                    unit_cost: e.unit_cost,
                    revaluation_id: None,
                }];
                self.created = true;
            }
            StandardCostEvent::DescriptionUpdated(e) => {
                self.description = e.description.clone();
            }
            StandardCostEvent::Revalued(e) => {
                self.unit_cost = e.unit_cost;
                self.history.push(CostHistoryEntry {
                    effective_from: e.effective_from,
                    unit_cost: e.unit_cost,
                    revaluation_id: Some(e.revaluation_id),
                });
            }
            StandardCostEvent::Reverted(e) => {
                self.history.pop();
                self.unit_cost = e.unit_cost;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            StandardCostCommand::Establish(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("standard cost already exists"));
                }
                money::ensure_positive("unit_cost", cmd.unit_cost)?;
                Ok(vec![StandardCostEvent::Established(StandardCostEstablished {
                    tenant_id: cmd.tenant_id,
                    standard_cost_id: self.id,
                    sku: normalize_sku(&cmd.sku)?,
                    description: text::required_max("description", &cmd.description, 500)?,
                    unit_cost: cmd.unit_cost,
                    effective_from: cmd.effective_from,
                    occurred_at: cmd.occurred_at,
                })])
            }
            StandardCostCommand::UpdateDescription(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                let description = text::required_max("description", &cmd.description, 500)?;
                if description == self.description {
                    return Ok(vec![]);
                }
                Ok(vec![StandardCostEvent::DescriptionUpdated(DescriptionUpdated {
                    tenant_id: cmd.tenant_id,
                    standard_cost_id: self.id,
                    description,
                    occurred_at: cmd.occurred_at,
                })])
            }
            StandardCostCommand::ApplyRevaluation(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                money::ensure_positive("new_unit_cost", cmd.new_unit_cost)?;
                if cmd.expected_unit_cost != self.unit_cost {
                    return Err(DomainError::invariant(format!(
                        "standard cost changed since the revaluation was drafted (expected {}, now {})",
                        cmd.expected_unit_cost, self.unit_cost
                    )));
                }
                if self
                    .history
                    .iter()
                    .any(|h| h.revaluation_id == Some(cmd.revaluation_id))
                {
                    return Err(DomainError::conflict("revaluation already applied"));
                }
                Ok(vec![StandardCostEvent::Revalued(StandardCostRevalued {
                    tenant_id: cmd.tenant_id,
                    standard_cost_id: self.id,
                    revaluation_id: cmd.revaluation_id,
                    previous_unit_cost: self.unit_cost,
                    unit_cost: cmd.new_unit_cost,
                    effective_from: cmd.effective_from,
                    occurred_at: cmd.occurred_at,
                })])
            }
            StandardCostCommand::RevertRevaluation(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                let [.., previous, last] = self.history.as_slice() else {
                    return Err(DomainError::invariant("no revaluation to revert"));
                };
                if last.revaluation_id != Some(cmd.revaluation_id) {
                    return Err(DomainError::invariant(
                        "only the latest revaluation can be reverted",
                    ));
                }
                Ok(vec![StandardCostEvent::Reverted(RevaluationReverted {
                    tenant_id: cmd.tenant_id,
                    standard_cost_id: self.id,
                    revaluation_id: cmd.revaluation_id,
                    unit_cost: previous.unit_cost,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl StandardCost {
    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established(tenant_id: TenantId, unit_cost: i64) -> StandardCost {
        let mut cost = StandardCost::empty(StandardCostId::generate());
        let cmd = StandardCostCommand::Establish(EstablishStandardCost {
            tenant_id,
            sku: "BOLT-M8".to_string(),
            description: "M8 hex bolt".to_string(),
            unit_cost,
            effective_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            occurred_at: Utc::now(),
        });
        for e in cost.handle(&cmd).unwrap() {
            cost.apply(&e);
        }
        cost
    }

    fn revalue(tenant_id: TenantId, revaluation_id: RevaluationId, expected: i64, new: i64) -> StandardCostCommand {
        StandardCostCommand::ApplyRevaluation(ApplyRevaluation {
            tenant_id,
            revaluation_id,
            expected_unit_cost: expected,
            new_unit_cost: new,
            effective_from: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn sku_with_spaces_is_rejected() {
        let cost = StandardCost::empty(StandardCostId::generate());
        let err = cost
            .handle(&StandardCostCommand::Establish(EstablishStandardCost {
                tenant_id: TenantId::new(),
                sku: "BOLT M8".to_string(),
                description: "bolt".to_string(),
                unit_cost: 10,
                effective_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn revaluation_records_history() {
        let tenant_id = TenantId::new();
        let mut cost = established(tenant_id, 125);
        let reval = RevaluationId::generate();

        for e in cost.handle(&revalue(tenant_id, reval, 125, 140)).unwrap() {
            cost.apply(&e);
        }

        assert_eq!(cost.unit_cost(), 140);
        assert_eq!(cost.history().len(), 2);
        assert_eq!(cost.history()[1].revaluation_id, Some(reval));
    }

    #[test]
    fn stale_expected_cost_is_rejected() {
        let tenant_id = TenantId::new();
        let cost = established(tenant_id, 125);
        let err = cost
            .handle(&revalue(tenant_id, RevaluationId::generate(), 100, 140))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn same_revaluation_cannot_apply_twice() {
        let tenant_id = TenantId::new();
        let mut cost = established(tenant_id, 125);
        let reval = RevaluationId::generate();
        for e in cost.handle(&revalue(tenant_id, reval, 125, 140)).unwrap() {
            cost.apply(&e);
        }
        let err = cost.handle(&revalue(tenant_id, reval, 140, 150)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    fn revert(tenant_id: TenantId, revaluation_id: RevaluationId) -> StandardCostCommand {
        StandardCostCommand::RevertRevaluation(RevertRevaluation {
            tenant_id,
            revaluation_id,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn revert_restores_the_previous_cost() {
        let tenant_id = TenantId::new();
        let mut cost = established(tenant_id, 125);
        let first = RevaluationId::generate();
        let second = RevaluationId::generate();
        for cmd in [revalue(tenant_id, first, 125, 140), revalue(tenant_id, second, 140, 160)] {
            for e in cost.handle(&cmd).unwrap() {
                cost.apply(&e);
            }
        }

        let err = cost.handle(&revert(tenant_id, first)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        for e in cost.handle(&revert(tenant_id, second)).unwrap() {
            cost.apply(&e);
        }
        assert_eq!(cost.unit_cost(), 140);
        assert_eq!(cost.history().len(), 2);
        assert_eq!(cost.history()[1].revaluation_id, Some(first));
    }

    #[test]
    fn nothing_to_revert_on_a_fresh_cost() {
        let tenant_id = TenantId::new();
        let cost = established(tenant_id, 125);
        let err = cost.handle(&revert(tenant_id, RevaluationId::generate())).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
