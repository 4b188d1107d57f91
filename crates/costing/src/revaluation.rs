//! Inventory revaluation: a change of standard cost with its GL effect.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_accounting::chart;
use ironbooks_accounting::ledger::JournalEntryLine;
use ironbooks_accounting::posting;
use ironbooks_core::money;
use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

use crate::sku::normalize_sku;
use crate::standard_cost::StandardCostId;

typed_id!(
    /// Revaluation document identifier.
    RevaluationId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevaluationStatus {
    Draft,
    Posted,
    Cancelled,
}

/// GL lines the revaluation would post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevaluationPreview {
    pub delta: i64,
    pub lines: Vec<JournalEntryLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revaluation {
    id: RevaluationId,
    tenant_id: Option<TenantId>,
    standard_cost_id: Option<StandardCostId>,
    sku: String,
    current_unit_cost: i64,
    new_unit_cost: i64,
    on_hand_quantity: i64,
    effective_date: Option<NaiveDate>,
    reason: String,
    inventory_account: String,
    adjustment_account: String,
    status: RevaluationStatus,
    version: u64,
    created: bool,
}

impl Revaluation {
    pub fn empty(id: RevaluationId) -> Self {
        Self {
            id,
            tenant_id: None,
            standard_cost_id: None,
            sku: String::new(),
            current_unit_cost: 0,
            new_unit_cost: 0,
            on_hand_quantity: 0,
            effective_date: None,
            reason: String::new(),
            inventory_account: chart::INVENTORY.to_string(),
            adjustment_account: chart::INVENTORY_REVALUATION.to_string(),
            status: RevaluationStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn standard_cost_id(&self) -> Option<StandardCostId> {
        self.standard_cost_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn current_unit_cost(&self) -> i64 {
        self.current_unit_cost
    }

    pub fn new_unit_cost(&self) -> i64 {
        self.new_unit_cost
    }

    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.effective_date
    }

    pub fn status(&self) -> RevaluationStatus {
        self.status
    }

    pub fn delta(&self) -> Result<i64, DomainError> {
        revaluation_delta(self.current_unit_cost, self.new_unit_cost, self.on_hand_quantity)
    }

    pub fn preview(&self) -> Result<RevaluationPreview, DomainError> {
        let delta = self.delta()?;
        Ok(RevaluationPreview {
            delta,
            lines: posting::revaluation(delta, &self.inventory_account, &self.adjustment_account),
        })
    }
}

/// `(new - current) * quantity`, checked.
pub fn revaluation_delta(current: i64, new: i64, quantity: i64) -> Result<i64, DomainError> {
    let per_unit = (new as i128) - (current as i128);
    money::narrow(per_unit * quantity as i128)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRevaluation {
    pub tenant_id: TenantId,
    pub standard_cost_id: StandardCostId,
    pub sku: String,
    pub current_unit_cost: i64,
    pub new_unit_cost: i64,
    pub on_hand_quantity: i64,
    pub effective_date: NaiveDate,
    pub reason: String,
    pub inventory_account: Option<String>,
    pub adjustment_account: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRevaluation {
    pub tenant_id: TenantId,
    pub posted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRevaluation {
    pub tenant_id: TenantId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevaluationCommand {
    Draft(DraftRevaluation),
    Post(PostRevaluation),
    Cancel(CancelRevaluation),
}

ironbooks_events::tenant_command!(RevaluationCommand { Draft, Post, Cancel });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevaluationDrafted {
    pub tenant_id: TenantId,
    pub revaluation_id: RevaluationId,
    pub standard_cost_id: StandardCostId,
    pub sku: String,
    pub current_unit_cost: i64,
    pub new_unit_cost: i64,
    pub on_hand_quantity: i64,
    pub effective_date: NaiveDate,
    pub reason: String,
    pub inventory_account: String,
    pub adjustment_account: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevaluationPosted {
    pub tenant_id: TenantId,
    pub revaluation_id: RevaluationId,
    pub delta: i64,
    pub posted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevaluationCancelled {
    pub tenant_id: TenantId,
    pub revaluation_id: RevaluationId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevaluationEvent {
    Drafted(RevaluationDrafted),
    Posted(RevaluationPosted),
    Cancelled(RevaluationCancelled),
}

impl Event for RevaluationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RevaluationEvent::Drafted(_) => "costing.revaluation.drafted",
            RevaluationEvent::Posted(_) => "costing.revaluation.posted",
            RevaluationEvent::Cancelled(_) => "costing.revaluation.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RevaluationEvent::Drafted(e) => e.occurred_at,
            RevaluationEvent::Posted(e) => e.occurred_at,
            RevaluationEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

fn account_or(code: Option<&str>, default: &str) -> Result<String, DomainError> {
    match text::optional(code) {
        None => Ok(default.to_string()),
        Some(code) if chart::is_valid_code(&code) => Ok(code),
        Some(code) => Err(DomainError::validation(format!("invalid account code: {code}"))),
    }
}

impl Aggregate for Revaluation {
    type Command = RevaluationCommand;
    type Event = RevaluationEvent;

    const AGGREGATE_TYPE: &'static str = "costing.revaluation";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RevaluationEvent::Drafted(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.standard_cost_id = Some(e.standard_cost_id);
                self.sku = e.sku.clone();
                self.current_unit_cost = e.current_unit_cost;
                self.new_unit_cost = e.new_unit_cost;
                self.on_hand_quantity = e.on_hand_quantity;
                self.effective_date = Some(e.effective_date);
                self.reason = e.reason.clone();
                self.inventory_account = e.inventory_account.clone();
                self.adjustment_account = e.adjustment_account.clone();
                self.status = RevaluationStatus::Draft;
                self.created = true;
            }
            RevaluationEvent::Posted(_) => self.status = RevaluationStatus::Posted,
            RevaluationEvent::Cancelled(_) => self.status = RevaluationStatus::Cancelled,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            RevaluationCommand::Draft(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("revaluation already exists"));
                }
                money::ensure_positive("current_unit_cost", cmd.current_unit_cost)?;
                money::ensure_positive("new_unit_cost", cmd.new_unit_cost)?;
                money::ensure_non_negative("on_hand_quantity", cmd.on_hand_quantity)?;
                if cmd.new_unit_cost == cmd.current_unit_cost {
                    return Err(DomainError::validation(
                        "new_unit_cost must differ from current_unit_cost",
                    ));
                }
                revaluation_delta(cmd.current_unit_cost, cmd.new_unit_cost, cmd.on_hand_quantity)?;

                let inventory_account =
                    account_or(cmd.inventory_account.as_deref(), chart::INVENTORY)?;
                let adjustment_account =
                    account_or(cmd.adjustment_account.as_deref(), chart::INVENTORY_REVALUATION)?;
                if inventory_account == adjustment_account {
                    return Err(DomainError::validation(
                        "inventory and adjustment accounts must differ",
                    ));
                }

                Ok(vec![RevaluationEvent::Drafted(RevaluationDrafted {
                    tenant_id: cmd.tenant_id,
                    revaluation_id: self.id,
                    standard_cost_id: cmd.standard_cost_id,
                    sku: normalize_sku(&cmd.sku)?,
                    current_unit_cost: cmd.current_unit_cost,
                    new_unit_cost: cmd.new_unit_cost,
                    on_hand_quantity: cmd.on_hand_quantity,
                    effective_date: cmd.effective_date,
                    reason: text::required_max("reason", &cmd.reason, 500)?,
                    inventory_account,
                    adjustment_account,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RevaluationCommand::Post(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_draft("post")?;
                Ok(vec![RevaluationEvent::Posted(RevaluationPosted {
                    tenant_id: cmd.tenant_id,
                    revaluation_id: self.id,
                    delta: self.delta()?,
                    posted_by: cmd.posted_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RevaluationCommand::Cancel(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_draft("cancel")?;
                Ok(vec![RevaluationEvent::Cancelled(RevaluationCancelled {
                    tenant_id: cmd.tenant_id,
                    revaluation_id: self.id,
                    reason: text::optional(cmd.reason.as_deref()),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Revaluation {
    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, action: &str) -> Result<(), DomainError> {
        if self.status != RevaluationStatus::Draft {
            return Err(DomainError::invariant(format!(
                "cannot {action} a revaluation in status {:?}",
                self.status
            )));
        }
        Ok(())
    }
}
