//! Cost variance: actual vs. standard, split into price and quantity effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money;
use ironbooks_core::{
    Aggregate, AggregateId, DomainError, DomainResult, TenantId, UserId, text, typed_id,
};
use ironbooks_events::Event;

use crate::sku::normalize_sku;

typed_id!(
    /// Cost variance record identifier.
    CostVarianceId
);

pub const DEFAULT_THRESHOLD_BPS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceSourceKind {
    Purchase,
    Production,
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceSource {
    pub kind: VarianceSourceKind,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceDirection {
    Favorable,
    Unfavorable,
    Neutral,
}

impl VarianceDirection {
    pub fn of(total: i64) -> Self {
        match total.signum() {
            1 => VarianceDirection::Unfavorable,
            -1 => VarianceDirection::Favorable,
            _ => VarianceDirection::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceStatus {
    Open,
    Acknowledged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceInputs {
    pub standard_unit_cost: i64,
    pub actual_unit_cost: i64,
    pub standard_quantity: i64,
    pub actual_quantity: i64,
    pub threshold_bps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceAnalysis {
    pub standard_total: i64,
    pub actual_total: i64,
    pub price_variance: i64,
    pub quantity_variance: i64,
    pub total_variance: i64,
    pub direction: VarianceDirection,
    pub significant: bool,
}

/// Price and quantity variances; positive means cost above standard.
pub fn analyze(inputs: &VarianceInputs) -> DomainResult<VarianceAnalysis> {
    money::ensure_non_negative("standard_unit_cost", inputs.standard_unit_cost)?;
    money::ensure_non_negative("actual_unit_cost", inputs.actual_unit_cost)?;
    money::ensure_non_negative("standard_quantity", inputs.standard_quantity)?;
    money::ensure_non_negative("actual_quantity", inputs.actual_quantity)?;
    if inputs.threshold_bps > 10_000 {
        return Err(DomainError::validation("threshold_bps must be at most 10000"));
    }

    let std_price = inputs.standard_unit_cost as i128;
    let act_price = inputs.actual_unit_cost as i128;
    let std_qty = inputs.standard_quantity as i128;
    let act_qty = inputs.actual_quantity as i128;

    let standard_total = std_price * std_qty;
    let actual_total = act_price * act_qty;
    let price_variance = (act_price - std_price) * act_qty;
    let quantity_variance = (act_qty - std_qty) * std_price;
    let total = price_variance + quantity_variance;

    let standard_total = money::narrow(standard_total)?;
    let total_variance = money::narrow(total)?;

    // Both sides fit i128 once narrowed to i64.
    let significant = if standard_total == 0 {
        total_variance != 0
    } else {
        (total_variance as i128).abs() * 10_000
            > inputs.threshold_bps as i128 * standard_total as i128
    };

    Ok(VarianceAnalysis {
        standard_total,
        actual_total: money::narrow(actual_total)?,
        price_variance: money::narrow(price_variance)?,
        quantity_variance: money::narrow(quantity_variance)?,
        total_variance,
        direction: VarianceDirection::of(total_variance),
        significant,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostVariance {
    id: CostVarianceId,
    tenant_id: Option<TenantId>,
    sku: String,
    source: Option<VarianceSource>,
    inputs: Option<VarianceInputs>,
    analysis: Option<VarianceAnalysis>,
    status: VarianceStatus,
    acknowledgement: Option<String>,
    version: u64,
    created: bool,
}

impl CostVariance {
    pub fn empty(id: CostVarianceId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            source: None,
            inputs: None,
            analysis: None,
            status: VarianceStatus::Open,
            acknowledgement: None,
            version: 0,
            created: false,
        }
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn analysis(&self) -> Option<&VarianceAnalysis> {
        self.analysis.as_ref()
    }

    pub fn status(&self) -> VarianceStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVariance {
    pub tenant_id: TenantId,
    pub sku: String,
    pub source: VarianceSource,
    pub inputs: VarianceInputs,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeVariance {
    pub tenant_id: TenantId,
    pub note: String,
    pub acknowledged_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostVarianceCommand {
    Record(RecordVariance),
    Acknowledge(AcknowledgeVariance),
}

ironbooks_events::tenant_command!(CostVarianceCommand { Record, Acknowledge });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceRecorded {
    pub tenant_id: TenantId,
    pub variance_id: CostVarianceId,
    pub sku: String,
    pub source: VarianceSource,
    pub inputs: VarianceInputs,
    pub analysis: VarianceAnalysis,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceAcknowledged {
    pub tenant_id: TenantId,
    pub variance_id: CostVarianceId,
    pub note: String,
    pub acknowledged_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostVarianceEvent {
    Recorded(VarianceRecorded),
    Acknowledged(VarianceAcknowledged),
}

impl Event for CostVarianceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CostVarianceEvent::Recorded(_) => "costing.variance.recorded",
            CostVarianceEvent::Acknowledged(_) => "costing.variance.acknowledged",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CostVarianceEvent::Recorded(e) => e.occurred_at,
            CostVarianceEvent::Acknowledged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CostVariance {
    type Command = CostVarianceCommand;
    type Event = CostVarianceEvent;

    const AGGREGATE_TYPE: &'static str = "costing.variance";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CostVarianceEvent::Recorded(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.source = Some(e.source.clone());
                self.inputs = Some(e.inputs);
                self.analysis = Some(e.analysis);
                self.status = VarianceStatus::Open;
                self.created = true;
            }
            CostVarianceEvent::Acknowledged(e) => {
                self.status = VarianceStatus::Acknowledged;
                self.acknowledgement = Some(e.note.clone());
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            CostVarianceCommand::Record(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("variance already recorded"));
                }
                money::ensure_positive("standard_unit_cost", cmd.inputs.standard_unit_cost)?;
                let analysis = analyze(&cmd.inputs)?;
                let source = VarianceSource {
                    kind: cmd.source.kind,
                    reference: text::required_max("source.reference", &cmd.source.reference, 100)?,
                };
                Ok(vec![CostVarianceEvent::Recorded(VarianceRecorded {
                    tenant_id: cmd.tenant_id,
                    variance_id: self.id,
                    sku: normalize_sku(&cmd.sku)?,
                    source,
                    inputs: cmd.inputs,
                    analysis,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CostVarianceCommand::Acknowledge(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                if self.status == VarianceStatus::Acknowledged {
                    return Err(DomainError::invariant("variance already acknowledged"));
                }
                Ok(vec![CostVarianceEvent::Acknowledged(VarianceAcknowledged {
                    tenant_id: cmd.tenant_id,
                    variance_id: self.id,
                    note: text::required_max("note", &cmd.note, 1000)?,
                    acknowledged_by: cmd.acknowledged_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(std_price: i64, act_price: i64, std_qty: i64, act_qty: i64) -> VarianceInputs {
        VarianceInputs {
            standard_unit_cost: std_price,
            actual_unit_cost: act_price,
            standard_quantity: std_qty,
            actual_quantity: act_qty,
            threshold_bps: DEFAULT_THRESHOLD_BPS,
        }
    }

    #[test]
    fn splits_price_and_quantity_effects() {
        let a = analyze(&inputs(1_000, 1_100, 100, 110)).unwrap();

        assert_eq!(a.price_variance, 11_000);
        assert_eq!(a.quantity_variance, 10_000);
        assert_eq!(a.total_variance, 21_000);
        assert_eq!(a.total_variance, a.actual_total - a.standard_total);
        assert_eq!(a.direction, VarianceDirection::Unfavorable);
        assert!(a.significant);
    }

    #[test]
    fn small_favorable_variance_is_not_significant() {
        // 1% under standard, threshold 5%
        let a = analyze(&inputs(1_000, 990, 100, 100)).unwrap();
        assert_eq!(a.total_variance, -1_000);
        assert_eq!(a.direction, VarianceDirection::Favorable);
        assert!(!a.significant);
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        // exactly 5%
        let a = analyze(&inputs(1_000, 1_050, 100, 100)).unwrap();
        assert!(!a.significant);
    }

    #[test]
    fn zero_standard_total_is_significant_when_nonzero() {
        let a = analyze(&inputs(1_000, 1_000, 0, 3)).unwrap();
        assert!(a.significant);
        let b = analyze(&inputs(1_000, 1_000, 0, 0)).unwrap();
        assert_eq!(b.direction, VarianceDirection::Neutral);
        assert!(!b.significant);
    }

    #[test]
    fn totals_beyond_i64_are_a_validation_error() {
        let huge = 4_000_000_000_000_000_000;
        let err = analyze(&inputs(1, huge, 1, huge)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn large_representable_totals_are_classified() {
        let a = analyze(&inputs(1, 3_000_000_000, 1, 3_000_000_000)).unwrap();
        assert_eq!(a.total_variance, 8_999_999_999_999_999_999);
        assert_eq!(a.direction, VarianceDirection::Unfavorable);
        assert!(a.significant);
    }

    #[test]
    fn acknowledge_once() {
        let tenant_id = TenantId::new();
        let mut variance = CostVariance::empty(CostVarianceId::generate());
        let record = CostVarianceCommand::Record(RecordVariance {
            tenant_id,
            sku: "RESIN-5KG".to_string(),
            source: VarianceSource {
                kind: VarianceSourceKind::Purchase,
                reference: "PO-1001".to_string(),
            },
            inputs: inputs(500, 520, 10, 10),
            occurred_at: Utc::now(),
        });
        for e in variance.handle(&record).unwrap() {
            variance.apply(&e);
        }

        let ack = CostVarianceCommand::Acknowledge(AcknowledgeVariance {
            tenant_id,
            note: "vendor surcharge".to_string(),
            acknowledged_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        for e in variance.handle(&ack).unwrap() {
            variance.apply(&e);
        }
        assert_eq!(variance.status(), VarianceStatus::Acknowledged);
        assert!(variance.handle(&ack).is_err());
    }
}
