//! Inventory costing: standard costs, revaluations, cost variances and landed costs.
//!
//! Everything here is plain arithmetic over records. There is no cost layering.

pub mod apportion;
pub mod landed_cost;
pub mod revaluation;
pub mod sku;
pub mod standard_cost;
pub mod variance;

pub use apportion::apportion;
pub use landed_cost::{
    AllocationMethod, ChargeInput, ChargeKind, LandedCharge, LandedCost, LandedCostCommand,
    LandedCostEvent, LandedCostId, LandedCostLine, LandedCostLineInput, LandedCostStatus,
    LineAllocation,
};
pub use revaluation::{
    Revaluation, RevaluationCommand, RevaluationEvent, RevaluationId, RevaluationPreview,
    RevaluationStatus,
};
pub use standard_cost::{
    CostHistoryEntry, StandardCost, StandardCostCommand, StandardCostEvent, StandardCostId,
};
pub use variance::{
    CostVariance, CostVarianceCommand, CostVarianceEvent, CostVarianceId, VarianceAnalysis,
    VarianceDirection, VarianceInputs, VarianceSource, VarianceSourceKind, VarianceStatus,
    analyze,
};
