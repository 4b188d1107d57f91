//! Per-SKU demand forecast from monthly actuals.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money;
use ironbooks_core::{Aggregate, AggregateId, DomainError, DomainResult, TenantId, text, typed_id};
use ironbooks_events::Event;

use crate::period::YearMonth;

typed_id!(
    /// Forecast identifier.
    ForecastId
);

pub const MAX_WINDOW: u32 = 12;
pub const MAX_HORIZON: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForecastMethod {
    MovingAverage { window: u32 },
    ExponentialSmoothing { alpha_bps: u32 },
}

impl ForecastMethod {
    fn validate(&self) -> DomainResult<()> {
        match *self {
            ForecastMethod::MovingAverage { window } if !(1..=MAX_WINDOW).contains(&window) => {
                Err(DomainError::validation(format!(
                    "window must be between 1 and {MAX_WINDOW}"
                )))
            }
            ForecastMethod::ExponentialSmoothing { alpha_bps }
                if !(1..=10_000).contains(&alpha_bps) =>
            {
                Err(DomainError::validation("alpha_bps must be between 1 and 10000"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: YearMonth,
    pub quantity: i64,
}

/// Flat projection level from chronologically ordered actuals.
pub fn project(method: ForecastMethod, actuals: &[i64]) -> DomainResult<i64> {
    let Some(first) = actuals.first() else {
        return Err(DomainError::invariant("no actuals recorded"));
    };
    match method {
        ForecastMethod::MovingAverage { window } => {
            let window = window as usize;
            if actuals.len() < window {
                return Err(DomainError::invariant(format!(
                    "moving average needs {window} actuals, have {}",
                    actuals.len()
                )));
            }
            let sum: i128 = actuals[actuals.len() - window..]
                .iter()
                .map(|v| *v as i128)
                .sum();
            money::div_round_half_up(sum, window as i128)
        }
        ForecastMethod::ExponentialSmoothing { alpha_bps } => {
            let alpha = alpha_bps as i128;
            let mut level = *first;
            for actual in &actuals[1..] {
                let weighted = alpha * (*actual as i128) + (10_000 - alpha) * (level as i128);
                level = money::div_round_half_up(weighted, 10_000)?;
            }
            Ok(level)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forecast {
    id: ForecastId,
    tenant_id: Option<TenantId>,
    sku: String,
    method: ForecastMethod,
    horizon: u32,
    actuals: BTreeMap<YearMonth, i64>,
    projections: Vec<ForecastPoint>,
    generated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Forecast {
    pub fn empty(id: ForecastId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            method: ForecastMethod::MovingAverage { window: 3 },
            horizon: 0,
            actuals: BTreeMap::new(),
            projections: Vec::new(),
            generated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn method(&self) -> ForecastMethod {
        self.method
    }

    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    pub fn actuals(&self) -> &BTreeMap<YearMonth, i64> {
        &self.actuals
    }

    pub fn projections(&self) -> &[ForecastPoint] {
        &self.projections
    }

    fn compute_projections(&self) -> DomainResult<Vec<ForecastPoint>> {
        let Some(last) = self.actuals.keys().next_back().copied() else {
            return Err(DomainError::invariant("no actuals recorded"));
        };
        let values: Vec<i64> = self.actuals.values().copied().collect();
        let quantity = project(self.method, &values)?;

        let mut period = last;
        Ok((0..self.horizon)
            .map(|_| {
                period = period.next();
                ForecastPoint { period, quantity }
            })
            .collect())
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
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateForecast {
    pub tenant_id: TenantId,
    pub sku: String,
    pub method: ForecastMethod,
    pub horizon: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActual {
    pub tenant_id: TenantId,
    pub period: YearMonth,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateForecast {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastCommand {
    Create(CreateForecast),
    RecordActual(RecordActual),
    Generate(GenerateForecast),
}

ironbooks_events::tenant_command!(ForecastCommand { Create, RecordActual, Generate });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastCreated {
    pub tenant_id: TenantId,
    pub forecast_id: ForecastId,
    pub sku: String,
    pub method: ForecastMethod,
    pub horizon: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualRecorded {
    pub tenant_id: TenantId,
    pub forecast_id: ForecastId,
    pub period: YearMonth,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastGenerated {
    pub tenant_id: TenantId,
    pub forecast_id: ForecastId,
    pub projections: Vec<ForecastPoint>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastEvent {
    Created(ForecastCreated),
    ActualRecorded(ActualRecorded),
    Generated(ForecastGenerated),
}

impl Event for ForecastEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ForecastEvent::Created(_) => "planning.forecast.created",
            ForecastEvent::ActualRecorded(_) => "planning.forecast.actual_recorded",
            ForecastEvent::Generated(_) => "planning.forecast.generated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ForecastEvent::Created(e) => e.occurred_at,
            ForecastEvent::ActualRecorded(e) => e.occurred_at,
            ForecastEvent::Generated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Forecast {
    type Command = ForecastCommand;
    type Event = ForecastEvent;

    const AGGREGATE_TYPE: &'static str = "planning.forecast";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ForecastEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.method = e.method;
                self.horizon = e.horizon;
                self.created = true;
            }
            ForecastEvent::ActualRecorded(e) => {
                self.actuals.insert(e.period, e.quantity);
            }
            ForecastEvent::Generated(e) => {
                self.projections = e.projections.clone();
                self.generated_at = Some(e.occurred_at);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            ForecastCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("forecast already exists"));
                }
                cmd.method.validate()?;
                if !(1..=MAX_HORIZON).contains(&cmd.horizon) {
                    return Err(DomainError::validation(format!(
                        "horizon must be between 1 and {MAX_HORIZON}"
                    )));
                }
                let sku = text::required_max("sku", &cmd.sku, 64)?;
                Ok(vec![ForecastEvent::Created(ForecastCreated {
                    tenant_id: cmd.tenant_id,
                    forecast_id: self.id,
                    sku,
                    method: cmd.method,
                    horizon: cmd.horizon,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ForecastCommand::RecordActual(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                money::ensure_non_negative("quantity", cmd.quantity)?;
                if self.actuals.get(&cmd.period) == Some(&cmd.quantity) {
                    return Ok(vec![]);
                }
                Ok(vec![ForecastEvent::ActualRecorded(ActualRecorded {
                    tenant_id: cmd.tenant_id,
                    forecast_id: self.id,
                    period: cmd.period,
                    quantity: cmd.quantity,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ForecastCommand::Generate(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                Ok(vec![ForecastEvent::Generated(ForecastGenerated {
                    tenant_id: cmd.tenant_id,
                    forecast_id: self.id,
                    projections: self.compute_projections()?,
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

    fn run(f: &mut Forecast, cmd: ForecastCommand) -> Result<(), DomainError> {
        for e in f.handle(&cmd)? {
            f.apply(&e);
        }
        Ok(())
    }

    fn created(tenant_id: TenantId, method: ForecastMethod, horizon: u32) -> Forecast {
        let mut f = Forecast::empty(ForecastId::generate());
        run(
            &mut f,
            ForecastCommand::Create(CreateForecast {
                tenant_id,
                sku: "GASKET-40".to_string(),
                method,
                horizon,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        f
    }

    fn actual(tenant_id: TenantId, period: &str, quantity: i64) -> ForecastCommand {
        ForecastCommand::RecordActual(RecordActual {
            tenant_id,
            period: period.parse().unwrap(),
            quantity,
            occurred_at: Utc::now(),
        })
    }

    fn generate(tenant_id: TenantId) -> ForecastCommand {
        ForecastCommand::Generate(GenerateForecast {
            tenant_id,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn moving_average_projects_after_last_actual() {
        let tenant_id = TenantId::new();
        let mut f = created(tenant_id, ForecastMethod::MovingAverage { window: 3 }, 2);
        let actuals = [("2026-01", 90), ("2026-03", 110), ("2026-02", 100), ("2026-04", 121)];
        for (period, qty) in actuals {
            run(&mut f, actual(tenant_id, period, qty)).unwrap();
        }
        run(&mut f, generate(tenant_id)).unwrap();

        // mean of 100, 110, 121 = 110.33
        let points = f.projections();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].period.to_string(), "2026-05");
        assert_eq!(points[1].period.to_string(), "2026-06");
        assert!(points.iter().all(|p| p.quantity == 110));
    }

    #[test]
    fn recording_a_period_again_replaces_it() {
        let tenant_id = TenantId::new();
        let mut f = created(tenant_id, ForecastMethod::MovingAverage { window: 1 }, 1);
        run(&mut f, actual(tenant_id, "2026-01", 10)).unwrap();
        run(&mut f, actual(tenant_id, "2026-01", 25)).unwrap();
        assert_eq!(f.actuals().len(), 1);
        run(&mut f, generate(tenant_id)).unwrap();
        assert_eq!(f.projections()[0].quantity, 25);
    }

    #[test]
    fn generate_without_enough_actuals_fails() {
        let tenant_id = TenantId::new();
        let mut f = created(tenant_id, ForecastMethod::MovingAverage { window: 3 }, 1);
        assert!(matches!(
            f.handle(&generate(tenant_id)).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
        run(&mut f, actual(tenant_id, "2026-01", 10)).unwrap();
        assert!(f.handle(&generate(tenant_id)).is_err());
    }

    #[test]
    fn exponential_smoothing_levels() {
        // alpha 0.5: 100 -> 150 (200) -> 125 (100)
        let half = ForecastMethod::ExponentialSmoothing { alpha_bps: 5_000 };
        assert_eq!(project(half, &[100, 200, 100]).unwrap(), 125);
        let full = ForecastMethod::ExponentialSmoothing { alpha_bps: 10_000 };
        assert_eq!(project(full, &[5, 9, 7]).unwrap(), 7);
    }

    #[test]
    fn parameters_are_bounded() {
        assert!(ForecastMethod::MovingAverage { window: 13 }.validate().is_err());
        assert!(ForecastMethod::ExponentialSmoothing { alpha_bps: 0 }.validate().is_err());
        let f = Forecast::empty(ForecastId::generate());
        let err = f
            .handle(&ForecastCommand::Create(CreateForecast {
                tenant_id: TenantId::new(),
                sku: "X".to_string(),
                method: ForecastMethod::MovingAverage { window: 2 },
                horizon: 25,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #[test]
        fn projection_stays_within_actual_range(
            actuals in proptest::collection::vec(0i64..1_000_000, 1..24),
            alpha in 1u32..=10_000,
        ) {
            let min = *actuals.iter().min().unwrap();
            let max = *actuals.iter().max().unwrap();
            let smoothing = ForecastMethod::ExponentialSmoothing { alpha_bps: alpha };
            let level = project(smoothing, &actuals).unwrap();
            prop_assert!(level >= min && level <= max);

            let window = actuals.len().min(12) as u32;
            let avg = project(ForecastMethod::MovingAverage { window }, &actuals).unwrap();
            prop_assert!(avg >= min && avg <= max);
        }
    }
}
