//! Request bodies, path/query parameters and small response shapes.
//!
//! Read responses serialize the infra read-model views directly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use ironbooks_core::{AggregateId, DomainError, UserId};
use ironbooks_costing::{
    AllocationMethod, ChargeInput, LandedCostLineInput, VarianceDirection, VarianceSource,
};
use ironbooks_infra::event_store::StoredEvent;
use ironbooks_payables::{BillItemInput, BillStatus, Contact, PaymentMethod, PaymentTerms, TaxLineInput};
use ironbooks_planning::{DiscountKind, ForecastMethod, YearMonth};
use ironbooks_quality::{CapaKind, Disposition, NcrSource, Severity};
use ironbooks_reporting::{Metric, Position, WidgetKind};

use crate::app::errors::ApiError;

// -------------------------
// Path parameters
// -------------------------

#[derive(Debug, Deserialize)]
pub struct IdPath {
    pub id: String,
}

/// `{id}` plus a numbered child (widget or CAPA action).
#[derive(Debug, Deserialize)]
pub struct ChildPath {
    pub id: String,
    pub no: String,
}

#[derive(Debug, Deserialize)]
pub struct EntryPath {
    pub entry_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryPath {
    pub aggregate_id: String,
}

/// Parse a typed aggregate id; anything malformed is `400 invalid_id`.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidId(format!("invalid {what} id '{raw}'")))
}

pub fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::InvalidId(format!("invalid {what} id '{raw}'")))
}

pub fn parse_number(raw: &str, what: &str) -> Result<u32, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidId(format!("invalid {what} number '{raw}'")))
}

// -------------------------
// Responses
// -------------------------

/// Result of a write: the aggregate touched and how many events it produced.
#[derive(Debug, Serialize)]
pub struct Committed {
    pub id: String,
    pub events_committed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_entry_id: Option<Uuid>,
}

impl Committed {
    pub fn new(id: impl Into<AggregateId>, events: &[StoredEvent]) -> Self {
        Self {
            id: id.into().to_string(),
            events_committed: events.len(),
            version: events.last().map(|e| e.sequence_number),
            journal_entry_id: None,
        }
    }

    pub fn with_journal(mut self, entry_id: Option<Uuid>) -> Self {
        self.journal_entry_id = entry_id;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub event_id: Uuid,
    pub sequence_number: u64,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub payload: JsonValue,
}

impl From<StoredEvent> for HistoryEntry {
    fn from(e: StoredEvent) -> Self {
        Self {
            event_id: e.event_id,
            sequence_number: e.sequence_number,
            aggregate_type: e.aggregate_type,
            event_type: e.event_type,
            event_version: e.event_version,
            occurred_at: e.occurred_at,
            payload: e.payload,
        }
    }
}

// -------------------------
// Organizations
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub slug: String,
    pub name: String,
    pub base_currency: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequiredReasonRequest {
    pub reason: String,
}

// -------------------------
// Payables
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterVendorRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub contact: Contact,
    pub default_terms: Option<PaymentTerms>,
    /// Defaults to the organization's base currency.
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVendorRequest {
    pub name: Option<String>,
    pub contact: Option<Contact>,
    pub default_terms: Option<PaymentTerms>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    pub vendor_id: String,
    pub bill_number: String,
    pub bill_date: NaiveDate,
    /// Defaults to the vendor's terms.
    pub terms: Option<PaymentTerms>,
    /// Defaults to the vendor's currency.
    pub currency: Option<String>,
    pub items: Vec<BillItemInput>,
    #[serde(default)]
    pub tax_lines: Vec<TaxLineInput>,
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviseBillRequest {
    pub bill_date: NaiveDate,
    pub terms: PaymentTerms,
    pub items: Vec<BillItemInput>,
    #[serde(default)]
    pub tax_lines: Vec<TaxLineInput>,
    pub memo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BillListQuery {
    pub vendor_id: Option<String>,
    pub status: Option<BillStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AllocationRequest {
    pub bill_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub vendor_id: String,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub amount: i64,
    /// Defaults to the vendor's currency.
    pub currency: Option<String>,
    #[serde(default)]
    pub allocations: Vec<AllocationRequest>,
}

// -------------------------
// Ledger
// -------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Debit,
    Credit,
}

#[derive(Debug, Deserialize)]
pub struct ManualJournalLine {
    pub account_code: String,
    pub side: Side,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct ManualJournalRequest {
    pub description: String,
    pub lines: Vec<ManualJournalLine>,
}

// -------------------------
// Costing
// -------------------------

#[derive(Debug, Deserialize)]
pub struct EstablishStandardCostRequest {
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub unit_cost: i64,
    pub effective_from: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDescriptionRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct DraftRevaluationRequest {
    pub standard_cost_id: String,
    pub new_unit_cost: i64,
    pub on_hand_quantity: i64,
    pub effective_date: NaiveDate,
    pub reason: String,
    pub inventory_account: Option<String>,
    pub adjustment_account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordVarianceRequest {
    pub sku: String,
    pub source: VarianceSource,
    /// Looked up from the SKU's standard cost when omitted.
    pub standard_unit_cost: Option<i64>,
    pub actual_unit_cost: i64,
    pub standard_quantity: i64,
    pub actual_quantity: i64,
    pub threshold_bps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VarianceListQuery {
    pub direction: Option<VarianceDirection>,
    pub significant: Option<bool>,
    pub sku: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeVarianceRequest {
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateLandedCostRequest {
    pub reference: String,
    pub method: AllocationMethod,
    pub lines: Vec<LandedCostLineInput>,
    #[serde(default)]
    pub charges: Vec<ChargeInput>,
}

// -------------------------
// Quality
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RaiseNcrRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub source: NcrSource,
    pub sku: Option<String>,
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub quantity_affected: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvestigateRequest {
    /// Defaults to the caller.
    pub assignee: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct DispositionRequest {
    pub disposition: Disposition,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenCapaRequest {
    pub title: String,
    pub kind: CapaKind,
    #[serde(default)]
    pub description: String,
    pub ncr_id: Option<String>,
    /// Defaults to the caller.
    pub owner: Option<UserId>,
    pub due_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RootCauseRequest {
    pub root_cause: String,
}

#[derive(Debug, Deserialize)]
pub struct AddActionRequest {
    pub description: String,
    pub assignee: Option<UserId>,
    pub due_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub effective: bool,
    pub notes: Option<String>,
}

// -------------------------
// Reporting & planning
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateDashboardRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddWidgetRequest {
    pub title: String,
    pub kind: WidgetKind,
    pub metric: Metric,
    pub position: Position,
}

#[derive(Debug, Serialize)]
pub struct WidgetData {
    pub widget_no: u32,
    pub title: String,
    pub kind: WidgetKind,
    pub metric: Metric,
    pub unit: ironbooks_reporting::MetricUnit,
    pub value: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub dashboard_id: String,
    pub as_of: NaiveDate,
    pub widgets: Vec<WidgetData>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscountRequest {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub kind: DiscountKind,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    #[serde(default)]
    pub min_purchase: i64,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub amount: i64,
    pub on: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct Quote {
    pub discount_id: String,
    pub code: String,
    pub amount: i64,
    pub on: NaiveDate,
    pub discount: i64,
    pub net: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateForecastRequest {
    pub sku: String,
    pub method: ForecastMethod,
    pub horizon: u32,
}

#[derive(Debug, Deserialize)]
pub struct RecordActualRequest {
    pub period: YearMonth,
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use ironbooks_payables::BillId;

    use super::*;

    #[test]
    fn malformed_ids_are_invalid_id() {
        let err = parse_id::<BillId>("not-a-uuid", "bill").unwrap_err();
        assert!(matches!(err, ApiError::InvalidId(_)));
        assert!(parse_id::<BillId>(&BillId::generate().to_string(), "bill").is_ok());
        assert!(matches!(parse_number("x", "widget"), Err(ApiError::InvalidId(_))));
    }

    #[test]
    fn bill_request_accepts_minimal_body() {
        let body: CreateBillRequest = serde_json::from_value(serde_json::json!({
            "vendor_id": AggregateId::new().to_string(),
            "bill_number": "INV-7",
            "bill_date": "2026-03-01",
            "items": [{ "description": "Bolts", "quantity": 10, "unit_price": 25 }],
        }))
        .unwrap();
        assert!(body.terms.is_none());
        assert!(body.tax_lines.is_empty());
        assert_eq!(body.items[0].account_code, None);
    }
}
