//! Nonconformance report (NCR).
//!
//! Open -> UnderInvestigation -> Dispositioned -> Closed, or Cancelled before a
//! disposition is recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money;
use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

use crate::capa::CapaId;

typed_id!(
    /// Nonconformance report identifier.
    NcrId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NcrSource {
    Incoming,
    InProcess,
    Customer,
    Supplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    UseAsIs,
    Rework,
    Scrap,
    ReturnToVendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NcrStatus {
    Open,
    UnderInvestigation,
    Dispositioned,
    Closed,
    Cancelled,
}

impl NcrStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NcrStatus::Closed | NcrStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ncr {
    id: NcrId,
    tenant_id: Option<TenantId>,
    title: String,
    severity: Severity,
    source: NcrSource,
    sku: Option<String>,
    vendor_id: Option<AggregateId>,
    quantity_affected: i64,
    assignee: Option<UserId>,
    disposition: Option<Disposition>,
    linked_capas: Vec<CapaId>,
    status: NcrStatus,
    version: u64,
    created: bool,
}

impl Ncr {
    pub fn empty(id: NcrId) -> Self {
        Self {
            id,
            tenant_id: None,
            title: String::new(),
            severity: Severity::Minor,
            source: NcrSource::Incoming,
            sku: None,
            vendor_id: None,
            quantity_affected: 0,
            assignee: None,
            disposition: None,
            linked_capas: Vec::new(),
            status: NcrStatus::Open,
            version: 0,
            created: false,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn status(&self) -> NcrStatus {
        self.status
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    pub fn linked_capas(&self) -> &[CapaId] {
        &self.linked_capas
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaiseNcr {
    pub tenant_id: TenantId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source: NcrSource,
    pub sku: Option<String>,
    pub vendor_id: Option<AggregateId>,
    pub quantity_affected: i64,
    pub raised_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInvestigation {
    pub tenant_id: TenantId,
    pub assignee: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDisposition {
    pub tenant_id: TenantId,
    pub disposition: Disposition,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseNcr {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelNcr {
    pub tenant_id: TenantId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCapa {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NcrCommand {
    Raise(RaiseNcr),
    StartInvestigation(StartInvestigation),
    RecordDisposition(RecordDisposition),
    Close(CloseNcr),
    Cancel(CancelNcr),
    LinkCapa(LinkCapa),
}

ironbooks_events::tenant_command!(NcrCommand {
    Raise,
    StartInvestigation,
    RecordDisposition,
    Close,
    Cancel,
    LinkCapa,
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcrRaised {
    pub tenant_id: TenantId,
    pub ncr_id: NcrId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source: NcrSource,
    pub sku: Option<String>,
    pub vendor_id: Option<AggregateId>,
    pub quantity_affected: i64,
    pub raised_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationStarted {
    pub tenant_id: TenantId,
    pub ncr_id: NcrId,
    pub assignee: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionRecorded {
    pub tenant_id: TenantId,
    pub ncr_id: NcrId,
    pub disposition: Disposition,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcrClosed {
    pub tenant_id: TenantId,
    pub ncr_id: NcrId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcrCancelled {
    pub tenant_id: TenantId,
    pub ncr_id: NcrId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapaLinked {
    pub tenant_id: TenantId,
    pub ncr_id: NcrId,
    pub capa_id: CapaId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NcrEvent {
    Raised(NcrRaised),
    InvestigationStarted(InvestigationStarted),
    DispositionRecorded(DispositionRecorded),
    Closed(NcrClosed),
    Cancelled(NcrCancelled),
    CapaLinked(CapaLinked),
}

impl Event for NcrEvent {
    fn event_type(&self) -> &'static str {
        match self {
            NcrEvent::Raised(_) => "quality.ncr.raised",
            NcrEvent::InvestigationStarted(_) => "quality.ncr.investigation_started",
            NcrEvent::DispositionRecorded(_) => "quality.ncr.disposition_recorded",
            NcrEvent::Closed(_) => "quality.ncr.closed",
            NcrEvent::Cancelled(_) => "quality.ncr.cancelled",
            NcrEvent::CapaLinked(_) => "quality.ncr.capa_linked",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            NcrEvent::Raised(e) => e.occurred_at,
            NcrEvent::InvestigationStarted(e) => e.occurred_at,
            NcrEvent::DispositionRecorded(e) => e.occurred_at,
            NcrEvent::Closed(e) => e.occurred_at,
            NcrEvent::Cancelled(e) => e.occurred_at,
            NcrEvent::CapaLinked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ncr {
    type Command = NcrCommand;
    type Event = NcrEvent;

    const AGGREGATE_TYPE: &'static str = "quality.ncr";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            NcrEvent::Raised(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.title = e.title.clone();
                self.severity = e.severity;
                self.source = e.source;
                self.sku = e.sku.clone();
                self.vendor_id = e.vendor_id;
                self.quantity_affected = e.quantity_affected;
                self.status = NcrStatus::Open;
                self.created = true;
            }
            NcrEvent::InvestigationStarted(e) => {
                self.assignee = Some(e.assignee);
                self.status = NcrStatus::UnderInvestigation;
            }
            NcrEvent::DispositionRecorded(e) => {
                self.disposition = Some(e.disposition);
                self.status = NcrStatus::Dispositioned;
            }
            NcrEvent::Closed(_) => self.status = NcrStatus::Closed,
            NcrEvent::Cancelled(_) => self.status = NcrStatus::Cancelled,
            NcrEvent::CapaLinked(e) => self.linked_capas.push(e.capa_id),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            NcrCommand::Raise(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("ncr already exists"));
                }
                money::ensure_non_negative("quantity_affected", cmd.quantity_affected)?;
                Ok(vec![NcrEvent::Raised(NcrRaised {
                    tenant_id: cmd.tenant_id,
                    ncr_id: self.id,
                    title: text::required_max("title", &cmd.title, 200)?,
                    description: text::required_max("description", &cmd.description, 4000)?,
                    severity: cmd.severity,
                    source: cmd.source,
                    sku: text::optional(cmd.sku.as_deref()),
                    vendor_id: cmd.vendor_id,
                    quantity_affected: cmd.quantity_affected,
                    raised_by: cmd.raised_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            NcrCommand::StartInvestigation(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[NcrStatus::Open], "investigate")?;
                Ok(vec![NcrEvent::InvestigationStarted(InvestigationStarted {
                    tenant_id: cmd.tenant_id,
                    ncr_id: self.id,
                    assignee: cmd.assignee,
                    occurred_at: cmd.occurred_at,
                })])
            }
            NcrCommand::RecordDisposition(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[NcrStatus::UnderInvestigation], "disposition")?;
                Ok(vec![NcrEvent::DispositionRecorded(DispositionRecorded {
                    tenant_id: cmd.tenant_id,
                    ncr_id: self.id,
                    disposition: cmd.disposition,
                    notes: text::optional(cmd.notes.as_deref()),
                    occurred_at: cmd.occurred_at,
                })])
            }
            NcrCommand::Close(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[NcrStatus::Dispositioned], "close")?;
                if self.severity == Severity::Critical && self.linked_capas.is_empty() {
                    return Err(DomainError::invariant(
                        "critical ncr requires a linked capa before closing",
                    ));
                }
                Ok(vec![NcrEvent::Closed(NcrClosed {
                    tenant_id: cmd.tenant_id,
                    ncr_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            NcrCommand::Cancel(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[NcrStatus::Open, NcrStatus::UnderInvestigation], "cancel")?;
                Ok(vec![NcrEvent::Cancelled(NcrCancelled {
                    tenant_id: cmd.tenant_id,
                    ncr_id: self.id,
                    reason: text::required_max("reason", &cmd.reason, 1000)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            NcrCommand::LinkCapa(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                if self.status.is_terminal() {
                    return Err(DomainError::invariant(format!(
                        "cannot link a capa to an ncr in status {:?}",
                        self.status
                    )));
                }
                if self.linked_capas.contains(&cmd.capa_id) {
                    return Ok(vec![]);
                }
                Ok(vec![NcrEvent::CapaLinked(CapaLinked {
                    tenant_id: cmd.tenant_id,
                    ncr_id: self.id,
                    capa_id: cmd.capa_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Ncr {
    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[NcrStatus], action: &str) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::invariant(format!(
                "cannot {action} an ncr in status {:?}",
                self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ncr: &mut Ncr, cmd: NcrCommand) -> Result<(), DomainError> {
        for e in ncr.handle(&cmd)? {
            ncr.apply(&e);
        }
        Ok(())
    }

    fn raised(tenant_id: TenantId, severity: Severity) -> Ncr {
        let mut ncr = Ncr::empty(NcrId::generate());
        run(
            &mut ncr,
            NcrCommand::Raise(RaiseNcr {
                tenant_id,
                title: "Cracked housings".to_string(),
                description: "12 units cracked on receipt".to_string(),
                severity,
                source: NcrSource::Incoming,
                sku: Some("HOUSING-7".to_string()),
                vendor_id: None,
                quantity_affected: 12,
                raised_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        ncr
    }

    fn investigate_and_dispose(ncr: &mut Ncr, tenant_id: TenantId) {
        run(
            ncr,
            NcrCommand::StartInvestigation(StartInvestigation {
                tenant_id,
                assignee: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        run(
            ncr,
            NcrCommand::RecordDisposition(RecordDisposition {
                tenant_id,
                disposition: Disposition::ReturnToVendor,
                notes: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    fn close(tenant_id: TenantId) -> NcrCommand {
        NcrCommand::Close(CloseNcr {
            tenant_id,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn minor_ncr_closes_after_disposition() {
        let tenant_id = TenantId::new();
        let mut ncr = raised(tenant_id, Severity::Minor);
        investigate_and_dispose(&mut ncr, tenant_id);
        run(&mut ncr, close(tenant_id)).unwrap();
        assert_eq!(ncr.status(), NcrStatus::Closed);
    }

    #[test]
    fn critical_ncr_needs_capa_to_close() {
        let tenant_id = TenantId::new();
        let mut ncr = raised(tenant_id, Severity::Critical);
        investigate_and_dispose(&mut ncr, tenant_id);

        let err = ncr.handle(&close(tenant_id)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let link = NcrCommand::LinkCapa(LinkCapa {
            tenant_id,
            capa_id: CapaId::generate(),
            occurred_at: Utc::now(),
        });
        run(&mut ncr, link.clone()).unwrap();
        assert!(ncr.handle(&link).unwrap().is_empty());
        run(&mut ncr, close(tenant_id)).unwrap();
    }

    #[test]
    fn cannot_skip_investigation() {
        let tenant_id = TenantId::new();
        let ncr = raised(tenant_id, Severity::Major);
        let err = ncr
            .handle(&NcrCommand::RecordDisposition(RecordDisposition {
                tenant_id,
                disposition: Disposition::Scrap,
                notes: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn dispositioned_ncr_cannot_be_cancelled() {
        let tenant_id = TenantId::new();
        let mut ncr = raised(tenant_id, Severity::Minor);
        investigate_and_dispose(&mut ncr, tenant_id);
        let err = ncr
            .handle(&NcrCommand::Cancel(CancelNcr {
                tenant_id,
                reason: "duplicate".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
