//! Corrective and preventive action (CAPA).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

use crate::ncr::NcrId;

typed_id!(
    /// CAPA identifier.
    CapaId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapaKind {
    Corrective,
    Preventive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapaStatus {
    Open,
    InProgress,
    Implemented,
    Verified,
    Closed,
    Cancelled,
}

impl CapaStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CapaStatus::Closed | CapaStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapaAction {
    pub action_no: u32,
    pub description: String,
    pub assignee: UserId,
    pub due_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CapaAction {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub effective: bool,
    pub notes: Option<String>,
    pub verified_by: UserId,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capa {
    id: CapaId,
    tenant_id: Option<TenantId>,
    title: String,
    kind: CapaKind,
    ncr_id: Option<NcrId>,
    owner: Option<UserId>,
    due_date: Option<NaiveDate>,
    root_cause: Option<String>,
    actions: Vec<CapaAction>,
    verifications: Vec<Verification>,
    status: CapaStatus,
    version: u64,
    created: bool,
}

impl Capa {
    pub fn empty(id: CapaId) -> Self {
        Self {
            id,
            tenant_id: None,
            title: String::new(),
            kind: CapaKind::Corrective,
            ncr_id: None,
            owner: None,
            due_date: None,
            root_cause: None,
            actions: Vec::new(),
            verifications: Vec::new(),
            status: CapaStatus::Open,
            version: 0,
            created: false,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn ncr_id(&self) -> Option<NcrId> {
        self.ncr_id
    }

    pub fn root_cause(&self) -> Option<&str> {
        self.root_cause.as_deref()
    }

    pub fn actions(&self) -> &[CapaAction] {
        &self.actions
    }

    pub fn verifications(&self) -> &[Verification] {
        &self.verifications
    }

    pub fn status(&self) -> CapaStatus {
        self.status
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.due_date.is_some_and(|due| due < today)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCapa {
    pub tenant_id: TenantId,
    pub title: String,
    pub kind: CapaKind,
    pub description: String,
    pub ncr_id: Option<NcrId>,
    pub owner: UserId,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRootCause {
    pub tenant_id: TenantId,
    pub root_cause: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAction {
    pub tenant_id: TenantId,
    pub description: String,
    pub assignee: UserId,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteAction {
    pub tenant_id: TenantId,
    pub action_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkImplemented {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyEffectiveness {
    pub tenant_id: TenantId,
    pub effective: bool,
    pub notes: Option<String>,
    pub verified_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCapa {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCapa {
    pub tenant_id: TenantId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapaCommand {
    Open(OpenCapa),
    RecordRootCause(RecordRootCause),
    AddAction(AddAction),
    CompleteAction(CompleteAction),
    MarkImplemented(MarkImplemented),
    VerifyEffectiveness(VerifyEffectiveness),
    Close(CloseCapa),
    Cancel(CancelCapa),
}

ironbooks_events::tenant_command!(CapaCommand {
    Open,
    RecordRootCause,
    AddAction,
    CompleteAction,
    MarkImplemented,
    VerifyEffectiveness,
    Close,
    Cancel,
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapaOpened {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub title: String,
    pub kind: CapaKind,
    pub description: String,
    pub ncr_id: Option<NcrId>,
    pub owner: UserId,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCauseRecorded {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub root_cause: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAdded {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub action: CapaAction,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCompleted {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub action_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapaImplemented {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivenessVerified {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub effective: bool,
    pub notes: Option<String>,
    pub verified_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapaClosed {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapaCancelled {
    pub tenant_id: TenantId,
    pub capa_id: CapaId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapaEvent {
    Opened(CapaOpened),
    RootCauseRecorded(RootCauseRecorded),
    ActionAdded(ActionAdded),
    ActionCompleted(ActionCompleted),
    Implemented(CapaImplemented),
    EffectivenessVerified(EffectivenessVerified),
    Closed(CapaClosed),
    Cancelled(CapaCancelled),
}

impl Event for CapaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CapaEvent::Opened(_) => "quality.capa.opened",
            CapaEvent::RootCauseRecorded(_) => "quality.capa.root_cause_recorded",
            CapaEvent::ActionAdded(_) => "quality.capa.action_added",
            CapaEvent::ActionCompleted(_) => "quality.capa.action_completed",
            CapaEvent::Implemented(_) => "quality.capa.implemented",
            CapaEvent::EffectivenessVerified(_) => "quality.capa.effectiveness_verified",
            CapaEvent::Closed(_) => "quality.capa.closed",
            CapaEvent::Cancelled(_) => "quality.capa.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CapaEvent::Opened(e) => e.occurred_at,
            CapaEvent::RootCauseRecorded(e) => e.occurred_at,
            CapaEvent::ActionAdded(e) => e.occurred_at,
            CapaEvent::ActionCompleted(e) => e.occurred_at,
            CapaEvent::Implemented(e) => e.occurred_at,
            CapaEvent::EffectivenessVerified(e) => e.occurred_at,
            CapaEvent::Closed(e) => e.occurred_at,
            CapaEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Capa {
    type Command = CapaCommand;
    type Event = CapaEvent;

    const AGGREGATE_TYPE: &'static str = "quality.capa";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CapaEvent::Opened(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.title = e.title.clone();
                self.kind = e.kind;
                self.ncr_id = e.ncr_id;
                self.owner = Some(e.owner);
                self.due_date = Some(e.due_date);
                self.status = CapaStatus::Open;
                self.created = true;
            }
            CapaEvent::RootCauseRecorded(e) => self.root_cause = Some(e.root_cause.clone()),
            CapaEvent::ActionAdded(e) => {
                self.actions.push(e.action.clone());
                if self.status == CapaStatus::Open {
                    self.status = CapaStatus::InProgress;
                }
            }
            CapaEvent::ActionCompleted(e) => {
                if let Some(action) = self.actions.iter_mut().find(|a| a.action_no == e.action_no) {
                    action.completed_at = Some(e.occurred_at);
                }
            }
            CapaEvent::Implemented(_) => self.status = CapaStatus::Implemented,
            CapaEvent::EffectivenessVerified(e) => {
                self.verifications.push(Verification {
                    effective: e.effective,
                    notes: e.notes.clone(),
                    verified_by: e.verified_by,
                    verified_at: e.occurred_at,
                });
                self.status = if e.effective {
                    CapaStatus::Verified
                } else {
                    CapaStatus::InProgress
                };
            }
            CapaEvent::Closed(_) => self.status = CapaStatus::Closed,
            CapaEvent::Cancelled(_) => self.status = CapaStatus::Cancelled,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            CapaCommand::Open(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("capa already exists"));
                }
                Ok(vec![CapaEvent::Opened(CapaOpened {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    title: text::required_max("title", &cmd.title, 200)?,
                    kind: cmd.kind,
                    description: text::required_max("description", &cmd.description, 4000)?,
                    ncr_id: cmd.ncr_id,
                    owner: cmd.owner,
                    due_date: cmd.due_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CapaCommand::RecordRootCause(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(
                    &[CapaStatus::Open, CapaStatus::InProgress],
                    "record a root cause on",
                )?;
                Ok(vec![CapaEvent::RootCauseRecorded(RootCauseRecorded {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    root_cause: text::required_max("root_cause", &cmd.root_cause, 4000)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CapaCommand::AddAction(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(
                    &[CapaStatus::Open, CapaStatus::InProgress],
                    "add an action to",
                )?;
                Ok(vec![CapaEvent::ActionAdded(ActionAdded {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    action: CapaAction {
                        action_no: self.actions.len() as u32 + 1,
                        description: text::required_max("description", &cmd.description, 1000)?,
                        assignee: cmd.assignee,
                        due_date: cmd.due_date,
                        completed_at: None,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            CapaCommand::CompleteAction(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[CapaStatus::InProgress], "complete an action on")?;
                let action = self
                    .actions
                    .iter()
                    .find(|a| a.action_no == cmd.action_no)
                    .ok_or_else(|| {
                        DomainError::validation(format!("unknown action {}", cmd.action_no))
                    })?;
                if action.is_complete() {
                    return Ok(vec![]);
                }
                Ok(vec![CapaEvent::ActionCompleted(ActionCompleted {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    action_no: cmd.action_no,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CapaCommand::MarkImplemented(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[CapaStatus::InProgress], "implement")?;
                if self.root_cause.is_none() {
                    return Err(DomainError::invariant("root cause must be recorded first"));
                }
                if self.actions.is_empty() {
                    return Err(DomainError::invariant("capa has no actions"));
                }
                if self.actions.iter().any(|a| !a.is_complete()) {
                    return Err(DomainError::invariant("all actions must be complete"));
                }
                Ok(vec![CapaEvent::Implemented(CapaImplemented {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CapaCommand::VerifyEffectiveness(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[CapaStatus::Implemented], "verify")?;
                Ok(vec![CapaEvent::EffectivenessVerified(EffectivenessVerified {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    effective: cmd.effective,
                    notes: text::optional(cmd.notes.as_deref()),
                    verified_by: cmd.verified_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CapaCommand::Close(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                self.ensure_status(&[CapaStatus::Verified], "close")?;
                Ok(vec![CapaEvent::Closed(CapaClosed {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CapaCommand::Cancel(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                if self.status.is_terminal() {
                    return Err(DomainError::invariant(format!(
                        "cannot cancel a capa in status {:?}",
                        self.status
                    )));
                }
                Ok(vec![CapaEvent::Cancelled(CapaCancelled {
                    tenant_id: cmd.tenant_id,
                    capa_id: self.id,
                    reason: text::required_max("reason", &cmd.reason, 1000)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Capa {
    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[CapaStatus], action: &str) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::invariant(format!(
                "cannot {action} a capa in status {:?}",
                self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(capa: &mut Capa, cmd: CapaCommand) -> Result<(), DomainError> {
        for e in capa.handle(&cmd)? {
            capa.apply(&e);
        }
        Ok(())
    }

    fn opened(tenant_id: TenantId) -> Capa {
        let mut capa = Capa::empty(CapaId::generate());
        run(
            &mut capa,
            CapaCommand::Open(OpenCapa {
                tenant_id,
                title: "Supplier packaging".to_string(),
                kind: CapaKind::Corrective,
                description: "Housings cracked in transit".to_string(),
                ncr_id: Some(NcrId::generate()),
                owner: UserId::new(),
                due_date: date(2026, 9, 30),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        capa
    }

    fn add_action(capa: &mut Capa, tenant_id: TenantId) {
        run(
            capa,
            CapaCommand::AddAction(AddAction {
                tenant_id,
                description: "Require foam inserts".to_string(),
                assignee: UserId::new(),
                due_date: date(2026, 9, 1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    fn implement(tenant_id: TenantId) -> CapaCommand {
        CapaCommand::MarkImplemented(MarkImplemented {
            tenant_id,
            occurred_at: Utc::now(),
        })
    }

    fn verify(tenant_id: TenantId, effective: bool) -> CapaCommand {
        CapaCommand::VerifyEffectiveness(VerifyEffectiveness {
            tenant_id,
            effective,
            notes: None,
            verified_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn ready_to_implement(tenant_id: TenantId) -> Capa {
        let mut capa = opened(tenant_id);
        run(
            &mut capa,
            CapaCommand::RecordRootCause(RecordRootCause {
                tenant_id,
                root_cause: "No protective packaging".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        add_action(&mut capa, tenant_id);
        run(
            &mut capa,
            CapaCommand::CompleteAction(CompleteAction {
                tenant_id,
                action_no: 1,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        capa
    }

    #[test]
    fn adding_an_action_starts_work() {
        let tenant_id = TenantId::new();
        let mut capa = opened(tenant_id);
        add_action(&mut capa, tenant_id);
        assert_eq!(capa.status(), CapaStatus::InProgress);
        assert_eq!(capa.actions()[0].action_no, 1);
    }

    #[test]
    fn implementation_requires_root_cause_and_completed_actions() {
        let tenant_id = TenantId::new();
        let mut capa = opened(tenant_id);
        add_action(&mut capa, tenant_id);

        let err = capa.handle(&implement(tenant_id)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let mut ready = ready_to_implement(tenant_id);
        run(&mut ready, implement(tenant_id)).unwrap();
        assert_eq!(ready.status(), CapaStatus::Implemented);
    }

    #[test]
    fn ineffective_verification_reopens_work() {
        let tenant_id = TenantId::new();
        let mut capa = ready_to_implement(tenant_id);
        run(&mut capa, implement(tenant_id)).unwrap();
        run(&mut capa, verify(tenant_id, false)).unwrap();
        assert_eq!(capa.status(), CapaStatus::InProgress);

        run(&mut capa, implement(tenant_id)).unwrap();
        run(&mut capa, verify(tenant_id, true)).unwrap();
        run(
            &mut capa,
            CapaCommand::Close(CloseCapa {
                tenant_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(capa.status(), CapaStatus::Closed);
        assert_eq!(capa.verifications().len(), 2);
    }

    #[test]
    fn overdue_only_while_active() {
        let tenant_id = TenantId::new();
        let mut capa = opened(tenant_id);
        assert!(capa.is_overdue(date(2026, 10, 1)));
        assert!(!capa.is_overdue(date(2026, 9, 30)));

        run(
            &mut capa,
            CapaCommand::Cancel(CancelCapa {
                tenant_id,
                reason: "merged into another capa".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!capa.is_overdue(date(2026, 10, 1)));
    }
}
