use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, typed_id};
use ironbooks_events::Event;

use crate::chart::Account;
use crate::posting::ensure_balanced;

typed_id!(
    /// General ledger stream id. There is one ledger per tenant.
    LedgerId
);

impl LedgerId {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::singleton_for(tenant_id, "general-ledger"))
    }
}

/// One side of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account: Account,
    /// Positive amount in minor units.
    pub amount: i64,
    pub is_debit: bool,
}

impl JournalEntryLine {
    pub fn debit(account: Account, amount: i64) -> Self {
        Self {
            account,
            amount,
            is_debit: true,
        }
    }

    pub fn credit(account: Account, amount: i64) -> Self {
        Self {
            account,
            amount,
            is_debit: false,
        }
    }

    fn mirrored(&self) -> Self {
        Self {
            account: self.account.clone(),
            amount: self.amount,
            is_debit: !self.is_debit,
        }
    }
}

/// Business document that caused a posting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostingSource {
    /// e.g. `"bill"`, `"payment"`, `"revaluation"`.
    pub document_type: String,
    pub document_id: AggregateId,
}

impl PostingSource {
    pub fn new(document_type: impl Into<String>, document_id: AggregateId) -> Self {
        Self {
            document_type: document_type.into(),
            document_id,
        }
    }
}

/// The ledger keeps posted lines only so that reversals can mirror them.
/// Balances are derived by projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    entries: HashMap<Uuid, Vec<JournalEntryLine>>,
    /// Entry ids per source document, in posting order.
    by_document: HashMap<AggregateId, Vec<Uuid>>,
    reversed: HashSet<Uuid>,
    version: u64,
}

impl Ledger {
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            entries: HashMap::new(),
            by_document: HashMap::new(),
            reversed: HashSet::new(),
            version: 0,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_reversed(&self, entry_id: Uuid) -> bool {
        self.reversed.contains(&entry_id)
    }

    /// Entries posted for `document_id` that have not been reversed yet.
    pub fn unreversed_entries_for(&self, document_id: AggregateId) -> Vec<Uuid> {
        self.by_document
            .get(&document_id)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| !self.reversed.contains(id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub tenant_id: TenantId,
    pub entry_id: Uuid,
    pub lines: Vec<JournalEntryLine>,
    pub description: Option<String>,
    pub source: Option<PostingSource>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseJournalEntry {
    pub tenant_id: TenantId,
    pub entry_id: Uuid,
    pub reversal_id: Uuid,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    PostJournalEntry(PostJournalEntry),
    ReverseJournalEntry(ReverseJournalEntry),
}

ironbooks_events::tenant_command!(LedgerCommand { PostJournalEntry, ReverseJournalEntry });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: Uuid,
    pub lines: Vec<JournalEntryLine>,
    pub description: Option<String>,
    pub source: Option<PostingSource>,
    pub occurred_at: DateTime<Utc>,
}

/// Emitted together with the mirrored `JournalEntryPosted` of the reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryReversed {
    pub tenant_id: TenantId,
    pub entry_id: Uuid,
    pub reversal_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    JournalEntryPosted(JournalEntryPosted),
    JournalEntryReversed(JournalEntryReversed),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
            LedgerEvent::JournalEntryReversed(_) => "accounting.ledger.journal_entry_reversed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::JournalEntryPosted(e) => e.occurred_at,
            LedgerEvent::JournalEntryReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;

    const AGGREGATE_TYPE: &'static str = "accounting.ledger";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::JournalEntryPosted(e) => {
                self.tenant_id.get_or_insert(e.tenant_id);
                self.entries.insert(e.entry_id, e.lines.clone());
                if let Some(source) = &e.source {
                    self.by_document
                        .entry(source.document_id)
                        .or_default()
                        .push(e.entry_id);
                }
            }
            LedgerEvent::JournalEntryReversed(e) => {
                self.reversed.insert(e.entry_id);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            LedgerCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
            LedgerCommand::ReverseJournalEntry(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl Ledger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(DomainError::invariant("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if self.entries.contains_key(&cmd.entry_id) {
            return Err(DomainError::conflict(format!(
                "journal entry {} already posted",
                cmd.entry_id
            )));
        }
        ensure_balanced(&cmd.lines)?;

        Ok(vec![LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: self.id,
            entry_id: cmd.entry_id,
            lines: cmd.lines.clone(),
            description: cmd.description.clone(),
            source: cmd.source.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        let Some(lines) = self.entries.get(&cmd.entry_id) else {
            return Err(DomainError::not_found());
        };
        if self.reversed.contains(&cmd.entry_id) {
            return Err(DomainError::invariant("journal entry is already reversed"));
        }
        if self.entries.contains_key(&cmd.reversal_id) {
            return Err(DomainError::conflict("reversal id already used"));
        }

        let description = match &cmd.reason {
            Some(reason) => format!("Reversal of {}: {reason}", cmd.entry_id),
            None => format!("Reversal of {}", cmd.entry_id),
        };

        Ok(vec![
            LedgerEvent::JournalEntryPosted(JournalEntryPosted {
                tenant_id: cmd.tenant_id,
                ledger_id: self.id,
                entry_id: cmd.reversal_id,
                lines: lines.iter().map(JournalEntryLine::mirrored).collect(),
                description: Some(description),
                source: None,
                occurred_at: cmd.occurred_at,
            }),
            LedgerEvent::JournalEntryReversed(JournalEntryReversed {
                tenant_id: cmd.tenant_id,
                entry_id: cmd.entry_id,
                reversal_id: cmd.reversal_id,
                occurred_at: cmd.occurred_at,
            }),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{self, account};
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn balanced(amount: i64) -> Vec<JournalEntryLine> {
        vec![
            JournalEntryLine::debit(account(chart::CASH), amount),
            JournalEntryLine::credit(account(chart::ACCOUNTS_PAYABLE), amount),
        ]
    }

    fn post(tenant_id: TenantId, entry_id: Uuid, lines: Vec<JournalEntryLine>) -> LedgerCommand {
        LedgerCommand::PostJournalEntry(PostJournalEntry {
            tenant_id,
            entry_id,
            lines,
            description: Some("test".to_string()),
            source: None,
            occurred_at: Utc::now(),
        })
    }

    fn run(ledger: &mut Ledger, cmd: LedgerCommand) -> Result<Vec<LedgerEvent>, DomainError> {
        let events = ledger.handle(&cmd)?;
        for e in &events {
            ledger.apply(e);
        }
        Ok(events)
    }

    #[test]
    fn ledger_id_is_per_tenant() {
        let t = test_tenant_id();
        assert_eq!(LedgerId::for_tenant(t), LedgerId::for_tenant(t));
        assert_ne!(LedgerId::for_tenant(t), LedgerId::for_tenant(test_tenant_id()));
    }

    #[test]
    fn balanced_entry_is_posted_once() {
        let tenant_id = test_tenant_id();
        let mut ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        let entry_id = Uuid::now_v7();

        run(&mut ledger, post(tenant_id, entry_id, balanced(100))).unwrap();
        assert_eq!(ledger.entry_count(), 1);

        let err = run(&mut ledger, post(tenant_id, entry_id, balanced(100))).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let tenant_id = test_tenant_id();
        let ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        let lines = vec![
            JournalEntryLine::debit(account(chart::CASH), 100),
            JournalEntryLine::credit(account(chart::ACCOUNTS_PAYABLE), 90),
        ];

        let err = ledger.handle(&post(tenant_id, Uuid::now_v7(), lines)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("debits must equal credits") => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reversal_mirrors_lines_and_only_happens_once() {
        let tenant_id = test_tenant_id();
        let mut ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        let entry_id = Uuid::now_v7();
        run(&mut ledger, post(tenant_id, entry_id, balanced(250))).unwrap();

        let reverse = |reversal_id| {
            LedgerCommand::ReverseJournalEntry(ReverseJournalEntry {
                tenant_id,
                entry_id,
                reversal_id,
                reason: Some("entered twice".to_string()),
                occurred_at: Utc::now(),
            })
        };

        let events = run(&mut ledger, reverse(Uuid::now_v7())).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            LedgerEvent::JournalEntryPosted(e) => {
                assert!(!e.lines[0].is_debit);
                assert!(e.lines[1].is_debit);
                assert_eq!(e.lines[0].amount, 250);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(ledger.is_reversed(entry_id));

        let err = run(&mut ledger, reverse(Uuid::now_v7())).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn entries_are_indexed_by_source_document() {
        let tenant_id = test_tenant_id();
        let mut ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        let bill = AggregateId::new();
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        for entry_id in [first, second] {
            run(
                &mut ledger,
                LedgerCommand::PostJournalEntry(PostJournalEntry {
                    tenant_id,
                    entry_id,
                    lines: balanced(400),
                    description: None,
                    source: Some(PostingSource::new("bill", bill)),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        }
        run(&mut ledger, post(tenant_id, Uuid::now_v7(), balanced(10))).unwrap();
        assert_eq!(ledger.unreversed_entries_for(bill), vec![first, second]);

        run(
            &mut ledger,
            LedgerCommand::ReverseJournalEntry(ReverseJournalEntry {
                tenant_id,
                entry_id: first,
                reversal_id: Uuid::now_v7(),
                reason: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(ledger.unreversed_entries_for(bill), vec![second]);
        assert!(ledger.unreversed_entries_for(AggregateId::new()).is_empty());
    }

    #[test]
    fn reversing_unknown_entry_is_not_found() {
        let tenant_id = test_tenant_id();
        let ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        let err = ledger
            .handle(&LedgerCommand::ReverseJournalEntry(ReverseJournalEntry {
                tenant_id,
                entry_id: Uuid::now_v7(),
                reversal_id: Uuid::now_v7(),
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        #[test]
        fn posted_and_reversed_entries_net_to_zero(
            amounts in prop::collection::vec(1i64..1_000_000i64, 1..8)
        ) {
            let tenant_id = test_tenant_id();
            let mut ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
            let mut all = Vec::new();

            for amount in amounts {
                let entry_id = Uuid::now_v7();
                all.extend(run(&mut ledger, post(tenant_id, entry_id, balanced(amount))).unwrap());
                all.extend(run(&mut ledger, LedgerCommand::ReverseJournalEntry(ReverseJournalEntry {
                    tenant_id,
                    entry_id,
                    reversal_id: Uuid::now_v7(),
                    reason: None,
                    occurred_at: Utc::now(),
                })).unwrap());
            }

            let mut cash: i128 = 0;
            for ev in &all {
                if let LedgerEvent::JournalEntryPosted(je) = ev {
                    for line in je.lines.iter().filter(|l| l.account.code == chart::CASH) {
                        cash += if line.is_debit { line.amount as i128 } else { -(line.amount as i128) };
                    }
                }
            }
            prop_assert_eq!(cash, 0);
        }
    }
}
