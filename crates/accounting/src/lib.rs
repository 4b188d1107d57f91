//! General ledger (double-entry, event-sourced) and the fixed posting templates
//! the business modules use to produce journal lines.

pub mod chart;
pub mod ledger;
pub mod posting;

pub use chart::{Account, AccountKind};
pub use ledger::{
    JournalEntryLine, JournalEntryPosted, JournalEntryReversed, Ledger, LedgerCommand,
    LedgerEvent, LedgerId, PostJournalEntry, PostingSource, ReverseJournalEntry,
};
pub use posting::ensure_balanced;
