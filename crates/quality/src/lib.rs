//! Quality management: nonconformance reports and corrective/preventive actions.

pub mod capa;
pub mod ncr;

pub use capa::{
    Capa, CapaAction, CapaCommand, CapaEvent, CapaId, CapaKind, CapaStatus, Verification,
};
pub use ncr::{Disposition, Ncr, NcrCommand, NcrEvent, NcrId, NcrSource, NcrStatus, Severity};
