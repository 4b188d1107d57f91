//! Accounts payable: vendors, vendor bills and outgoing payments.
//!
//! Pure domain logic only; the API sequences the multi-aggregate flows
//! (payment allocation, GL posting).

pub mod aging;
pub mod bill;
pub mod payment;
pub mod terms;
pub mod vendor;

pub use aging::{AgingBucket, AgingReport, age_outstanding};
pub use bill::{
    ApplyPayment, ApproveBill, Bill, BillCommand, BillEvent, BillId, BillItem, BillItemInput,
    BillStatus, BillTotals, CreateBill, ReviseBill, TaxLine, TaxLineInput, VoidBill, price_bill,
};
pub use payment::{
    Allocation, AllocationStatus, Payment, PaymentCommand, PaymentEvent, PaymentId, PaymentMethod,
    RecordPayment, RejectAllocation,
};
pub use terms::PaymentTerms;
pub use vendor::{
    Contact, DeactivateVendor, ReactivateVendor, RegisterVendor, UpdateVendor, Vendor,
    VendorCommand, VendorEvent, VendorId, VendorStatus,
};
