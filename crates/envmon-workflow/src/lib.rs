//! envmon-workflow
//!
//! Proforma lifecycle, role gating, and the in-memory desk that ties them
//! together, plus report aggregation and ISO certificate expiry tracking.
//!
//! Deterministic: no IO and no wall clock. Every mutating operation takes
//! the acting user and `now` from the caller.

pub mod access;
pub mod certificates;
pub mod column;
pub mod desk;
mod error;
pub mod lifecycle;
pub mod reports;

pub use access::{authorize, department_visible, is_allowed, visible_to, AccessDenied, Action};
pub use desk::{NewField, NewProforma, ProformaDesk, ProformaFilter};
pub use error::DeskError;
pub use lifecycle::{next_status, LifecycleEvent, TransitionError, TransitionRecord};
pub use certificates::{expiry_info, CertificateRegister, ExpiryInfo, ExpiryStatus, NewCertificate};
pub use reports::{build_report, FieldSummary, Report, ReportScope};
