use std::fmt;

use envmon_stats::StatsError;

use crate::access::AccessDenied;
use crate::lifecycle::TransitionError;

/// Everything a desk operation can refuse with.
#[derive(Debug, Clone, PartialEq)]
pub enum DeskError {
    /// Input failed a presence or type check.
    Validation(String),
    NotFound { kind: &'static str, id: String },
    Access(AccessDenied),
    Transition(TransitionError),
    /// The proforma is submitted and accepts no changes until reopened.
    Locked { proforma_id: String },
    Stats(StatsError),
}

impl DeskError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        DeskError::Validation(msg.into())
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        DeskError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable discriminant for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            DeskError::Validation(_) => "validation",
            DeskError::NotFound { .. } => "not_found",
            DeskError::Access(_) => "access_denied",
            DeskError::Transition(_) => "illegal_transition",
            DeskError::Locked { .. } => "locked",
            DeskError::Stats(_) => "stats",
        }
    }
}

impl fmt::Display for DeskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeskError::Validation(msg) => write!(f, "validation failed: {msg}"),
            DeskError::NotFound { kind, id } => write!(f, "{kind} '{id}' not found"),
            DeskError::Access(e) => write!(f, "{e}"),
            DeskError::Transition(e) => write!(f, "{e}"),
            DeskError::Locked { proforma_id } => {
                write!(f, "proforma '{proforma_id}' is submitted; reopen it first")
            }
            DeskError::Stats(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DeskError {}

impl From<AccessDenied> for DeskError {
    fn from(e: AccessDenied) -> Self {
        DeskError::Access(e)
    }
}

impl From<TransitionError> for DeskError {
    fn from(e: TransitionError) -> Self {
        DeskError::Transition(e)
    }
}

impl From<StatsError> for DeskError {
    fn from(e: StatsError) -> Self {
        DeskError::Stats(e)
    }
}
