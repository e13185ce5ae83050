//! Proforma lifecycle state machine.
//!
//! # Design
//!
//! Every status change goes through [`next_status`], which is the single
//! place the transition table lives. Illegal events return
//! [`TransitionError`] and leave the proforma untouched.
//!
//! # Transition table
//!
//! ```text
//!   from              event            to
//!   ----------------  ---------------  ----------------
//!   not_assigned      assign           assigned
//!   assigned          assign           assigned         (reassign)
//!   in_progress       assign           in_progress      (reassign)
//!   reopened          assign           reopened         (reassign)
//!   not_assigned      row_edited       not_assigned     (creator drafting)
//!   assigned          row_edited       in_progress
//!   in_progress       row_edited       in_progress
//!   reopened          row_edited       in_progress
//!   sent_for_review   row_edited       sent_for_review  (reviewer correction)
//!   in_progress       send_for_review  sent_for_review
//!   reopened          send_for_review  sent_for_review
//!   sent_for_review   submit           submitted
//!   submitted         reopen           reopened
//! ```
//!
//! `submitted` is locked: it accepts only `reopen`.

use std::fmt;

use chrono::{DateTime, Utc};
use envmon_schemas::ProformaStatus;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/// Events that drive proforma status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Staff assigned (or reassigned) to fill the proforma.
    Assign,
    /// A row was added or its values changed.
    RowEdited,
    /// Data-entry staff hand the proforma to reviewers.
    SendForReview,
    /// A reviewer approves and submits the final proforma.
    Submit,
    /// Oversight reopens a submitted proforma.
    Reopen,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 5] = [
        LifecycleEvent::Assign,
        LifecycleEvent::RowEdited,
        LifecycleEvent::SendForReview,
        LifecycleEvent::Submit,
        LifecycleEvent::Reopen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Assign => "assign",
            LifecycleEvent::RowEdited => "row_edited",
            LifecycleEvent::SendForReview => "send_for_review",
            LifecycleEvent::Submit => "submit",
            LifecycleEvent::Reopen => "reopen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|e| e.as_str() == wanted)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event cannot legally be applied in the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ProformaStatus,
    pub event: LifecycleEvent,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal proforma transition: {} + {}",
            self.from, self.event
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Compute the status that results from applying `event` in `from`.
pub fn next_status(
    from: ProformaStatus,
    event: LifecycleEvent,
) -> Result<ProformaStatus, TransitionError> {
    use LifecycleEvent::*;
    use ProformaStatus::*;

    let to = match (from, event) {
        // Assignment; reassignment keeps the current working status.
        (NotAssigned, Assign) => Assigned,
        (Assigned | InProgress | Reopened, Assign) => from,

        // Row edits. The creator may draft rows before anyone is assigned.
        (NotAssigned, RowEdited) => NotAssigned,
        (Assigned | InProgress | Reopened, RowEdited) => InProgress,
        // Reviewer corrections while under review.
        (SentForReview, RowEdited) => SentForReview,

        (InProgress | Reopened, SendForReview) => SentForReview,

        (SentForReview, Submit) => Submitted,

        (Submitted, Reopen) => Reopened,

        (state, ev) => return Err(TransitionError { from: state, event: ev }),
    };

    Ok(to)
}

/// `true` when no row edits, comments, or calculations are accepted.
pub fn is_locked(status: ProformaStatus) -> bool {
    status == ProformaStatus::Submitted
}

// ---------------------------------------------------------------------------
// TransitionRecord
// ---------------------------------------------------------------------------

/// One applied transition, kept in the desk history and exported to audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub proforma_id: String,
    pub from: ProformaStatus,
    pub to: ProformaStatus,
    pub event: LifecycleEvent,
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl TransitionRecord {
    /// `false` for self-loops such as a reassignment or an edit in progress.
    pub fn changed_status(&self) -> bool {
        self.from != self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleEvent::*;
    use ProformaStatus::*;

    #[test]
    fn happy_path_walks_every_status() {
        let mut st = NotAssigned;
        for (ev, want) in [
            (Assign, Assigned),
            (RowEdited, InProgress),
            (SendForReview, SentForReview),
            (Submit, Submitted),
            (Reopen, Reopened),
            (RowEdited, InProgress),
            (SendForReview, SentForReview),
            (Submit, Submitted),
        ] {
            st = next_status(st, ev).unwrap();
            assert_eq!(st, want, "after {ev}");
        }
    }

    #[test]
    fn submitted_is_locked_against_edits() {
        let err = next_status(Submitted, RowEdited).unwrap_err();
        assert_eq!(err.from, Submitted);
        assert_eq!(err.event, RowEdited);
        assert!(is_locked(Submitted));
        assert!(!is_locked(Reopened));
    }

    #[test]
    fn submit_requires_review_first() {
        for from in [NotAssigned, Assigned, InProgress, Submitted, Reopened] {
            assert!(next_status(from, Submit).is_err(), "submit from {from}");
        }
    }

    #[test]
    fn reopen_only_from_submitted() {
        for from in ProformaStatus::ALL {
            let res = next_status(from, Reopen);
            assert_eq!(res.is_ok(), from == Submitted, "reopen from {from}");
        }
    }

    #[test]
    fn send_for_review_needs_work_in_progress() {
        assert!(next_status(NotAssigned, SendForReview).is_err());
        assert!(next_status(Assigned, SendForReview).is_err());
        assert_eq!(next_status(Reopened, SendForReview), Ok(SentForReview));
    }

    #[test]
    fn reassign_keeps_working_status() {
        assert_eq!(next_status(InProgress, Assign), Ok(InProgress));
        assert_eq!(next_status(Reopened, Assign), Ok(Reopened));
        assert!(next_status(SentForReview, Assign).is_err());
        assert!(next_status(Submitted, Assign).is_err());
    }

    #[test]
    fn error_message_names_status_and_event() {
        let err = next_status(Submitted, Assign).unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal proforma transition: submitted + assign"
        );
    }

    #[test]
    fn event_parse_accepts_dashes() {
        assert_eq!(LifecycleEvent::parse("send-for-review"), Some(SendForReview));
        assert_eq!(LifecycleEvent::parse("approve"), None);
    }
}
