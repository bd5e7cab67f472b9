//! cull-triage: the triage queue state machine.
//!
//! A [`TriageSession`] walks the worklist of one group at a time, records
//! keep/remove decisions through a [`cull_core::ContentDirectory`], and moves
//! on to the next undecided item or group. The presentation layer turns key
//! presses into [`Command`]s and renders the session plus [`ReviewSignals`].

pub mod command;
pub mod session;
pub mod signals;

pub use command::{Command, Effect};
pub use session::{
    BulkReport, DecisionApplied, DisplayState, JournalEntry, PendingDecision, Prompt,
    TriageSession,
};
pub use signals::{ReviewSignals, signals_for};
