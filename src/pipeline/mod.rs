//! Justification pipeline.
//!
//! One run flows through:
//! 1. `Gateway::fetch_flagged_positions()`: snapshot of flagged positions
//! 2. `Whitelist::filter()`: only approved (portfolio, rule) entries
//! 3. `EligibilityEngine::evaluate_all()`: accept or reject each entry
//! 4. `SubmissionRunner::submit_all()`: justify accepted entries
//! 5. `Notifier::notify_all()`: one consolidated email per message group
//!
//! **Justification text is never written here.** Accepted entries reuse the
//! prior period's text and action plan verbatim.

pub mod eligibility;
pub mod format;
pub mod notification;
pub mod run;
pub mod submission;
pub mod types;
pub mod whitelist;

pub use run::{JustificationRun, RunReport};
