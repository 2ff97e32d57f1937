//! Shared types for the justification pipeline.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

// ── Monitor data ────────────────────────────────────────────────────

/// Position date exactly as the upstream reported it.
///
/// The value is echoed back on every follow-up call, so it is kept verbatim
/// instead of being normalized through a date type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionDate(String);

impl PositionDate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Calendar date, when the raw value starts with `YYYY-MM-DD`.
    pub fn date(&self) -> Option<NaiveDate> {
        let prefix = self.0.get(..10)?;
        NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
    }
}

impl fmt::Display for PositionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One non-compliant, non-justified position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEntry {
    #[serde(rename = "guidMensagem")]
    pub message_id: String,
    #[serde(rename = "codCgePortfolio")]
    pub portfolio_id: String,
    #[serde(rename = "dataPosicao")]
    pub position_date: PositionDate,
}

/// One rule flagged within a portfolio's level-2 detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDetailEntry {
    #[serde(rename = "guidMensagem")]
    pub message_id: String,
    #[serde(rename = "idRegra")]
    pub rule_id: i64,
    #[serde(rename = "nomeRegra", default)]
    pub rule_name: Option<String>,
    #[serde(rename = "explodida", default, deserialize_with = "lenient_bool")]
    pub exploded: bool,
    /// Distinguishes the exploded and aggregate instances of one rule.
    #[serde(rename = "guidMensagemRegra", default)]
    pub variant_id: Option<String>,
    /// Portfolio whose detail listing produced this entry. Set by the run
    /// driver, never by the upstream.
    #[serde(skip)]
    pub source_portfolio: String,
}

/// Accept the loose truthiness the upstream uses for flags: booleans,
/// 0/1 numbers, "true"/"false" strings, or null.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(serde_json::Value::String(s)) => {
            !matches!(s.trim().to_ascii_lowercase().as_str(), "" | "0" | "false")
        }
        Some(_) => true,
    })
}

// ── Prior justification ─────────────────────────────────────────────

/// Justification history for a (portfolio, date, rule) tuple.
///
/// The type ids are kept as raw JSON values: the upstream is not strict about
/// their encoding and the eligibility check must tell "not a number" apart
/// from "a different number".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorJustification {
    pub text: String,
    pub action_plan: String,
    pub justification_type: Option<serde_json::Value>,
    pub non_compliance_type: Option<serde_json::Value>,
}

impl PriorJustification {
    /// The "no history" sentinel.
    pub fn none() -> Self {
        Self::default()
    }

    /// Both type ids absent.
    pub fn is_new_cycle(&self) -> bool {
        self.justification_type.is_none() && self.non_compliance_type.is_none()
    }
}

/// Outcome of a prior-justification lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorLookup {
    /// A D-1 justification exists.
    Found(PriorJustification),
    /// No D-1 justification; only the delayed-justification text, if any.
    Delayed { text: String },
    /// The lookup itself failed.
    Unavailable { reason: String },
}

impl PriorLookup {
    /// Collapse into the prior justification the engine evaluates.
    ///
    /// `Delayed` and `Unavailable` both carry null type ids and therefore end
    /// up as new-cycle rejections.
    pub fn into_prior(self) -> PriorJustification {
        match self {
            Self::Found(prior) => prior,
            Self::Delayed { text } => PriorJustification {
                text,
                ..PriorJustification::none()
            },
            Self::Unavailable { .. } => PriorJustification::none(),
        }
    }

    pub fn history_status(&self) -> HistoryStatus {
        match self {
            Self::Found(_) => HistoryStatus::Found,
            Self::Delayed { .. } => HistoryStatus::NotFound,
            Self::Unavailable { .. } => HistoryStatus::Unavailable,
        }
    }
}

/// Where the prior history came from, kept on decisions for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    /// The lookup was never made.
    NotQueried,
    Found,
    NotFound,
    Unavailable,
}

// ── Eligibility ─────────────────────────────────────────────────────

/// Justification / non-compliance type pair configured for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetTypes {
    pub justification_type: i64,
    pub non_compliance_type: i64,
}

/// Closed set of rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Same rule present as exploded and aggregate on one flagged event.
    MixedExplosion,
    /// No prior justification type: the non-compliance just started.
    NewCycle,
    /// Prior types parse but differ from the configured targets.
    TypeMismatch,
    /// Prior types are not integers.
    InvalidType,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MixedExplosion => "MIXED_EXPLOSION",
            Self::NewCycle => "NEW_CYCLE",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::InvalidType => "INVALID_TYPE",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Audit context recorded with every rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionContext {
    pub message_id: String,
    pub portfolio_id: String,
    pub rule_id: i64,
    /// Distinct variant ids seen for the rule (mixed explosion only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Option<String>>,
    pub history: HistoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_justification_type: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_non_compliance_type: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_types: Option<TargetTypes>,
}

/// Decision for one whitelisted rule detail entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EligibilityDecision {
    Accepted { prior: PriorJustification },
    Rejected {
        reason: RejectionReason,
        context: Box<RejectionContext>,
    },
}

impl EligibilityDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected { reason, .. } => Some(*reason),
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { reason, .. } => reason.code(),
        }
    }
}

/// A rule detail entry, its resolved parent, and the decision made for it.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub entry: RuleDetailEntry,
    pub monitor: MonitorEntry,
    pub decision: EligibilityDecision,
}

// ── Submission ──────────────────────────────────────────────────────

/// Status code the upstream returns for an accepted justification.
pub const SUCCESS_STATUS: u16 = 200;

/// Maximum characters of response text kept on a submission outcome.
pub const RESPONSE_TEXT_LIMIT: usize = 300;

/// Result of submitting one justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    pub status: u16,
    pub response_text: String,
}

impl SubmissionOutcome {
    pub fn new(status: u16, response_text: &str) -> Self {
        Self {
            status,
            response_text: response_text.chars().take(RESPONSE_TEXT_LIMIT).collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}
