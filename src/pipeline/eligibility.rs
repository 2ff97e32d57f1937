//! Eligibility engine: decides, per whitelisted rule detail entry, whether a
//! justification may be submitted automatically.
//!
//! Checks run in order and the first failing one decides:
//! 1. Parent resolution: entries whose message group has no flagged position
//!    are dropped without a decision.
//! 2. Mixed explosion: the rule appears with more than one variant id in the
//!    same message group.
//! 3. Prior history lookup (never fails; failures read as "no history").
//! 4. New cycle: no prior type ids at all.
//! 5. Type consistency: prior type ids must equal the configured targets.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::gateway::Gateway;
use crate::pipeline::types::{
    EligibilityDecision, Evaluation, HistoryStatus, MonitorEntry, PriorJustification,
    PriorLookup, RejectionContext, RejectionReason, RuleDetailEntry, TargetTypes,
};

/// Read-only lookup of flagged positions by message group id.
#[derive(Debug, Clone, Default)]
pub struct MonitorIndex {
    by_message: HashMap<String, MonitorEntry>,
}

impl MonitorIndex {
    /// Index positions by message id. The first entry for an id wins.
    pub fn new(entries: &[MonitorEntry]) -> Self {
        let mut by_message = HashMap::with_capacity(entries.len());
        for entry in entries {
            by_message
                .entry(entry.message_id.clone())
                .or_insert_with(|| entry.clone());
        }
        Self { by_message }
    }

    pub fn get(&self, message_id: &str) -> Option<&MonitorEntry> {
        self.by_message.get(message_id)
    }

    pub fn len(&self) -> usize {
        self.by_message.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_message.is_empty()
    }
}

/// Decisions for a batch plus the number of entries dropped as unlinked.
#[derive(Debug, Clone, Default)]
pub struct EligibilityReport {
    pub evaluations: Vec<Evaluation>,
    pub unlinked: usize,
}

impl EligibilityReport {
    pub fn accepted(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().filter(|e| e.decision.is_accepted())
    }
}

pub struct EligibilityEngine {
    gateway: Arc<dyn Gateway>,
    targets: TargetTypes,
}

impl EligibilityEngine {
    pub fn new(gateway: Arc<dyn Gateway>, targets: TargetTypes) -> Self {
        Self { gateway, targets }
    }

    /// Evaluate every candidate. `candidates` must be the whitelisted set:
    /// the mixed-explosion check looks for sibling variants within it.
    pub async fn evaluate_all(
        &self,
        candidates: &[RuleDetailEntry],
        monitor: &MonitorIndex,
    ) -> EligibilityReport {
        let mut report = EligibilityReport::default();

        for entry in candidates {
            let Some(parent) = monitor.get(&entry.message_id) else {
                warn!(
                    message_id = %entry.message_id,
                    rule_id = entry.rule_id,
                    "Rule detail has no flagged position, dropping"
                );
                report.unlinked += 1;
                continue;
            };

            let decision = self.decide(entry, parent, candidates).await;
            report.evaluations.push(Evaluation {
                entry: entry.clone(),
                monitor: parent.clone(),
                decision,
            });
        }

        info!(
            evaluated = report.evaluations.len(),
            accepted = report.accepted().count(),
            unlinked = report.unlinked,
            "Eligibility evaluation complete"
        );
        report
    }

    /// Evaluate one entry. Returns `None` when the entry is unlinked.
    pub async fn evaluate(
        &self,
        entry: &RuleDetailEntry,
        candidates: &[RuleDetailEntry],
        monitor: &MonitorIndex,
    ) -> Option<EligibilityDecision> {
        let parent = monitor.get(&entry.message_id)?;
        Some(self.decide(entry, parent, candidates).await)
    }

    async fn decide(
        &self,
        entry: &RuleDetailEntry,
        parent: &MonitorEntry,
        candidates: &[RuleDetailEntry],
    ) -> EligibilityDecision {
        let context = RejectionContext {
            message_id: entry.message_id.clone(),
            portfolio_id: parent.portfolio_id.clone(),
            rule_id: entry.rule_id,
            variants: Vec::new(),
            history: HistoryStatus::NotQueried,
            previous_justification_type: None,
            previous_non_compliance_type: None,
            current_types: None,
        };

        if let Some(variants) = mixed_variants(entry, candidates) {
            return reject(
                RejectionReason::MixedExplosion,
                RejectionContext {
                    variants,
                    ..context
                },
            );
        }

        let lookup = self
            .gateway
            .fetch_prior_justification(
                &parent.portfolio_id,
                &parent.position_date,
                entry.rule_id,
                entry.exploded,
            )
            .await;
        let history = lookup.history_status();
        if let PriorLookup::Unavailable { reason } = &lookup {
            warn!(
                portfolio = %parent.portfolio_id,
                rule_id = entry.rule_id,
                reason = %reason,
                "Prior history unavailable, treating as no history"
            );
        }
        let prior = lookup.into_prior();

        match check_history(&prior, self.targets) {
            Ok(()) => {
                debug!(
                    portfolio = %parent.portfolio_id,
                    rule_id = entry.rule_id,
                    "Entry eligible for automatic justification"
                );
                EligibilityDecision::Accepted { prior }
            }
            Err(RejectionReason::NewCycle) => reject(
                RejectionReason::NewCycle,
                RejectionContext { history, ..context },
            ),
            Err(reason) => reject(
                reason,
                RejectionContext {
                    history,
                    previous_justification_type: prior.justification_type,
                    previous_non_compliance_type: prior.non_compliance_type,
                    current_types: Some(self.targets),
                    ..context
                },
            ),
        }
    }
}

fn reject(reason: RejectionReason, context: RejectionContext) -> EligibilityDecision {
    info!(
        portfolio = %context.portfolio_id,
        rule_id = context.rule_id,
        message_id = %context.message_id,
        reason = reason.code(),
        "Skipping rule"
    );
    EligibilityDecision::Rejected {
        reason,
        context: Box::new(context),
    }
}

/// Distinct variant ids for the entry's (message group, rule) pair, when
/// there is more than one.
pub fn mixed_variants(
    entry: &RuleDetailEntry,
    candidates: &[RuleDetailEntry],
) -> Option<Vec<Option<String>>> {
    let variants: BTreeSet<Option<&str>> = candidates
        .iter()
        .filter(|c| c.message_id == entry.message_id && c.rule_id == entry.rule_id)
        .map(|c| c.variant_id.as_deref())
        .collect();

    (variants.len() > 1).then(|| {
        variants
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    })
}

/// Compare prior type ids against the targets.
///
/// The justification type is checked before the non-compliance type: a
/// mismatching justification type is reported as a mismatch even when the
/// non-compliance type would not parse.
pub fn check_history(prior: &PriorJustification, targets: TargetTypes) -> Result<(), RejectionReason> {
    if prior.is_new_cycle() {
        return Err(RejectionReason::NewCycle);
    }

    let pairs = [
        (&prior.justification_type, targets.justification_type),
        (&prior.non_compliance_type, targets.non_compliance_type),
    ];
    for (previous, target) in pairs {
        let parsed = previous
            .as_ref()
            .and_then(parse_type_id)
            .ok_or(RejectionReason::InvalidType)?;
        if parsed != target {
            return Err(RejectionReason::TypeMismatch);
        }
    }
    Ok(())
}

/// Integer value of a type id as the upstream may encode it: a JSON integer,
/// a float (truncated), or a numeric string. Booleans and other shapes are
/// not type ids.
pub fn parse_type_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::GatewayError;
    use crate::gateway::payloads::{
        EmailContent, EmailContentRequest, EmailPayload, JustificationRequest,
    };
    use crate::pipeline::types::{PositionDate, SubmissionOutcome};

    const TARGETS: TargetTypes = TargetTypes {
        justification_type: 5,
        non_compliance_type: 3,
    };

    /// Gateway that answers every prior lookup with the same result and
    /// records the lookups made.
    struct MockHistory {
        lookup: PriorLookup,
        calls: Mutex<Vec<(String, i64, bool)>>,
    }

    impl MockHistory {
        fn new(lookup: PriorLookup) -> Arc<Self> {
            Arc::new(Self {
                lookup,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Gateway for MockHistory {
        async fn fetch_flagged_positions(&self) -> Result<Vec<MonitorEntry>, GatewayError> {
            unimplemented!("not used by the engine")
        }

        async fn fetch_rule_detail(
            &self,
            _portfolio_id: &str,
            _position_date: &PositionDate,
        ) -> Result<Vec<RuleDetailEntry>, GatewayError> {
            unimplemented!("not used by the engine")
        }

        async fn fetch_prior_justification(
            &self,
            portfolio_id: &str,
            _position_date: &PositionDate,
            rule_id: i64,
            exploded: bool,
        ) -> PriorLookup {
            self.calls
                .lock()
                .unwrap()
                .push((portfolio_id.to_string(), rule_id, exploded));
            self.lookup.clone()
        }

        async fn submit_justification(
            &self,
            _request: &JustificationRequest,
        ) -> Result<SubmissionOutcome, GatewayError> {
            unimplemented!("not used by the engine")
        }

        async fn fetch_email_content(
            &self,
            _request: &EmailContentRequest,
        ) -> Result<EmailContent, GatewayError> {
            unimplemented!("not used by the engine")
        }

        async fn send_email(&self, _payload: &EmailPayload) -> Result<u16, GatewayError> {
            unimplemented!("not used by the engine")
        }
    }

    fn found(jus: Value, desen: Value) -> PriorLookup {
        PriorLookup::Found(PriorJustification {
            text: "old text".into(),
            action_plan: "old plan".into(),
            justification_type: Some(jus).filter(|v| !v.is_null()),
            non_compliance_type: Some(desen).filter(|v| !v.is_null()),
        })
    }

    fn monitor(message_id: &str, portfolio: &str) -> MonitorEntry {
        MonitorEntry {
            message_id: message_id.into(),
            portfolio_id: portfolio.into(),
            position_date: PositionDate::new("2024-03-15"),
        }
    }

    fn detail(message_id: &str, rule_id: i64, variant: &str, exploded: bool) -> RuleDetailEntry {
        RuleDetailEntry {
            message_id: message_id.into(),
            rule_id,
            rule_name: Some(format!("Rule {rule_id}")),
            exploded,
            variant_id: Some(variant.into()),
            source_portfolio: "P1".into(),
        }
    }

    fn prior_with(jus: Option<Value>, desen: Option<Value>) -> PriorJustification {
        PriorJustification {
            justification_type: jus,
            non_compliance_type: desen,
            ..PriorJustification::none()
        }
    }

    // ── Pure checks ─────────────────────────────────────────────────

    #[test]
    fn parse_type_id_accepts_integer_shapes() {
        assert_eq!(parse_type_id(&json!(5)), Some(5));
        assert_eq!(parse_type_id(&json!("5")), Some(5));
        assert_eq!(parse_type_id(&json!(" 7 ")), Some(7));
        assert_eq!(parse_type_id(&json!(5.9)), Some(5));
        assert_eq!(parse_type_id(&json!(-2)), Some(-2));
    }

    #[test]
    fn parse_type_id_rejects_other_shapes() {
        assert_eq!(parse_type_id(&json!("abc")), None);
        assert_eq!(parse_type_id(&json!("5.0")), None);
        assert_eq!(parse_type_id(&json!(true)), None);
        assert_eq!(parse_type_id(&json!([5])), None);
        assert_eq!(parse_type_id(&json!({})), None);
    }

    #[test]
    fn check_history_accepts_matching_types() {
        let prior = prior_with(Some(json!(5)), Some(json!("3")));
        assert_eq!(check_history(&prior, TARGETS), Ok(()));
    }

    #[test]
    fn check_history_new_cycle_regardless_of_text() {
        let prior = PriorJustification {
            text: "some text".into(),
            action_plan: "some plan".into(),
            ..PriorJustification::none()
        };
        assert_eq!(check_history(&prior, TARGETS), Err(RejectionReason::NewCycle));
    }

    #[test]
    fn check_history_mismatch() {
        let prior = prior_with(Some(json!(5)), Some(json!(4)));
        assert_eq!(
            check_history(&prior, TARGETS),
            Err(RejectionReason::TypeMismatch)
        );
    }

    #[test]
    fn check_history_one_side_missing_is_invalid() {
        let prior = prior_with(Some(json!(5)), None);
        assert_eq!(
            check_history(&prior, TARGETS),
            Err(RejectionReason::InvalidType)
        );
        let prior = prior_with(None, Some(json!(3)));
        assert_eq!(
            check_history(&prior, TARGETS),
            Err(RejectionReason::InvalidType)
        );
    }

    #[test]
    fn check_history_non_numeric_is_invalid() {
        let prior = prior_with(Some(json!("five")), Some(json!(3)));
        assert_eq!(
            check_history(&prior, TARGETS),
            Err(RejectionReason::InvalidType)
        );
    }

    #[test]
    fn check_history_justification_mismatch_reported_first() {
        let prior = prior_with(Some(json!(9)), Some(json!("garbage")));
        assert_eq!(
            check_history(&prior, TARGETS),
            Err(RejectionReason::TypeMismatch)
        );
    }

    #[test]
    fn mixed_variants_detects_two_variants() {
        let candidates = vec![
            detail("G2", 20, "x", true),
            detail("G2", 20, "y", false),
            detail("G2", 21, "z", false),
        ];
        let variants = mixed_variants(&candidates[0], &candidates).unwrap();
        assert_eq!(variants, vec![Some("x".to_string()), Some("y".to_string())]);
        assert!(mixed_variants(&candidates[2], &candidates).is_none());
    }

    #[test]
    fn mixed_variants_ignores_other_groups_and_duplicates() {
        let candidates = vec![
            detail("G1", 20, "x", true),
            detail("G1", 20, "x", true),
            detail("G2", 20, "y", false),
        ];
        assert!(mixed_variants(&candidates[0], &candidates).is_none());
    }

    #[test]
    fn mixed_variants_counts_missing_id_as_a_variant() {
        let mut aggregate = detail("G1", 20, "x", false);
        aggregate.variant_id = None;
        let candidates = vec![detail("G1", 20, "x", true), aggregate];
        let variants = mixed_variants(&candidates[0], &candidates).unwrap();
        assert_eq!(variants, vec![None, Some("x".to_string())]);
    }

    #[test]
    fn monitor_index_first_entry_wins() {
        let index = MonitorIndex::new(&[monitor("G1", "P1"), monitor("G1", "P2")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("G1").unwrap().portfolio_id, "P1");
        assert!(index.get("G2").is_none());
    }

    // ── Engine ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn accepts_and_carries_prior_text() {
        let gateway = MockHistory::new(found(json!(5), json!(3)));
        let engine = EligibilityEngine::new(gateway.clone(), TARGETS);
        let index = MonitorIndex::new(&[monitor("G1", "P1")]);
        let candidates = vec![detail("G1", 10, "a", false)];

        let decision = engine
            .evaluate(&candidates[0], &candidates, &index)
            .await
            .unwrap();
        match decision {
            EligibilityDecision::Accepted { prior } => {
                assert_eq!(prior.text, "old text");
                assert_eq!(prior.action_plan, "old plan");
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert_eq!(
            *gateway.calls.lock().unwrap(),
            vec![("P1".to_string(), 10, false)]
        );
    }

    #[tokio::test]
    async fn unlinked_entry_yields_no_decision() {
        let gateway = MockHistory::new(found(json!(5), json!(3)));
        let engine = EligibilityEngine::new(gateway.clone(), TARGETS);
        let index = MonitorIndex::new(&[monitor("G1", "P1")]);
        let candidates = vec![detail("G3", 10, "a", false)];

        assert!(engine.evaluate(&candidates[0], &candidates, &index).await.is_none());

        let report = engine.evaluate_all(&candidates, &index).await;
        assert!(report.evaluations.is_empty());
        assert_eq!(report.unlinked, 1);
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_explosion_rejects_every_variant_without_lookup() {
        let gateway = MockHistory::new(found(json!(5), json!(3)));
        let engine = EligibilityEngine::new(gateway.clone(), TARGETS);
        let index = MonitorIndex::new(&[monitor("G2", "P1")]);
        let candidates = vec![detail("G2", 20, "x", true), detail("G2", 20, "y", false)];

        let report = engine.evaluate_all(&candidates, &index).await;
        assert_eq!(report.evaluations.len(), 2);
        for evaluation in &report.evaluations {
            assert_eq!(
                evaluation.decision.rejection_reason(),
                Some(RejectionReason::MixedExplosion)
            );
        }
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_history_is_a_new_cycle_with_diagnostic() {
        let gateway = MockHistory::new(PriorLookup::Unavailable {
            reason: "connection refused".into(),
        });
        let engine = EligibilityEngine::new(gateway, TARGETS);
        let index = MonitorIndex::new(&[monitor("G1", "P1")]);
        let candidates = vec![detail("G1", 10, "a", false)];

        let decision = engine
            .evaluate(&candidates[0], &candidates, &index)
            .await
            .unwrap();
        match decision {
            EligibilityDecision::Rejected { reason, context } => {
                assert_eq!(reason, RejectionReason::NewCycle);
                assert_eq!(context.history, HistoryStatus::Unavailable);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mismatch_preserves_previous_and_current_types() {
        let gateway = MockHistory::new(found(json!(7), json!(3)));
        let engine = EligibilityEngine::new(gateway, TARGETS);
        let index = MonitorIndex::new(&[monitor("G1", "P1")]);
        let candidates = vec![detail("G1", 10, "a", false)];

        let decision = engine
            .evaluate(&candidates[0], &candidates, &index)
            .await
            .unwrap();
        let EligibilityDecision::Rejected { reason, context } = decision else {
            panic!("expected Rejected");
        };
        assert_eq!(reason, RejectionReason::TypeMismatch);
        assert_eq!(context.previous_justification_type, Some(json!(7)));
        assert_eq!(context.previous_non_compliance_type, Some(json!(3)));
        assert_eq!(context.current_types, Some(TARGETS));
        assert_eq!(context.history, HistoryStatus::Found);
    }

    #[tokio::test]
    async fn invalid_type_preserves_raw_values() {
        let gateway = MockHistory::new(found(json!("n/a"), json!(3)));
        let engine = EligibilityEngine::new(gateway, TARGETS);
        let index = MonitorIndex::new(&[monitor("G1", "P1")]);
        let candidates = vec![detail("G1", 10, "a", false)];

        let decision = engine
            .evaluate(&candidates[0], &candidates, &index)
            .await
            .unwrap();
        let EligibilityDecision::Rejected { reason, context } = decision else {
            panic!("expected Rejected");
        };
        assert_eq!(reason, RejectionReason::InvalidType);
        assert_eq!(context.previous_justification_type, Some(json!("n/a")));
    }

    #[tokio::test]
    async fn evaluation_is_idempotent() {
        let gateway = MockHistory::new(found(json!(5), json!(3)));
        let engine = EligibilityEngine::new(gateway, TARGETS);
        let index = MonitorIndex::new(&[monitor("G1", "P1"), monitor("G2", "P1")]);
        let candidates = vec![
            detail("G1", 10, "a", false),
            detail("G2", 20, "x", true),
            detail("G2", 20, "y", false),
            detail("G9", 10, "a", false),
        ];

        let first = engine.evaluate_all(&candidates, &index).await;
        let second = engine.evaluate_all(&candidates, &index).await;
        let labels = |r: &EligibilityReport| -> Vec<&'static str> {
            r.evaluations.iter().map(|e| e.decision.label()).collect()
        };
        assert_eq!(labels(&first), labels(&second));
        assert_eq!(first.unlinked, second.unlinked);
        assert_eq!(
            labels(&first),
            vec!["accepted", "MIXED_EXPLOSION", "MIXED_EXPLOSION"]
        );
    }
}
