//! Submission runner: sends a justification for every accepted entry.
//!
//! Each submission is independent: a transport failure or a non-200 status
//! is logged and the runner moves on to the next entry.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::config::JustificationConfig;
use crate::gateway::Gateway;
use crate::gateway::payloads::{JustificationRequest, JustifiedRule, MONITOR_TYPE};
use crate::pipeline::types::{EligibilityDecision, Evaluation, RuleDetailEntry, SubmissionOutcome};

/// Result of attempting one submission.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub entry: RuleDetailEntry,
    pub portfolio_id: String,
    /// `None` when the request never got a response.
    pub outcome: Option<SubmissionOutcome>,
}

impl SubmissionRecord {
    /// Justified iff the upstream answered with the success status.
    pub fn is_justified(&self) -> bool {
        self.outcome.as_ref().is_some_and(SubmissionOutcome::is_success)
    }
}

pub struct SubmissionRunner {
    gateway: Arc<dyn Gateway>,
    config: JustificationConfig,
    deadline: NaiveDate,
}

impl SubmissionRunner {
    /// `deadline` is the action-plan deadline stamped on every request,
    /// normally the run date.
    pub fn new(gateway: Arc<dyn Gateway>, config: JustificationConfig, deadline: NaiveDate) -> Self {
        Self {
            gateway,
            config,
            deadline,
        }
    }

    /// Build the submission for an evaluation. `None` unless it was accepted.
    ///
    /// The request carries the configured type ids, never the prior ones;
    /// only the text and action plan are reused.
    pub fn build_request(&self, evaluation: &Evaluation) -> Option<JustificationRequest> {
        let EligibilityDecision::Accepted { prior } = &evaluation.decision else {
            return None;
        };
        let entry = &evaluation.entry;
        let monitor = &evaluation.monitor;

        Some(JustificationRequest {
            guid_mensagem: monitor.message_id.clone(),
            identificador: monitor.portfolio_id.clone(),
            tipo_monitor: MONITOR_TYPE,
            data_posicao: monitor.position_date.clone(),
            usuario_justificativa: self.config.username.clone(),
            regras: vec![JustifiedRule {
                id_regra: entry.rule_id,
                nome_regra: entry.rule_name.clone().unwrap_or_default(),
                explodida: entry.exploded,
                id_tipo_desenquadramento: self.config.targets.non_compliance_type,
                id_tipo_justificativa: self.config.targets.justification_type,
                ds_justificativa: prior.text.clone(),
                plano_acao: prior.action_plan.clone(),
                dt_prazo_plano: self.deadline,
                opcao_resultado: self.config.result_option,
                resultado: self.config.result_code,
            }],
        })
    }

    /// Submit one accepted evaluation.
    pub async fn submit(&self, evaluation: &Evaluation) -> Option<SubmissionRecord> {
        let request = self.build_request(evaluation)?;
        let entry = &evaluation.entry;
        let portfolio_id = &evaluation.monitor.portfolio_id;

        let outcome = match self.gateway.submit_justification(&request).await {
            Ok(outcome) => {
                if outcome.is_success() {
                    info!(
                        status = outcome.status,
                        portfolio = %portfolio_id,
                        rule_id = entry.rule_id,
                        "Justified rule"
                    );
                } else {
                    warn!(
                        status = outcome.status,
                        portfolio = %portfolio_id,
                        rule_id = entry.rule_id,
                        response = %outcome.response_text,
                        "Justification not accepted upstream"
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                error!(
                    portfolio = %portfolio_id,
                    rule_id = entry.rule_id,
                    error = %e,
                    "Justification request failed"
                );
                None
            }
        };

        Some(SubmissionRecord {
            entry: entry.clone(),
            portfolio_id: portfolio_id.clone(),
            outcome,
        })
    }

    /// Submit every accepted evaluation, in order. Rejected evaluations are
    /// skipped.
    pub async fn submit_all<'a, I>(&self, evaluations: I) -> Vec<SubmissionRecord>
    where
        I: IntoIterator<Item = &'a Evaluation>,
    {
        let mut records = Vec::new();
        for evaluation in evaluations {
            if let Some(record) = self.submit(evaluation).await {
                records.push(record);
            }
        }

        info!(
            submitted = records.len(),
            justified = records.iter().filter(|r| r.is_justified()).count(),
            "Submission pass complete"
        );
        records
    }
}
