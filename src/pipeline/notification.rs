//! Notification grouper: one consolidated email per message group.
//!
//! Groups are handled independently: a failure fetching content or sending
//! for one group is logged and the next group proceeds.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{NotificationConfig, RecipientPolicy};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::gateway::payloads::{
    EmailContent, EmailContentRequest, EmailPayload, MONITOR_TYPE, OutgoingAttachment, RuleResult,
};
use crate::pipeline::eligibility::MonitorIndex;
use crate::pipeline::format::format_percentages;
use crate::pipeline::submission::SubmissionRecord;
use crate::pipeline::types::{MonitorEntry, RuleDetailEntry, TargetTypes};

const DEFAULT_SUBJECT: &str = "(no subject)";
const DEFAULT_ATTACHMENT_NAME: &str = "attachment.xlsx";

/// Justified entries sharing one message group.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationGroup {
    pub message_id: String,
    pub entries: Vec<RuleDetailEntry>,
}

/// Partition justified records by message id, in first-seen order.
pub fn group_justified(records: &[SubmissionRecord]) -> Vec<NotificationGroup> {
    let mut groups: Vec<NotificationGroup> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for record in records.iter().filter(|r| r.is_justified()) {
        let message_id = record.entry.message_id.as_str();
        match positions.get(message_id) {
            Some(&i) => groups[i].entries.push(record.entry.clone()),
            None => {
                positions.insert(message_id, groups.len());
                groups.push(NotificationGroup {
                    message_id: message_id.to_string(),
                    entries: vec![record.entry.clone()],
                });
            }
        }
    }
    groups
}

/// Per-group delivery results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationSummary {
    pub notified: usize,
    pub failed: usize,
    pub unresolved: usize,
}

pub struct Notifier {
    gateway: Arc<dyn Gateway>,
    config: NotificationConfig,
    targets: TargetTypes,
    result_code: i64,
}

impl Notifier {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        config: NotificationConfig,
        targets: TargetTypes,
        result_code: i64,
    ) -> Self {
        Self {
            gateway,
            config,
            targets,
            result_code,
        }
    }

    pub fn content_request(
        &self,
        group: &NotificationGroup,
        monitor: &MonitorEntry,
    ) -> EmailContentRequest {
        EmailContentRequest {
            guid_mensagem: group.message_id.clone(),
            identificador: monitor.portfolio_id.clone(),
            tipo_monitor: MONITOR_TYPE,
            data_posicao: monitor.position_date.clone(),
            id_tipo_justificativa: self.targets.justification_type,
            id_tipo_desenquadramento: self.targets.non_compliance_type,
            regras: group
                .entries
                .iter()
                .map(|e| RuleResult {
                    id_regra: e.rule_id,
                    resultado: self.result_code,
                })
                .collect(),
        }
    }

    /// Assemble the outgoing message from the rendered content.
    pub fn payload(&self, content: EmailContent) -> EmailPayload {
        let (email_to, email_cc, email_bcc) = match &self.config.recipients {
            RecipientPolicy::Override { to, cc, bcc } => (to.clone(), cc.clone(), bcc.clone()),
            RecipientPolicy::FromContent => (
                content.to.unwrap_or_default(),
                content.cc.unwrap_or_default(),
                content.bcc.unwrap_or_default(),
            ),
        };

        let anexos = content
            .attachments
            .into_iter()
            .filter_map(|a| {
                let conteudo = a.content.filter(|c| !c.is_empty())?;
                Some(OutgoingAttachment {
                    conteudo,
                    nome: a
                        .name
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string()),
                })
            })
            .collect();

        EmailPayload {
            email_from: self.config.from.clone(),
            email_to,
            email_cc,
            email_bcc,
            subject: content
                .subject
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            body: format_percentages(&content.body.unwrap_or_default()),
            assinatura: self.config.signature.clone(),
            anexos,
            nome_sistema: 0,
        }
    }

    /// Fetch content and send the email for one group. Returns the delivery
    /// status.
    pub async fn notify(
        &self,
        group: &NotificationGroup,
        monitor: &MonitorEntry,
    ) -> Result<u16, GatewayError> {
        let request = self.content_request(group, monitor);
        let content = self.gateway.fetch_email_content(&request).await?;
        let payload = self.payload(content);
        self.gateway.send_email(&payload).await
    }

    pub async fn notify_all(
        &self,
        groups: &[NotificationGroup],
        monitor: &MonitorIndex,
    ) -> NotificationSummary {
        let mut summary = NotificationSummary::default();

        for group in groups {
            let Some(parent) = monitor.get(&group.message_id) else {
                warn!(
                    message_id = %group.message_id,
                    "Justified group has no flagged position, skipping email"
                );
                summary.unresolved += 1;
                continue;
            };

            match self.notify(group, parent).await {
                Ok(status) if (200..300).contains(&status) => {
                    info!(
                        status,
                        portfolio = %parent.portfolio_id,
                        rules = group.entries.len(),
                        message_id = %group.message_id,
                        "Email sent"
                    );
                    summary.notified += 1;
                }
                Ok(status) => {
                    warn!(
                        status,
                        portfolio = %parent.portfolio_id,
                        message_id = %group.message_id,
                        "Email delivery rejected"
                    );
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(
                        portfolio = %parent.portfolio_id,
                        message_id = %group.message_id,
                        error = %e,
                        "Email notification failed"
                    );
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
