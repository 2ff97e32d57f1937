//! Run driver: one stateless pass over a snapshot of monitor data.
//!
//! Only the initial flagged-position fetch is fatal. Rule detail failures are
//! contained per portfolio, submissions per entry, emails per group.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::RunError;
use crate::gateway::Gateway;
use crate::pipeline::eligibility::{EligibilityEngine, MonitorIndex};
use crate::pipeline::notification::{NotificationSummary, Notifier, group_justified};
use crate::pipeline::submission::SubmissionRunner;
use crate::pipeline::types::{MonitorEntry, RejectionReason, RuleDetailEntry};
use crate::pipeline::whitelist::Whitelist;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub flagged_positions: usize,
    pub detail_fetches: usize,
    pub detail_fetch_failures: usize,
    pub detail_entries: usize,
    pub whitelisted: usize,
    pub unlinked: usize,
    pub accepted: usize,
    pub rejected: BTreeMap<RejectionReason, usize>,
    pub submitted: usize,
    pub justified: usize,
    pub submission_failures: usize,
    pub notifications: NotificationSummary,
    pub dry_run: bool,
}

pub struct JustificationRun {
    gateway: Arc<dyn Gateway>,
    whitelist: Whitelist,
    engine: EligibilityEngine,
    submissions: SubmissionRunner,
    notifier: Notifier,
    dry_run: bool,
}

impl JustificationRun {
    /// `run_date` is stamped as the action-plan deadline on submissions.
    pub fn new(gateway: Arc<dyn Gateway>, config: AppConfig, run_date: NaiveDate) -> Self {
        let targets = config.justification.targets;
        let result_code = config.justification.result_code;
        Self {
            engine: EligibilityEngine::new(Arc::clone(&gateway), targets),
            submissions: SubmissionRunner::new(
                Arc::clone(&gateway),
                config.justification,
                run_date,
            ),
            notifier: Notifier::new(
                Arc::clone(&gateway),
                config.notification,
                targets,
                result_code,
            ),
            whitelist: config.whitelist,
            dry_run: config.dry_run,
            gateway,
        }
    }

    pub async fn execute(&self) -> Result<RunReport, RunError> {
        let mut report = RunReport {
            dry_run: self.dry_run,
            ..RunReport::default()
        };

        let monitor = self
            .gateway
            .fetch_flagged_positions()
            .await
            .map_err(RunError::FlaggedPositions)?;
        report.flagged_positions = monitor.len();
        info!(count = monitor.len(), "Fetched flagged positions");

        let details = self.fetch_details(&monitor, &mut report).await;
        report.detail_entries = details.len();

        let candidates = self.whitelist.filter(&details);
        report.whitelisted = candidates.len();

        let index = MonitorIndex::new(&monitor);
        let eligibility = self.engine.evaluate_all(&candidates, &index).await;
        report.unlinked = eligibility.unlinked;
        for evaluation in &eligibility.evaluations {
            match evaluation.decision.rejection_reason() {
                None => report.accepted += 1,
                Some(reason) => *report.rejected.entry(reason).or_default() += 1,
            }
        }

        if self.dry_run {
            for evaluation in eligibility.accepted() {
                info!(
                    portfolio = %evaluation.monitor.portfolio_id,
                    rule_id = evaluation.entry.rule_id,
                    message_id = %evaluation.entry.message_id,
                    "Dry run: would justify rule"
                );
            }
            log_report(&report);
            return Ok(report);
        }

        let records = self.submissions.submit_all(eligibility.accepted()).await;
        report.submitted = records.len();
        report.justified = records.iter().filter(|r| r.is_justified()).count();
        report.submission_failures = report.submitted - report.justified;

        let groups = group_justified(&records);
        report.notifications = self.notifier.notify_all(&groups, &index).await;

        log_report(&report);
        Ok(report)
    }

    /// Rule detail for every in-scope flagged position, one fetch per
    /// distinct (portfolio, date). Entries are stamped with the portfolio
    /// they were fetched for.
    async fn fetch_details(
        &self,
        monitor: &[MonitorEntry],
        report: &mut RunReport,
    ) -> Vec<RuleDetailEntry> {
        let mut seen = HashSet::new();
        let mut details = Vec::new();

        for position in self.whitelist.scoped_positions(monitor) {
            if !seen.insert((&position.portfolio_id, &position.position_date)) {
                continue;
            }
            report.detail_fetches += 1;

            match self
                .gateway
                .fetch_rule_detail(&position.portfolio_id, &position.position_date)
                .await
            {
                Ok(entries) => {
                    details.extend(entries.into_iter().map(|mut e| {
                        e.source_portfolio = position.portfolio_id.clone();
                        e
                    }));
                }
                Err(e) => {
                    warn!(
                        portfolio = %position.portfolio_id,
                        position_date = %position.position_date,
                        error = %e,
                        "Failed to fetch rule detail, skipping portfolio"
                    );
                    report.detail_fetch_failures += 1;
                }
            }
        }
        details
    }
}

fn log_report(report: &RunReport) {
    let rejected: usize = report.rejected.values().sum();
    info!(
        flagged = report.flagged_positions,
        whitelisted = report.whitelisted,
        unlinked = report.unlinked,
        accepted = report.accepted,
        rejected,
        justified = report.justified,
        submission_failures = report.submission_failures,
        emails_sent = report.notifications.notified,
        email_failures = report.notifications.failed,
        dry_run = report.dry_run,
        "Justification run complete"
    );
}
