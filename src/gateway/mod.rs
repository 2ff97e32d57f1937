//! Remote data gateway: every call the job makes to the outside world.
//!
//! The pipeline stages only see the [`Gateway`] trait; [`HttpGateway`] is the
//! production implementation over the monitor and email HTTP services.

pub mod http;
pub mod payloads;

pub use http::HttpGateway;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::gateway::payloads::{EmailContent, EmailContentRequest, EmailPayload, JustificationRequest};
use crate::pipeline::types::{MonitorEntry, PositionDate, PriorLookup, RuleDetailEntry, SubmissionOutcome};

/// Trait for the remote monitor and notification services: pure I/O, no
/// business logic.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Non-compliant, non-justified positions of liquid funds.
    async fn fetch_flagged_positions(&self) -> Result<Vec<MonitorEntry>, GatewayError>;

    /// Level-2 rule detail for one portfolio on one date.
    async fn fetch_rule_detail(
        &self,
        portfolio_id: &str,
        position_date: &PositionDate,
    ) -> Result<Vec<RuleDetailEntry>, GatewayError>;

    /// Previous justification for a rule. Never fails: a failed lookup is
    /// reported as [`PriorLookup::Unavailable`].
    async fn fetch_prior_justification(
        &self,
        portfolio_id: &str,
        position_date: &PositionDate,
        rule_id: i64,
        exploded: bool,
    ) -> PriorLookup;

    /// Submit a justification. Any HTTP status is an `Ok` outcome; only
    /// transport failures are errors.
    async fn submit_justification(
        &self,
        request: &JustificationRequest,
    ) -> Result<SubmissionOutcome, GatewayError>;

    /// Rendered email content for one message group.
    async fn fetch_email_content(
        &self,
        request: &EmailContentRequest,
    ) -> Result<EmailContent, GatewayError>;

    /// Deliver an email, returning the delivery service's HTTP status.
    async fn send_email(&self, payload: &EmailPayload) -> Result<u16, GatewayError>;
}
