//! HTTP implementation of the gateway over the monitor and email services.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Url};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::gateway::payloads::{
    EmailContent, EmailContentRequest, EmailPayload, FlowValidationResponse, JustificationRequest,
    MonitorQuery, PriorJustificationQuery, RuleDetailQuery,
};
use crate::pipeline::types::{
    MonitorEntry, PositionDate, PriorLookup, RuleDetailEntry, SubmissionOutcome,
};

const CRYPTO_TOKEN_HEADER: &str = "x-crypto-token";

/// Gateway backed by `reqwest`.
///
/// Monitor and justification calls go through a client carrying the auth
/// headers; email calls use a plain client with a longer timeout.
pub struct HttpGateway {
    config: GatewayConfig,
    query_client: Client,
    email_client: Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let query_client = Client::builder()
            .default_headers(auth_headers(&config)?)
            .timeout(config.query_timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        let email_client = Client::builder()
            .timeout(config.email_timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            config,
            query_client,
            email_client,
        })
    }

    /// POST a JSON body and decode the JSON reply. An empty reply body
    /// decodes as the type's default.
    async fn post_json<B, T>(
        &self,
        client: &Client,
        endpoint: &'static str,
        url: &Url,
        body: &B,
    ) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let response = client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| request_error(endpoint, e))?;
        if text.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::Decode {
            endpoint,
            reason: e.to_string(),
        })
    }
}

fn auth_headers(config: &GatewayConfig) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("auto-justify/", env!("CARGO_PKG_VERSION"))),
    );
    headers.insert(COOKIE, secret_header("COOKIE", config.cookie.expose_secret())?);
    headers.insert(
        HeaderName::from_static(CRYPTO_TOKEN_HEADER),
        secret_header("XCRYPTO", config.crypto_token.expose_secret())?,
    );
    Ok(headers)
}

fn secret_header(name: &str, value: &str) -> Result<HeaderValue, GatewayError> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| GatewayError::Client(format!("{name} is not a valid header value")))?;
    header.set_sensitive(true);
    Ok(header)
}

fn request_error(endpoint: &'static str, err: reqwest::Error) -> GatewayError {
    let reason = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    GatewayError::Request { endpoint, reason }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch_flagged_positions(&self) -> Result<Vec<MonitorEntry>, GatewayError> {
        let entries: Vec<MonitorEntry> = self
            .post_json(
                &self.query_client,
                "get-monitor",
                &self.config.endpoints.monitor,
                &MonitorQuery::default(),
            )
            .await?;
        debug!(count = entries.len(), "Fetched flagged positions");
        Ok(entries)
    }

    async fn fetch_rule_detail(
        &self,
        portfolio_id: &str,
        position_date: &PositionDate,
    ) -> Result<Vec<RuleDetailEntry>, GatewayError> {
        self.post_json(
            &self.query_client,
            "get-nivel2",
            &self.config.endpoints.rule_detail,
            &RuleDetailQuery::new(portfolio_id, position_date),
        )
        .await
    }

    async fn fetch_prior_justification(
        &self,
        portfolio_id: &str,
        position_date: &PositionDate,
        rule_id: i64,
        exploded: bool,
    ) -> PriorLookup {
        let query = PriorJustificationQuery::new(portfolio_id, position_date, rule_id, exploded);
        let result: Result<FlowValidationResponse, GatewayError> = self
            .post_json(
                &self.query_client,
                "validar-fluxo",
                &self.config.endpoints.flow_validation,
                &query,
            )
            .await;

        match result {
            Ok(response) => response.into_lookup(),
            Err(e) => {
                if e.is_auth_failure() {
                    error!(
                        portfolio = %portfolio_id,
                        rule_id,
                        error = %e,
                        "Prior justification lookup rejected credentials"
                    );
                } else {
                    warn!(
                        portfolio = %portfolio_id,
                        rule_id,
                        error = %e,
                        "Prior justification lookup failed"
                    );
                }
                PriorLookup::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn submit_justification(
        &self,
        request: &JustificationRequest,
    ) -> Result<SubmissionOutcome, GatewayError> {
        let response = self
            .query_client
            .post(self.config.endpoints.justify.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| request_error("justificar", e))?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Ok(SubmissionOutcome::new(status, &text))
    }

    async fn fetch_email_content(
        &self,
        request: &EmailContentRequest,
    ) -> Result<EmailContent, GatewayError> {
        self.post_json(
            &self.email_client,
            "recuperar-email",
            &self.config.endpoints.email_content,
            request,
        )
        .await
    }

    async fn send_email(&self, payload: &EmailPayload) -> Result<u16, GatewayError> {
        let response = self
            .email_client
            .post(self.config.endpoints.email_send.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| request_error("dck", e))?;
        Ok(response.status().as_u16())
    }
}
