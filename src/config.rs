//! Configuration types, read once from the environment at start.

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::gateway::payloads::Signature;
use crate::pipeline::types::TargetTypes;
use crate::pipeline::whitelist::Whitelist;

/// Timeout for monitor queries and justification submissions.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(40);

/// Timeout for email content and delivery calls.
pub const EMAIL_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the job needs for one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub justification: JustificationConfig,
    pub whitelist: Whitelist,
    pub notification: NotificationConfig,
    /// Evaluate and log only; never submit or email.
    pub dry_run: bool,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let gateway = GatewayConfig {
            endpoints: Endpoints {
                monitor: vars.url("URL_GET_MONITOR")?,
                rule_detail: vars.url("URL_GET_NIVEL2")?,
                flow_validation: vars.url("URL_VALIDAR_FLUXO")?,
                justify: vars.url("URL_JUSTIFICAR")?,
                email_content: vars.url("URL_RECUPERAR_EMAIL")?,
                email_send: vars.url("URL_DCK")?,
            },
            cookie: SecretString::from(vars.required("COOKIE")?),
            crypto_token: SecretString::from(vars.required("XCRYPTO")?),
            query_timeout: QUERY_TIMEOUT,
            email_timeout: EMAIL_TIMEOUT,
        };

        let justification = JustificationConfig {
            targets: TargetTypes {
                justification_type: vars.integer("TIPO_JUST")?,
                non_compliance_type: vars.integer("TIPO_DESEN")?,
            },
            result_code: vars.integer("RESULTADO")?,
            result_option: vars.integer("OPCAO_RES")?,
            username: vars.required("USUARIO")?,
        };

        let whitelist = Whitelist::from_json(&vars.required("WHITELIST")?)
            .map_err(|e| ConfigError::invalid("WHITELIST", e.to_string()))?;

        let recipients = match vars.optional("EMAIL_TO_OVERRIDE") {
            Some(to) => RecipientPolicy::Override {
                to,
                cc: vars.optional("EMAIL_CC_OVERRIDE").unwrap_or_default(),
                bcc: vars.optional("EMAIL_BCC_OVERRIDE").unwrap_or_default(),
            },
            None => RecipientPolicy::FromContent,
        };

        let notification = NotificationConfig {
            from: vars.required("EMAIL_FROM")?,
            recipients,
            signature: Signature {
                nome: vars
                    .optional("EMAIL_SIGNATURE_NAME")
                    .unwrap_or_else(|| "Enquadramento Team".to_string()),
                email: vars.optional("EMAIL_SIGNATURE_EMAIL").unwrap_or_default(),
                setor: vars
                    .optional("EMAIL_SIGNATURE_SECTOR")
                    .unwrap_or_else(|| "Risk & Compliance".to_string()),
                telefone: vars.optional("EMAIL_SIGNATURE_PHONE").unwrap_or_default(),
            },
        };

        let dry_run = match vars.optional("DRY_RUN") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                ConfigError::invalid("DRY_RUN", format!("expected true/false, got {raw:?}"))
            })?,
            None => false,
        };

        Ok(Self {
            gateway,
            justification,
            whitelist,
            notification,
            dry_run,
        })
    }
}

/// Endpoints and credentials for the remote services.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoints: Endpoints,
    pub cookie: SecretString,
    pub crypto_token: SecretString,
    pub query_timeout: Duration,
    pub email_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub monitor: Url,
    pub rule_detail: Url,
    pub flow_validation: Url,
    pub justify: Url,
    pub email_content: Url,
    pub email_send: Url,
}

/// Fixed codes stamped on every submission.
#[derive(Debug, Clone)]
pub struct JustificationConfig {
    pub targets: TargetTypes,
    pub result_code: i64,
    pub result_option: i64,
    /// User the justifications are recorded under.
    pub username: String,
}

/// Who receives the consolidated notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientPolicy {
    /// Use the recipients returned with the email content.
    FromContent,
    /// Send every notification to fixed recipients.
    Override { to: String, cc: String, bcc: String },
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub from: String,
    pub recipients: RecipientPolicy,
    pub signature: Signature,
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn integer(&self, key: &str) -> Result<i64, ConfigError> {
        let raw = self.required(key)?;
        raw.parse()
            .map_err(|_| ConfigError::invalid(key, format!("expected an integer, got {raw:?}")))
    }

    fn url(&self, key: &str) -> Result<Url, ConfigError> {
        let raw = self.required(key)?;
        Url::parse(&raw).map_err(|e| ConfigError::invalid(key, e.to_string()))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Display for RecipientPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromContent => f.write_str("from content"),
            Self::Override { to, .. } => write!(f, "override ({to})"),
        }
    }
}
