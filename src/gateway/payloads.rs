//! Request and response bodies exchanged with the monitor and email services.
//!
//! Field names follow the upstream JSON contract.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pipeline::types::{PositionDate, PriorJustification, PriorLookup};

/// Monitor type sent on every justification and email request.
pub const MONITOR_TYPE: &str = "E";

/// Fund type filter selecting liquid funds.
pub const LIQUID_FUNDS: i32 = 2;

// ── Monitor queries ─────────────────────────────────────────────────

/// Filter for the flagged-position listing: liquid funds, not justified,
/// not compliant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorQuery {
    pub cges: Option<Vec<String>>,
    pub id_regra_list: Option<Vec<i64>>,
    pub id_grupo_list: Option<Vec<i64>>,
    pub tipo_fundo: i32,
    pub tipo_posicao: i32,
    /// 1 = only not justified.
    pub justificado: i32,
    /// 1 = only not compliant.
    pub enquadrado: i32,
    pub data: Option<String>,
    pub por_execucao: bool,
    pub possui_data_posicao: bool,
    pub id_sistema: i32,
    pub condominio: i32,
    pub exclusividade: i32,
}

impl Default for MonitorQuery {
    fn default() -> Self {
        Self {
            cges: None,
            id_regra_list: None,
            id_grupo_list: None,
            tipo_fundo: LIQUID_FUNDS,
            tipo_posicao: 1,
            justificado: 1,
            enquadrado: 1,
            data: None,
            por_execucao: true,
            possui_data_posicao: false,
            id_sistema: 1,
            condominio: 3,
            exclusividade: 3,
        }
    }
}

/// Level-2 rule detail query for one portfolio and date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDetailQuery {
    pub cge_portfolio: String,
    pub id_regra_list: Option<Vec<i64>>,
    pub id_grupo_list: Option<Vec<i64>>,
    pub tipo_fundo: i32,
    pub tipo_posicao: i32,
    pub exibir_todas_regras: bool,
    pub justificado: i32,
    pub enquadrado: i32,
    pub data: PositionDate,
    pub id_sistema: i32,
}

impl RuleDetailQuery {
    pub fn new(portfolio_id: &str, position_date: &PositionDate) -> Self {
        Self {
            cge_portfolio: portfolio_id.to_string(),
            id_regra_list: None,
            id_grupo_list: None,
            tipo_fundo: LIQUID_FUNDS,
            tipo_posicao: 1,
            exibir_todas_regras: false,
            justificado: 1,
            enquadrado: 1,
            data: position_date.clone(),
            id_sistema: 1,
        }
    }
}

// ── Prior justification ─────────────────────────────────────────────

/// Flow validation request used to look up the previous justification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorJustificationQuery {
    pub identificador: String,
    pub data_posicao: PositionDate,
    /// "F" = fund calculation.
    pub tipo_calculo: &'static str,
    pub regras: Vec<RuleRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRef {
    pub id_regra: i64,
    pub explodida: bool,
}

impl PriorJustificationQuery {
    pub fn new(portfolio_id: &str, position_date: &PositionDate, rule_id: i64, exploded: bool) -> Self {
        Self {
            identificador: portfolio_id.to_string(),
            data_posicao: position_date.clone(),
            tipo_calculo: "F",
            regras: vec![RuleRef {
                id_regra: rule_id,
                explodida: exploded,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowValidationResponse {
    #[serde(default, rename = "regrasJustificadasDMenos1")]
    pub previous_day: Option<Vec<PreviousDayJustification>>,
    #[serde(default)]
    pub justificativa_atrasada: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousDayJustification {
    #[serde(default)]
    pub ds_justificativa: Option<String>,
    #[serde(default)]
    pub plano_acao: Option<String>,
    #[serde(default)]
    pub id_tipo_justificativa: Option<serde_json::Value>,
    #[serde(default)]
    pub id_tipo_desenquadramento: Option<serde_json::Value>,
}

impl FlowValidationResponse {
    /// First D-1 justification wins; otherwise fall back to the delayed text.
    pub fn into_lookup(self) -> PriorLookup {
        match self.previous_day.and_then(|list| list.into_iter().next()) {
            Some(previous) => PriorLookup::Found(PriorJustification {
                text: previous.ds_justificativa.unwrap_or_default(),
                action_plan: previous.plano_acao.unwrap_or_default(),
                justification_type: previous.id_tipo_justificativa,
                non_compliance_type: previous.id_tipo_desenquadramento,
            }),
            None => PriorLookup::Delayed {
                text: self.justificativa_atrasada.unwrap_or_default(),
            },
        }
    }
}

// ── Justification ───────────────────────────────────────────────────

/// Justification submission for one rule of one flagged event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JustificationRequest {
    pub guid_mensagem: String,
    pub identificador: String,
    pub tipo_monitor: &'static str,
    pub data_posicao: PositionDate,
    pub usuario_justificativa: String,
    pub regras: Vec<JustifiedRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JustifiedRule {
    pub id_regra: i64,
    pub nome_regra: String,
    pub explodida: bool,
    pub id_tipo_desenquadramento: i64,
    pub id_tipo_justificativa: i64,
    pub ds_justificativa: String,
    pub plano_acao: String,
    pub dt_prazo_plano: NaiveDate,
    pub opcao_resultado: i64,
    pub resultado: i64,
}

// ── Email ───────────────────────────────────────────────────────────

/// Request for the consolidated email of one message group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailContentRequest {
    pub guid_mensagem: String,
    pub identificador: String,
    pub tipo_monitor: &'static str,
    pub data_posicao: PositionDate,
    pub id_tipo_justificativa: i64,
    pub id_tipo_desenquadramento: i64,
    pub regras: Vec<RuleResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub id_regra: i64,
    pub resultado: i64,
}

/// Rendered email returned by the content service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EmailContent {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default, rename = "anexos")]
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAttachment {
    #[serde(default, rename = "conteudo")]
    pub content: Option<String>,
    #[serde(default, rename = "nome")]
    pub name: Option<String>,
}

/// Message handed to the delivery service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPayload {
    pub email_from: String,
    pub email_to: String,
    pub email_cc: String,
    pub email_bcc: String,
    pub subject: String,
    pub body: String,
    pub assinatura: Signature,
    pub anexos: Vec<OutgoingAttachment>,
    pub nome_sistema: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signature {
    pub nome: String,
    pub email: String,
    pub setor: String,
    pub telefone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingAttachment {
    pub conteudo: String,
    pub nome: String,
}
