//! models/campaign_model.rs
//! Requests/responses de campañas y registros del log de envíos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{account_model::Account, recipient_model::RawRecipient};

/// Mensaje a enviar, igual para todos los destinatarios.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageTemplate {
    pub subject: String,
    /// Cuerpo HTML
    pub body: String,
    /// Alternativa en texto plano; si falta se genera desde `body`
    #[serde(default)]
    pub text_body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartCampaignRequest {
    pub accounts: Vec<Account>,
    pub message: MessageTemplate,

    /// Lista estructurada
    #[serde(default)]
    pub recipients: Vec<RawRecipient>,
    /// Texto pegado, una dirección por línea
    #[serde(default)]
    pub recipients_text: Option<String>,
    /// Contenido tabular (CSV): dirección, nombre opcional
    #[serde(default)]
    pub recipients_table: Option<String>,

    #[serde(default)]
    pub async_send: bool,
    /// Envío programado (RFC 3339). Siempre corre en background.
    #[serde(default)]
    pub send_at: Option<DateTime<Utc>>,

    // Overrides de CampaignSettings
    pub daily_limit: Option<u32>,
    pub send_delay_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub max_rate_limit_retries: Option<u32>,
}

/// Causa de un fallo permanente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Authentication,
    Unclassified,
}

/// Resultado de un intento de entrega a través de una cuenta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    RateLimited(String),
    PermanentFailure { detail: String, cause: FailureCause },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Sent,
    Failed,
    Skipped,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Sent => "sent",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Skipped => "skipped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sent" => Some(AttemptOutcome::Sent),
            "failed" => Some(AttemptOutcome::Failed),
            "skipped" => Some(AttemptOutcome::Skipped),
            _ => None,
        }
    }
}

/// Una fila del log de envíos. Solo se agregan, nunca se modifican.
#[derive(Debug, Clone, Serialize)]
pub struct SendAttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub campaign_id: String,
    pub recipient: String,
    pub account_id: Option<String>,
    pub correlation_id: Option<String>,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
}

/// Enlace correlation id -> destinatario/cuenta, lo consume el tracker externo.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationRecord {
    pub correlation_id: String,
    pub campaign_id: String,
    pub recipient: String,
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    /// Ninguna cuenta elegible (cuota, rate limit o auth)
    Exhausted,
    Stopped,
    NoAccounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// Nunca intentados (agotamiento o stop)
    pub skipped: usize,
    pub invalid_dropped: usize,
    pub duplicate_dropped: usize,
    pub termination: Termination,
}

/// Estado de control de una campaña en curso.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartCampaignResponse {
    pub success: bool,
    pub operation_id: String,
    pub recipients: usize,
    pub summary: Option<CampaignSummary>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatusResponse {
    pub id: String,
    pub status: String,
    pub error: Option<String>,
    /// Solo si la campaña sigue corriendo
    pub control: Option<ControlState>,
    pub summary: Option<CampaignSummary>,
}
