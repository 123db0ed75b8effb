//! services/send_executor.rs
//! Un intento de entrega por una cuenta, con clasificación del resultado.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    transport::smtp::{authentication::Credentials, client::Tls, client::TlsParameters},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::config::provider_config::{ProviderConfig, ProviderRegistry, TransportSecurity};
use crate::models::{
    account_model::Account,
    campaign_model::{FailureCause, MessageTemplate, SendOutcome},
    recipient_model::Recipient,
};
use crate::services::{counter_store::DailyCounterStore, message_builder::build_message};

/// Tiempo máximo por envío SMTP
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Códigos de respuesta SMTP que indican límite de envío de la cuenta.
const RATE_LIMIT_CODES: &[u16] = &[421, 450, 451];
/// Códigos extendidos (RFC 3463) de límite de envío.
const RATE_LIMIT_ENHANCED: &[&str] = &["4.7.0", "4.7.28", "5.4.5"];
const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many",
    "sending quota",
    "sending limit",
    "limit exceeded",
    "try again later",
    "temporarily deferred",
];

const AUTH_CODES: &[u16] = &[530, 534, 535];
const AUTH_ENHANCED: &[&str] = &["5.7.8", "5.7.9"];
const AUTH_PHRASES: &[&str] = &[
    "authentication failed",
    "authentication required",
    "auth failed",
    "username and password not accepted",
    "invalid credentials",
    "bad credentials",
];

lazy_static! {
    // Código de respuesta al inicio ("421 ..." o "permanent error (550): ...")
    // y, si sigue inmediatamente, el código extendido.
    static ref REPLY_PATTERN: Regex = Regex::new(
        r"(?i)^\s*(?:(?:transient|permanent) error \()?([2-5]\d{2})\b\)?[\s:-]*(?:([245]\.\d{1,3}\.\d{1,3})\b)?"
    )
    .expect("REPLY_PATTERN es una regex válida");
}

/// Error del transporte: respuesta del servidor (si la hubo) y texto completo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct TransportError {
    pub code: Option<u16>,
    pub enhanced: Option<String>,
    pub detail: String,
}

impl TransportError {
    /// Toma los códigos solo del comienzo del texto; las direcciones del
    /// resto del mensaje pueden contener dígitos.
    pub fn new(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let (code, enhanced) = match REPLY_PATTERN.captures(&detail) {
            Some(caps) => (
                caps.get(1).and_then(|m| m.as_str().parse().ok()),
                caps.get(2).map(|m| m.as_str().to_string()),
            ),
            None => (None, None),
        };
        Self {
            code,
            enhanced,
            detail,
        }
    }

    /// Igual que `new`, pero con el código que reportó el cliente SMTP.
    pub fn with_code(code: Option<u16>, detail: impl Into<String>) -> Self {
        let mut error = Self::new(detail);
        if code.is_some() {
            error.code = code;
        }
        error
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(
        &self,
        account: &Account,
        provider: &ProviderConfig,
        message: Message,
    ) -> Result<(), TransportError>;
}

/// Transporte real: lettre async sobre tokio.
#[derive(Debug, Clone, Default)]
pub struct SmtpMailTransport;

impl SmtpMailTransport {
    fn build_mailer(
        account: &Account,
        provider: &ProviderConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let builder = match provider.security {
            TransportSecurity::Implicit => {
                let tls = TlsParameters::new(provider.host.clone())
                    .map_err(|e| TransportError::new(e.to_string()))?;
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&provider.host)
                    .tls(Tls::Wrapper(tls))
            }
            TransportSecurity::StartTls => {
                let tls = TlsParameters::new(provider.host.clone())
                    .map_err(|e| TransportError::new(e.to_string()))?;
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&provider.host)
                    .tls(Tls::Required(tls))
            }
            TransportSecurity::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&provider.host)
            }
        };

        Ok(builder
            .port(provider.port)
            .credentials(Credentials::new(account.id.clone(), account.secret.clone()))
            .timeout(Some(SEND_TIMEOUT))
            .build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(
        &self,
        account: &Account,
        provider: &ProviderConfig,
        message: Message,
    ) -> Result<(), TransportError> {
        let mailer = Self::build_mailer(account, provider)?;

        match tokio::time::timeout(SEND_TIMEOUT, mailer.send(message)).await {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(e)) => {
                let code = e.status().and_then(|c| c.to_string().parse().ok());
                Err(TransportError::with_code(code, e.to_string()))
            }
            Err(_) => Err(TransportError::new(format!(
                "timeout tras {}s esperando a {}",
                SEND_TIMEOUT.as_secs(),
                provider.host
            ))),
        }
    }
}

/// Clasifica un error de transporte. Primero los códigos SMTP, después
/// las frases. Rate limit se evalúa antes que auth: "421 too many login
/// attempts" es rate limit.
pub fn classify_error(error: &TransportError) -> SendOutcome {
    let lowered = error.detail.to_lowercase();
    let has_code = |codes: &[u16]| error.code.is_some_and(|c| codes.contains(&c));
    let has_enhanced =
        |codes: &[&str]| error.enhanced.as_deref().is_some_and(|e| codes.contains(&e));
    let has_phrase = |phrases: &[&str]| phrases.iter().any(|p| lowered.contains(p));

    if has_code(RATE_LIMIT_CODES)
        || has_enhanced(RATE_LIMIT_ENHANCED)
        || has_phrase(RATE_LIMIT_PHRASES)
    {
        return SendOutcome::RateLimited(error.detail.clone());
    }

    let cause = if has_code(AUTH_CODES) || has_enhanced(AUTH_ENHANCED) || has_phrase(AUTH_PHRASES)
    {
        FailureCause::Authentication
    } else {
        FailureCause::Unclassified
    };
    SendOutcome::PermanentFailure {
        detail: error.detail.clone(),
        cause,
    }
}

#[derive(Clone)]
pub struct SendExecutor {
    providers: Arc<ProviderRegistry>,
    transport: Arc<dyn MailTransport>,
    counters: Arc<dyn DailyCounterStore>,
    tracking_base_url: Option<String>,
}

impl SendExecutor {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        transport: Arc<dyn MailTransport>,
        counters: Arc<dyn DailyCounterStore>,
        tracking_base_url: Option<String>,
    ) -> Self {
        Self {
            providers,
            transport,
            counters,
            tracking_base_url,
        }
    }

    /// Un solo intento. Solo devuelve `Err` si falla el contador: eso
    /// tiene que cortar la campaña, no contarse como un envío fallido.
    pub async fn execute(
        &self,
        template: &MessageTemplate,
        account: &Account,
        recipient: &Recipient,
        correlation_id: &str,
    ) -> Result<SendOutcome> {
        let Some(provider) = self.providers.resolve(&account.provider) else {
            return Ok(SendOutcome::PermanentFailure {
                detail: format!("Proveedor desconocido: {}", account.provider),
                cause: FailureCause::Unclassified,
            });
        };

        let message = match build_message(
            template,
            account,
            recipient,
            correlation_id,
            self.tracking_base_url.as_deref(),
        ) {
            Ok(m) => m,
            Err(e) => {
                return Ok(SendOutcome::PermanentFailure {
                    detail: format!("{:#}", e),
                    cause: FailureCause::Unclassified,
                })
            }
        };

        match self.transport.deliver(account, provider, message).await {
            Ok(()) => {
                let count = self.counters.increment(&account.id, 1).await?;
                log::info!(
                    "(execute) {} -> {} entregado ({} hoy)",
                    account.id,
                    recipient.address,
                    count
                );
                Ok(SendOutcome::Delivered)
            }
            Err(e) => {
                let outcome = classify_error(&e);
                log::warn!(
                    "(execute) {} -> {} falló: {} ({:?})",
                    account.id,
                    recipient.address,
                    e,
                    outcome_kind(&outcome)
                );
                Ok(outcome)
            }
        }
    }
}

fn outcome_kind(outcome: &SendOutcome) -> &'static str {
    match outcome {
        SendOutcome::Delivered => "delivered",
        SendOutcome::RateLimited(_) => "rate_limited",
        SendOutcome::PermanentFailure {
            cause: FailureCause::Authentication,
            ..
        } => "auth_failure",
        SendOutcome::PermanentFailure { .. } => "unclassified",
    }
}
