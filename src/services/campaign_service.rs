//! services/campaign_service.rs
//! Capa de negocio de campañas: valida la request, crea la operación,
//! arma el runner y lo ejecuta (en línea o en background).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::{provider_config::ProviderRegistry, sender_config::CampaignSettings};
use crate::models::{
    account_model::Account,
    campaign_model::{
        CampaignStatusResponse, CampaignSummary, ControlState, MessageTemplate,
        SendAttemptRecord, StartCampaignRequest, StartCampaignResponse, Termination,
    },
    operation_model::{
        CreateOperationRequest, STATUS_DONE, STATUS_FAILED, STATUS_RUNNING, STATUS_SCHEDULED,
        STATUS_STOPPED,
    },
    recipient_model::{RawRecipient, SanitizedRecipients},
};
use crate::services::{
    account_selector::AccountSelector,
    campaign_runner::{control_channel, CampaignControl, CampaignHandle, CampaignRunner},
    counter_store::DailyCounterStore,
    operation_service::OperationService,
    recipient_service::{parse_pasted_text, parse_tabular, sanitize_recipients},
    send_executor::{MailTransport, SendExecutor},
    send_log_service::SendLogStore,
};

/// Errores de entrada: se devuelven al cliente como 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CampaignInputError {
    #[error("no accounts configured")]
    NoAccounts,
    #[error("duplicate account id: {0}")]
    DuplicateAccount(String),
    #[error("account '{account}' uses unknown provider '{provider}'")]
    UnknownProvider { account: String, provider: String },
    #[error("account '{0}' has an invalid sender address")]
    InvalidSender(String),
    #[error("message subject and body are required")]
    EmptyMessage,
    #[error("no valid recipients after sanitizing")]
    NoRecipients,
    #[error("scheduled time {0} is not in the future")]
    SendAtInPast(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy)]
pub enum ControlAction {
    Pause,
    Resume,
    Stop,
}

#[derive(Clone)]
pub struct CampaignService {
    op_service: OperationService,
    providers: Arc<ProviderRegistry>,
    transport: Arc<dyn MailTransport>,
    counters: Arc<dyn DailyCounterStore>,
    send_log: Arc<dyn SendLogStore>,
    defaults: CampaignSettings,
    running: Arc<Mutex<HashMap<String, CampaignHandle>>>,
}

impl CampaignService {
    pub fn new(
        op_service: OperationService,
        providers: Arc<ProviderRegistry>,
        transport: Arc<dyn MailTransport>,
        counters: Arc<dyn DailyCounterStore>,
        send_log: Arc<dyn SendLogStore>,
        defaults: CampaignSettings,
    ) -> Self {
        Self {
            op_service,
            providers,
            transport,
            counters,
            send_log,
            defaults,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn start_campaign(&self, req: StartCampaignRequest) -> Result<StartCampaignResponse> {
        self.validate_accounts(&req.accounts)?;
        validate_template(&req.message)?;
        let delay = start_delay(req.send_at, Utc::now())?;
        let is_async = req.async_send || delay.is_some();

        let sanitized = sanitize_recipients(collect_raw_recipients(&req));
        if sanitized.recipients.is_empty() {
            return Err(CampaignInputError::NoRecipients.into());
        }
        let settings = self.settings_for(&req);

        let op_id = self
            .op_service
            .create_operation(CreateOperationRequest {
                operation_type: "campaign".to_string(),
                is_async,
                metadata: Some(
                    json!({
                        "accounts": req.accounts.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
                        "recipients": sanitized.recipients.len(),
                        "subject": req.message.subject,
                        "send_at": req.send_at,
                        "settings": settings,
                    })
                    .to_string(),
                ),
            })
            .await?;

        let (handle, control) = control_channel();
        self.lock_running()?.insert(op_id.clone(), handle);

        let recipients = sanitized.recipients.len();
        let runner = self.build_runner(&op_id, req.accounts, settings);

        if is_async {
            let service = self.clone();
            let op_id_clone = op_id.clone();
            let template = req.message;
            let mut control = control;
            tokio::spawn(async move {
                if let Some(delay) = delay {
                    service
                        .wait_for_schedule(&op_id_clone, delay, &mut control)
                        .await;
                }
                match service
                    .execute_campaign(&op_id_clone, runner, template, sanitized, control)
                    .await
                {
                    Ok(_) => log::info!("Async campaign {} finished", op_id_clone),
                    Err(e) => log::error!("Failed async campaign {}: {:#}", op_id_clone, e),
                }
            });

            Ok(StartCampaignResponse {
                success: true,
                operation_id: op_id,
                recipients,
                summary: None,
                message: match req.send_at {
                    Some(at) => format!("Campaign scheduled for {}", at.to_rfc3339()),
                    None => "Campaign queued for async processing".to_string(),
                },
            })
        } else {
            let summary = self
                .execute_campaign(&op_id, runner, req.message, sanitized, control)
                .await?;
            Ok(StartCampaignResponse {
                success: true,
                operation_id: op_id,
                recipients,
                summary: Some(summary),
                message: "Campaign processed".to_string(),
            })
        }
    }

    pub async fn campaign_status(&self, op_id: &str) -> Result<CampaignStatusResponse> {
        let record = self.op_service.get_operation(op_id).await?;
        let control = self.lock_running()?.get(op_id).map(CampaignHandle::state);
        let summary = record
            .metadata
            .as_deref()
            .and_then(|m| serde_json::from_str::<CampaignSummary>(m).ok());

        Ok(CampaignStatusResponse {
            id: record.id,
            status: record.status,
            error: record.error_message,
            control,
            summary,
        })
    }

    /// `None` si la campaña no está corriendo.
    pub fn control(&self, op_id: &str, action: ControlAction) -> Result<Option<ControlState>> {
        let running = self.lock_running()?;
        let Some(handle) = running.get(op_id) else {
            return Ok(None);
        };

        match action {
            ControlAction::Pause => {
                handle.pause();
            }
            ControlAction::Resume => {
                handle.resume();
            }
            ControlAction::Stop => handle.stop(),
        }
        log::info!("(control) Campaña {}: {:?} -> {:?}", op_id, action, handle.state());
        Ok(Some(handle.state()))
    }

    pub async fn list_attempts(&self, op_id: &str) -> Result<Vec<SendAttemptRecord>> {
        self.send_log.list_attempts(op_id).await
    }

    pub async fn sent_today(&self, account_id: &str) -> Result<u32> {
        self.counters.get(account_id).await
    }

    // ========================================================================
    // Privados
    // ========================================================================

    /// Marca la operación como programada y espera. Un stop durante la
    /// espera lo ve el runner en su primer punto de control.
    async fn wait_for_schedule(
        &self,
        op_id: &str,
        delay: Duration,
        control: &mut CampaignControl,
    ) {
        if let Err(e) = self
            .op_service
            .update_operation_status(op_id, STATUS_SCHEDULED, None)
            .await
        {
            log::error!("(wait_for_schedule) Campaña {}: {:#}", op_id, e);
        }
        log::info!(
            "(wait_for_schedule) Campaña {} programada, inicia en {}s",
            op_id,
            delay.as_secs()
        );
        if !control.wait_until(Instant::now() + delay).await {
            log::info!("(wait_for_schedule) Campaña {} detenida antes de iniciar", op_id);
        }
    }

    async fn execute_campaign(
        &self,
        op_id: &str,
        runner: CampaignRunner,
        template: MessageTemplate,
        sanitized: SanitizedRecipients,
        control: CampaignControl,
    ) -> Result<CampaignSummary> {
        let result = match self
            .op_service
            .update_operation_status(op_id, STATUS_RUNNING, None)
            .await
        {
            Ok(()) => runner.run(&template, sanitized, control).await,
            Err(e) => Err(e),
        };

        if let Ok(mut running) = self.lock_running() {
            running.remove(op_id);
        }

        match result {
            Ok(summary) => {
                let status = if summary.termination == Termination::Stopped {
                    STATUS_STOPPED
                } else {
                    STATUS_DONE
                };
                self.op_service
                    .finish_operation(op_id, status, None, Some(serde_json::to_string(&summary)?))
                    .await?;
                Ok(summary)
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.op_service
                    .finish_operation(op_id, STATUS_FAILED, Some(&error), None)
                    .await
                    .context("No se pudo marcar la campaña como fallida")?;
                Err(e.context(format!("Campaign {} failed", op_id)))
            }
        }
    }

    fn build_runner(
        &self,
        op_id: &str,
        accounts: Vec<Account>,
        settings: CampaignSettings,
    ) -> CampaignRunner {
        let selector = AccountSelector::new(accounts, settings.daily_limit, self.counters.clone());
        let executor = SendExecutor::new(
            self.providers.clone(),
            self.transport.clone(),
            self.counters.clone(),
            settings.tracking_base_url.clone(),
        );
        CampaignRunner::new(
            op_id.to_string(),
            selector,
            executor,
            self.send_log.clone(),
            settings,
        )
    }

    fn validate_accounts(&self, accounts: &[Account]) -> Result<(), CampaignInputError> {
        if accounts.is_empty() {
            return Err(CampaignInputError::NoAccounts);
        }

        let mut seen = HashSet::new();
        for account in accounts {
            if !seen.insert(account.id.as_str()) {
                return Err(CampaignInputError::DuplicateAccount(account.id.clone()));
            }
            if self.providers.resolve(&account.provider).is_none() {
                return Err(CampaignInputError::UnknownProvider {
                    account: account.id.clone(),
                    provider: account.provider.clone(),
                });
            }
            if account.sender_address().parse::<lettre::Address>().is_err() {
                return Err(CampaignInputError::InvalidSender(account.id.clone()));
            }
        }
        Ok(())
    }

    fn settings_for(&self, req: &StartCampaignRequest) -> CampaignSettings {
        let d = &self.defaults;
        CampaignSettings {
            daily_limit: req.daily_limit.unwrap_or(d.daily_limit),
            send_delay_ms: req.send_delay_ms.unwrap_or(d.send_delay_ms),
            batch_size: req.batch_size.unwrap_or(d.batch_size),
            batch_delay_ms: req.batch_delay_ms.unwrap_or(d.batch_delay_ms),
            max_rate_limit_retries: req.max_rate_limit_retries.unwrap_or(d.max_rate_limit_retries),
            tracking_base_url: d.tracking_base_url.clone(),
        }
    }

    fn lock_running(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, CampaignHandle>>> {
        self.running
            .lock()
            .map_err(|_| anyhow!("Registro de campañas envenenado"))
    }
}

/// `None` = arrancar ya. Una hora pasada (o ahora mismo) es un error.
fn start_delay(
    send_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<Duration>, CampaignInputError> {
    let Some(at) = send_at else {
        return Ok(None);
    };
    match (at - now).to_std() {
        Ok(delay) if !delay.is_zero() => Ok(Some(delay)),
        _ => Err(CampaignInputError::SendAtInPast(at)),
    }
}

fn validate_template(template: &MessageTemplate) -> Result<(), CampaignInputError> {
    if template.subject.trim().is_empty() || template.body.trim().is_empty() {
        return Err(CampaignInputError::EmptyMessage);
    }
    Ok(())
}

/// Une las tres fuentes en orden: lista estructurada, texto pegado, tabla.
fn collect_raw_recipients(req: &StartCampaignRequest) -> Vec<RawRecipient> {
    let mut raw = req.recipients.clone();
    if let Some(text) = &req.recipients_text {
        raw.extend(parse_pasted_text(text));
    }
    if let Some(table) = &req.recipients_table {
        raw.extend(parse_tabular(table));
    }
    raw
}
