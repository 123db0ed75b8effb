//! services/campaign_runner.rs
//! Loop de campaña: recorre los destinatarios en orden, uno a la vez.
//!
//! Pausa y stop llegan por un canal `watch` y se revisan solo entre
//! destinatarios; un envío en curso siempre termina antes de frenar.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::sender_config::CampaignSettings;
use crate::models::{
    campaign_model::{
        AttemptOutcome, CampaignSummary, ControlState, CorrelationRecord, FailureCause,
        MessageTemplate, SendAttemptRecord, SendOutcome, Termination,
    },
    recipient_model::{Recipient, SanitizedRecipients},
};
use crate::services::{
    account_selector::{AccountSelector, Selection},
    send_executor::SendExecutor,
    send_log_service::SendLogStore,
};

/// Lado de quien controla la campaña (handler HTTP, CLI, tests).
#[derive(Clone)]
pub struct CampaignHandle {
    tx: Arc<watch::Sender<ControlState>>,
}

/// Lado del loop.
pub struct CampaignControl {
    rx: watch::Receiver<ControlState>,
}

pub fn control_channel() -> (CampaignHandle, CampaignControl) {
    let (tx, rx) = watch::channel(ControlState::Running);
    (CampaignHandle { tx: Arc::new(tx) }, CampaignControl { rx })
}

impl CampaignHandle {
    /// Devuelve false si la campaña no estaba corriendo.
    pub fn pause(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Running {
                *state = ControlState::Paused;
                true
            } else {
                false
            }
        })
    }

    pub fn resume(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Paused {
                *state = ControlState::Running;
                true
            } else {
                false
            }
        })
    }

    pub fn stop(&self) {
        self.tx.send_replace(ControlState::Stopped);
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }
}

impl CampaignControl {
    /// Espera hasta `deadline` (campañas programadas). Devuelve `false` si
    /// llega un stop antes; una pausa no cambia la espera.
    pub async fn wait_until(&mut self, deadline: Instant) -> bool {
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            if *self.rx.borrow_and_update() == ControlState::Stopped {
                return false;
            }
            tokio::select! {
                _ = &mut sleep => return true,
                changed = self.rx.changed() => {
                    // Sin handle nadie puede detenerla: solo queda esperar
                    if changed.is_err() {
                        (&mut sleep).await;
                        return true;
                    }
                }
            }
        }
    }

    /// Punto de control entre destinatarios. Bloquea mientras esté en pausa;
    /// `false` = hay que detenerse.
    async fn checkpoint(&mut self) -> bool {
        let mut announced = false;
        loop {
            let state = *self.rx.borrow_and_update();
            match state {
                ControlState::Running => return true,
                ControlState::Stopped => return false,
                ControlState::Paused => {
                    if !announced {
                        log::info!("(checkpoint) Campaña en pausa, esperando reanudación");
                        announced = true;
                    }
                    // Si se cae el handle estando en pausa nadie puede reanudar
                    if self.rx.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

enum RecipientResult {
    Sent,
    Failed,
    /// No se intentó: no hay cuenta elegible
    Skipped(Termination),
}

pub struct CampaignRunner {
    campaign_id: String,
    selector: AccountSelector,
    executor: SendExecutor,
    send_log: Arc<dyn SendLogStore>,
    settings: CampaignSettings,
}

impl CampaignRunner {
    pub fn new(
        campaign_id: String,
        selector: AccountSelector,
        executor: SendExecutor,
        send_log: Arc<dyn SendLogStore>,
        settings: CampaignSettings,
    ) -> Self {
        Self {
            campaign_id,
            selector,
            executor,
            send_log,
            settings,
        }
    }

    /// Corre la campaña completa. Solo falla si falla el contador o el log;
    /// el agotamiento de cuentas termina antes pero devuelve un resumen.
    pub async fn run(
        mut self,
        template: &MessageTemplate,
        sanitized: SanitizedRecipients,
        mut control: CampaignControl,
    ) -> Result<CampaignSummary> {
        let recipients = sanitized.recipients;
        let mut summary = CampaignSummary {
            total: recipients.len(),
            sent: 0,
            failed: 0,
            skipped: 0,
            invalid_dropped: sanitized.invalid_dropped,
            duplicate_dropped: sanitized.duplicate_dropped,
            termination: Termination::Completed,
        };

        log::info!(
            "(run) Campaña {} inicia con {} destinatarios ({} inválidos, {} duplicados descartados)",
            self.campaign_id,
            recipients.len(),
            summary.invalid_dropped,
            summary.duplicate_dropped
        );

        let mut index = 0;
        while index < recipients.len() {
            if !control.checkpoint().await {
                log::info!("(run) Campaña {} detenida por el usuario", self.campaign_id);
                summary.termination = Termination::Stopped;
                break;
            }

            match self.deliver_with_rotation(template, &recipients[index]).await? {
                RecipientResult::Sent => summary.sent += 1,
                RecipientResult::Failed => summary.failed += 1,
                RecipientResult::Skipped(reason) => {
                    log::warn!(
                        "(run) Campaña {}: sin cuentas elegibles ({:?}), quedan {} sin intentar",
                        self.campaign_id,
                        reason,
                        recipients.len() - index
                    );
                    summary.termination = reason;
                    break;
                }
            }

            index += 1;
            if index < recipients.len() {
                self.pace(index).await;
            }
        }

        let reason = skip_reason(summary.termination);
        for recipient in &recipients[index..] {
            self.record_attempt(recipient, None, None, AttemptOutcome::Skipped, Some(reason))
                .await?;
            summary.skipped += 1;
        }

        log::info!(
            "(run) Campaña {} terminada: {} enviados, {} fallidos, {} omitidos ({:?})",
            self.campaign_id,
            summary.sent,
            summary.failed,
            summary.skipped,
            summary.termination
        );
        Ok(summary)
    }

    /// Selecciona cuenta y envía; ante rate limit reintenta el mismo
    /// destinatario con otra cuenta, hasta `max_rate_limit_retries` veces.
    async fn deliver_with_rotation(
        &mut self,
        template: &MessageTemplate,
        recipient: &Recipient,
    ) -> Result<RecipientResult> {
        let mut retries_left = self.settings.max_rate_limit_retries;
        let mut attempted = false;

        loop {
            let account = match self.selector.select().await? {
                Selection::Selected(account) => account,
                Selection::Exhausted if attempted => return Ok(RecipientResult::Failed),
                Selection::Exhausted => {
                    return Ok(RecipientResult::Skipped(Termination::Exhausted))
                }
                Selection::NoAccounts => {
                    return Ok(RecipientResult::Skipped(Termination::NoAccounts))
                }
            };
            attempted = true;

            let correlation_id = Uuid::new_v4().to_string();
            self.send_log
                .append_correlation(&CorrelationRecord {
                    correlation_id: correlation_id.clone(),
                    campaign_id: self.campaign_id.clone(),
                    recipient: recipient.address.clone(),
                    account_id: account.id.clone(),
                    timestamp: Utc::now(),
                })
                .await?;

            let outcome = self
                .executor
                .execute(template, &account, recipient, &correlation_id)
                .await?;

            let (logged, error) = match &outcome {
                SendOutcome::Delivered => (AttemptOutcome::Sent, None),
                SendOutcome::RateLimited(detail) => (AttemptOutcome::Failed, Some(detail.as_str())),
                SendOutcome::PermanentFailure { detail, .. } => {
                    (AttemptOutcome::Failed, Some(detail.as_str()))
                }
            };
            self.record_attempt(
                recipient,
                Some(&account.id),
                Some(&correlation_id),
                logged,
                error,
            )
            .await?;

            match outcome {
                SendOutcome::Delivered => return Ok(RecipientResult::Sent),
                SendOutcome::RateLimited(_) => {
                    self.selector.mark_rate_limited(&account.id);
                    if retries_left == 0 {
                        return Ok(RecipientResult::Failed);
                    }
                    retries_left -= 1;
                    log::info!(
                        "(deliver_with_rotation) Reintentando {} con otra cuenta",
                        recipient.address
                    );
                }
                SendOutcome::PermanentFailure {
                    cause: FailureCause::Authentication,
                    ..
                } => {
                    self.selector.mark_failed(&account.id);
                    return Ok(RecipientResult::Failed);
                }
                SendOutcome::PermanentFailure { .. } => return Ok(RecipientResult::Failed),
            }
        }
    }

    async fn record_attempt(
        &self,
        recipient: &Recipient,
        account_id: Option<&str>,
        correlation_id: Option<&str>,
        outcome: AttemptOutcome,
        error: Option<&str>,
    ) -> Result<()> {
        self.send_log
            .append_attempt(&SendAttemptRecord {
                timestamp: Utc::now(),
                campaign_id: self.campaign_id.clone(),
                recipient: recipient.address.clone(),
                account_id: account_id.map(str::to_string),
                correlation_id: correlation_id.map(str::to_string),
                outcome,
                error: error.map(str::to_string),
            })
            .await
    }

    /// `processed` = destinatarios ya procesados.
    async fn pace(&self, processed: usize) {
        let batch_size = self.settings.batch_size;
        let delay = if batch_size > 0 && processed % batch_size == 0 {
            log::info!(
                "(pace) Lote de {} completo, esperando {} ms",
                batch_size,
                self.settings.batch_delay_ms
            );
            self.settings.batch_delay()
        } else {
            self.settings.send_delay()
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn skip_reason(termination: Termination) -> &'static str {
    match termination {
        Termination::Stopped => "campaign stopped",
        Termination::NoAccounts => "no accounts configured",
        Termination::Exhausted | Termination::Completed => "no eligible account",
    }
}
