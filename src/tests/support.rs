//! tests/support.rs
//! Fakes compartidos: transporte guionado, stores en memoria, cuentas.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::Message;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::provider_config::{ProviderConfig, ProviderRegistry};
use crate::config::sender_config::CampaignSettings;
use crate::models::account_model::Account;
use crate::models::campaign_model::{CorrelationRecord, MessageTemplate, SendAttemptRecord};
use crate::models::recipient_model::SanitizedRecipients;
use crate::services::account_selector::AccountSelector;
use crate::services::campaign_runner::CampaignRunner;
use crate::services::counter_store::{local_today, DailyCounterStore, TodayFn};
use crate::services::operation_service::OperationService;
use crate::services::recipient_service::sanitize_recipients;
use crate::services::send_executor::{MailTransport, SendExecutor, TransportError};
use crate::services::send_log_service::SendLogStore;

pub const A: &str = "a@example.com";
pub const B: &str = "b@example.com";
pub const C: &str = "c@example.com";

pub fn account(id: &str, daily_limit: Option<u32>) -> Account {
    Account {
        id: id.to_string(),
        display_name: format!("Sender {}", id),
        secret: "app-password".to_string(),
        provider: "gmail".to_string(),
        from_address: None,
        daily_limit,
    }
}

pub fn template() -> MessageTemplate {
    MessageTemplate {
        subject: "Novedades".to_string(),
        body: r#"<p>Hola, <a href="https://example.com/promo">ver promo</a></p>"#.to_string(),
        text_body: Some("Hola".to_string()),
    }
}

pub fn recipients(addresses: &[&str]) -> SanitizedRecipients {
    sanitize_recipients(addresses.iter().map(|a| (*a).into()))
}

pub fn fast_settings(daily_limit: u32) -> CampaignSettings {
    CampaignSettings {
        daily_limit,
        send_delay_ms: 0,
        batch_size: 0,
        batch_delay_ms: 0,
        max_rate_limit_retries: 1,
        tracking_base_url: Some("https://track.example.org".to_string()),
    }
}

/// Fecha "hoy" controlable desde el test.
pub fn movable_today(start: NaiveDate) -> (Arc<Mutex<NaiveDate>>, TodayFn) {
    let cell = Arc::new(Mutex::new(start));
    let reader = cell.clone();
    let today: TodayFn = Arc::new(move || *reader.lock().unwrap());
    (cell, today)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Pool SQLite en memoria con todas las migraciones.
/// Una sola conexión que no expira: cada conexión nueva sería otra base.
pub async fn memory_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("sqlite en memoria");
    OperationService::new(pool.clone())
        .run_migrations()
        .await
        .expect("migraciones");
    pool
}

type Hook = Box<dyn Fn(usize) + Send + Sync>;

/// Transporte falso: entrega todo salvo lo que se le programe como error.
#[derive(Default)]
pub struct ScriptedTransport {
    queued_errors: Mutex<HashMap<String, VecDeque<String>>>,
    permanent_errors: Mutex<HashMap<String, String>>,
    attempts: Mutex<Vec<(String, String)>>,
    deliveries: Mutex<Vec<(String, String)>>,
    hook: Mutex<Option<Hook>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cada intento por esta cuenta falla con `error`.
    pub fn fail_always(&self, account_id: &str, error: &str) {
        self.permanent_errors
            .lock()
            .unwrap()
            .insert(account_id.to_string(), error.to_string());
    }

    /// Solo el próximo intento por esta cuenta falla.
    pub fn fail_next(&self, account_id: &str, error: &str) {
        self.queued_errors
            .lock()
            .unwrap()
            .entry(account_id.to_string())
            .or_default()
            .push_back(error.to_string());
    }

    /// Se llama después de cada intento con la cantidad de intentos hasta ahora.
    pub fn on_attempt(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn attempts(&self) -> Vec<(String, String)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn attempts_by(&self, account_id: &str) -> usize {
        self.attempts()
            .iter()
            .filter(|(account, _)| account == account_id)
            .count()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn deliver(
        &self,
        account: &Account,
        _provider: &ProviderConfig,
        message: Message,
    ) -> Result<(), TransportError> {
        let recipient = message
            .envelope()
            .to()
            .first()
            .map(|a| a.to_string())
            .unwrap_or_default();

        let count = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push((account.id.clone(), recipient.clone()));
            attempts.len()
        };

        let queued = self
            .queued_errors
            .lock()
            .unwrap()
            .get_mut(&account.id)
            .and_then(VecDeque::pop_front);
        let permanent = self.permanent_errors.lock().unwrap().get(&account.id).cloned();

        let result = match queued.or(permanent) {
            Some(error) => Err(TransportError::new(error)),
            None => {
                self.deliveries
                    .lock()
                    .unwrap()
                    .push((account.id.clone(), recipient));
                Ok(())
            }
        };

        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(count);
        }
        result
    }
}

// ============================================================
// Stores en memoria
// ============================================================

#[derive(Clone)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<HashMap<String, (NaiveDate, u32)>>>,
    today: TodayFn,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::with_today(Arc::new(local_today))
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_today(today: TodayFn) -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            today,
        }
    }

    /// Carga un registro tal cual, con fecha arbitraria.
    pub fn seed(&self, account_id: &str, date: NaiveDate, count: u32) -> Result<()> {
        self.lock()?.insert(account_id.to_string(), (date, count));
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (NaiveDate, u32)>>> {
        self.counters
            .lock()
            .map_err(|_| anyhow!("Contadores en memoria envenenados"))
    }
}

#[async_trait]
impl DailyCounterStore for MemoryCounterStore {
    async fn get(&self, account_id: &str) -> Result<u32> {
        let today = (self.today)();
        Ok(match self.lock()?.get(account_id) {
            Some((date, count)) if *date == today => *count,
            _ => 0,
        })
    }

    async fn increment(&self, account_id: &str, delta: u32) -> Result<u32> {
        let today = (self.today)();
        let mut counters = self.lock()?;
        let entry = counters
            .entry(account_id.to_string())
            .or_insert((today, 0));
        if entry.0 != today {
            *entry = (today, 0);
        }
        entry.1 = entry
            .1
            .checked_add(delta)
            .ok_or_else(|| anyhow!("Overflow en contador de '{}'", account_id))?;
        Ok(entry.1)
    }
}

#[derive(Clone, Default)]
pub struct MemorySendLog {
    attempts: Arc<Mutex<Vec<SendAttemptRecord>>>,
    correlations: Arc<Mutex<Vec<CorrelationRecord>>>,
}

impl MemorySendLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn correlations(&self) -> Vec<CorrelationRecord> {
        self.correlations
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SendLogStore for MemorySendLog {
    async fn append_attempt(&self, record: &SendAttemptRecord) -> Result<()> {
        self.attempts
            .lock()
            .map_err(|_| anyhow!("send log en memoria envenenado"))?
            .push(record.clone());
        Ok(())
    }

    async fn append_correlation(&self, record: &CorrelationRecord) -> Result<()> {
        self.correlations
            .lock()
            .map_err(|_| anyhow!("correlation map en memoria envenenado"))?
            .push(record.clone());
        Ok(())
    }

    async fn list_attempts(&self, campaign_id: &str) -> Result<Vec<SendAttemptRecord>> {
        Ok(self
            .attempts
            .lock()
            .map_err(|_| anyhow!("send log en memoria envenenado"))?
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

/// Store que siempre falla, como un archivo de contadores ilegible.
pub struct BrokenCounterStore;

#[async_trait]
impl DailyCounterStore for BrokenCounterStore {
    async fn get(&self, _account_id: &str) -> Result<u32> {
        Err(anyhow!("daily_counters ilegible"))
    }

    async fn increment(&self, _account_id: &str, _delta: u32) -> Result<u32> {
        Err(anyhow!("daily_counters ilegible"))
    }
}

/// Todo lo necesario para armar un `CampaignRunner` contra fakes.
pub struct Harness {
    pub counters: Arc<MemoryCounterStore>,
    pub send_log: Arc<MemorySendLog>,
    pub transport: Arc<ScriptedTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(MemoryCounterStore::new()),
            send_log: Arc::new(MemorySendLog::new()),
            transport: Arc::new(ScriptedTransport::new()),
        }
    }

    pub fn runner(&self, accounts: Vec<Account>, settings: CampaignSettings) -> CampaignRunner {
        self.runner_with_counters(accounts, settings, self.counters.clone())
    }

    pub fn runner_with_counters(
        &self,
        accounts: Vec<Account>,
        settings: CampaignSettings,
        counters: Arc<dyn DailyCounterStore>,
    ) -> CampaignRunner {
        let selector = AccountSelector::new(accounts, settings.daily_limit, counters.clone());
        let executor = SendExecutor::new(
            Arc::new(ProviderRegistry::default()),
            self.transport.clone(),
            counters,
            settings.tracking_base_url.clone(),
        );
        CampaignRunner::new(
            "campaign-test".to_string(),
            selector,
            executor,
            self.send_log.clone(),
            settings,
        )
    }
}
