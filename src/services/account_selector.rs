//! services/account_selector.rs
//! Elige la próxima cuenta elegible: round-robin con cursor de rotación.
//!
//! `RateLimited` y `Failed` son marcas de la corrida y no se revierten.
//! La cuota se consulta en vivo en el `DailyCounterStore` en cada selección,
//! así una cuenta vuelve a ser elegible si cambia la fecha a mitad de campaña.

use std::sync::Arc;

use anyhow::Result;

use crate::models::account_model::{Account, AccountState};
use crate::services::counter_store::DailyCounterStore;

#[derive(Debug, Clone)]
pub enum Selection {
    Selected(Account),
    /// Hay cuentas pero ninguna elegible en una vuelta completa
    Exhausted,
    NoAccounts,
}

pub struct AccountSelector {
    accounts: Vec<Account>,
    states: Vec<AccountState>,
    cursor: usize,
    default_limit: u32,
    counters: Arc<dyn DailyCounterStore>,
}

impl AccountSelector {
    pub fn new(
        accounts: Vec<Account>,
        default_limit: u32,
        counters: Arc<dyn DailyCounterStore>,
    ) -> Self {
        let states = vec![AccountState::Active; accounts.len()];
        Self {
            accounts,
            states,
            cursor: 0,
            default_limit,
            counters,
        }
    }

    pub fn daily_limit(&self, account: &Account) -> u32 {
        account.daily_limit.unwrap_or(self.default_limit)
    }

    /// Recorre desde el cursor (con vuelta) y devuelve la primera cuenta
    /// activa con cuota disponible; el cursor queda justo después de ella.
    pub async fn select(&mut self) -> Result<Selection> {
        let total = self.accounts.len();
        if total == 0 {
            return Ok(Selection::NoAccounts);
        }

        for offset in 0..total {
            let idx = (self.cursor + offset) % total;
            if self.states[idx] != AccountState::Active {
                continue;
            }

            let account = &self.accounts[idx];
            let sent_today = self.counters.get(&account.id).await?;
            if sent_today >= self.daily_limit(account) {
                log::debug!(
                    "(select) Cuenta '{}' sin cuota ({} enviados hoy)",
                    account.id,
                    sent_today
                );
                continue;
            }

            self.cursor = (idx + 1) % total;
            return Ok(Selection::Selected(account.clone()));
        }

        Ok(Selection::Exhausted)
    }

    pub fn mark_rate_limited(&mut self, account_id: &str) {
        self.transition(account_id, AccountState::RateLimited);
    }

    pub fn mark_failed(&mut self, account_id: &str) {
        self.transition(account_id, AccountState::Failed);
    }

    #[cfg(test)]
    pub fn state(&self, account_id: &str) -> Option<AccountState> {
        self.position(account_id).map(|idx| self.states[idx])
    }

    fn position(&self, account_id: &str) -> Option<usize> {
        self.accounts.iter().position(|a| a.id == account_id)
    }

    fn transition(&mut self, account_id: &str, next: AccountState) {
        match self.position(account_id) {
            // Failed es terminal, no se degrada a RateLimited
            Some(idx) if self.states[idx] != AccountState::Failed => {
                log::warn!(
                    "(account_selector) Cuenta '{}' pasa a {:?} hasta el fin de la campaña",
                    account_id,
                    next
                );
                self.states[idx] = next;
            }
            Some(_) => {}
            None => log::warn!(
                "(account_selector) Cuenta desconocida '{}', se ignora la transición",
                account_id
            ),
        }
    }
}
