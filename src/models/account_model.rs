//! models/account_model.rs
//! Cuentas emisoras y su estado dentro de una campaña.

use serde::{Deserialize, Serialize};

/// Cuenta configurada para enviar. No cambia durante una campaña.
#[derive(Clone, Deserialize)]
pub struct Account {
    /// Email o usuario; único dentro de la campaña
    pub id: String,
    pub display_name: String,
    /// App password o credencial equivalente
    pub secret: String,
    /// Tag del registro de proveedores ("gmail", "outlook", ...)
    pub provider: String,
    /// Dirección From si `id` no es un email
    #[serde(default)]
    pub from_address: Option<String>,
    /// Pisa el límite diario de la campaña para esta cuenta
    #[serde(default)]
    pub daily_limit: Option<u32>,
}

impl Account {
    pub fn sender_address(&self) -> &str {
        self.from_address.as_deref().unwrap_or(&self.id)
    }
}

// El secreto nunca sale en logs
impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("provider", &self.provider)
            .field("from_address", &self.from_address)
            .field("daily_limit", &self.daily_limit)
            .finish_non_exhaustive()
    }
}

/// Estado de una cuenta durante una sola campaña.
/// `RateLimited` y `Failed` no se persisten y no se revierten en la misma corrida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Active,
    RateLimited,
    Failed,
}
