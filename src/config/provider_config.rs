//! config/provider_config.rs
//! Registro de proveedores SMTP: tag -> {host, puerto, seguridad}.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Cómo se negocia TLS con el servidor del proveedor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportSecurity {
    /// TLS desde el primer byte (puerto 465)
    Implicit,
    /// STARTTLS obligatorio (puerto 587)
    StartTls,
    /// Sin TLS, solo para relays locales o de prueba
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub host: String,
    pub port: u16,
    pub security: TransportSecurity,
}

impl ProviderConfig {
    pub fn new(host: &str, port: u16, security: TransportSecurity) -> Self {
        Self {
            host: host.to_string(),
            port,
            security,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "gmail".to_string(),
            ProviderConfig::new("smtp.gmail.com", 465, TransportSecurity::Implicit),
        );
        providers.insert(
            "outlook".to_string(),
            ProviderConfig::new("smtp.office365.com", 587, TransportSecurity::StartTls),
        );
        providers.insert(
            "yahoo".to_string(),
            ProviderConfig::new("smtp.mail.yahoo.com", 465, TransportSecurity::Implicit),
        );
        providers.insert(
            "zoho".to_string(),
            ProviderConfig::new("smtp.zoho.com", 465, TransportSecurity::Implicit),
        );
        providers.insert(
            "icloud".to_string(),
            ProviderConfig::new("smtp.mail.me.com", 587, TransportSecurity::StartTls),
        );
        Self { providers }
    }
}

impl ProviderRegistry {
    /// Proveedores por defecto más los definidos en un JSON
    /// `{ "tag": { "host": ..., "port": ..., "security": ... } }`.
    /// Los del archivo pisan a los predefinidos.
    pub fn load_with_overrides(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer el archivo de proveedores {:?}", path))?;
        let overrides: HashMap<String, ProviderConfig> = serde_json::from_str(&raw)
            .with_context(|| format!("JSON de proveedores inválido en {:?}", path))?;

        let mut registry = Self::default();
        for (tag, cfg) in overrides {
            registry.insert(&tag, cfg);
        }
        Ok(registry)
    }

    /// Los tags no distinguen mayúsculas.
    pub fn insert(&mut self, tag: &str, config: ProviderConfig) {
        self.providers.insert(tag.trim().to_lowercase(), config);
    }

    pub fn resolve(&self, tag: &str) -> Option<&ProviderConfig> {
        self.providers.get(&tag.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolves_builtin_provider_case_insensitively() {
        let registry = ProviderRegistry::default();
        let gmail = registry.resolve(" Gmail ").expect("gmail predefinido");
        assert_eq!(gmail.host, "smtp.gmail.com");
        assert_eq!(gmail.port, 465);
        assert_eq!(gmail.security, TransportSecurity::Implicit);
        assert!(registry.resolve("desconocido").is_none());
    }

    #[test]
    fn file_overrides_builtin_and_adds_new_tags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "gmail": {{ "host": "relay.local", "port": 2525, "security": "plain" }},
                "corp": {{ "host": "mail.corp.test", "port": 587, "security": "starttls" }}
            }}"#
        )
        .unwrap();

        let registry = ProviderRegistry::load_with_overrides(file.path()).unwrap();
        assert_eq!(
            registry.resolve("gmail"),
            Some(&ProviderConfig::new("relay.local", 2525, TransportSecurity::Plain))
        );
        assert_eq!(registry.resolve("corp").unwrap().security, TransportSecurity::StartTls);
        assert!(registry.resolve("outlook").is_some());
    }
}
