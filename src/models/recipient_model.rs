use serde::{Deserialize, Serialize};

/// Destinatario ya validado: dirección en minúsculas, sin duplicados en la lista.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub address: String,
    pub name: Option<String>,
}

/// Entrada cruda, tal como llega del usuario.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecipient {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<&str> for RawRecipient {
    fn from(address: &str) -> Self {
        RawRecipient {
            address: address.to_string(),
            name: None,
        }
    }
}

/// Resultado de sanear una lista cruda.
#[derive(Debug, Clone, Default)]
pub struct SanitizedRecipients {
    pub recipients: Vec<Recipient>,
    pub invalid_dropped: usize,
    pub duplicate_dropped: usize,
}
