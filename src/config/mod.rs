//! config/mod.rs
//! Configuración del servicio (entorno, proveedores SMTP).

pub mod provider_config;
pub mod sender_config;
