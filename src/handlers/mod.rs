//! handlers/mod.rs
//! Endpoints HTTP (campañas, operaciones).
pub mod campaign_handler;
pub mod operation_handler;
