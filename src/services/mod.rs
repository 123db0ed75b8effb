//! services/mod.rs
//! Módulo que agrupa distintos "servicios" o "capas de negocio" de la app.

pub mod account_selector;
pub mod campaign_runner;
pub mod campaign_service;
pub mod counter_store;
pub mod message_builder;
pub mod operation_service;
pub mod recipient_service;
pub mod send_executor;
pub mod send_log_service;
