//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod account_model;
pub mod campaign_model;
pub mod operation_model;
pub mod recipient_model;
