use std::path::Path;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::provider_config::ProviderRegistry;
use crate::config::sender_config::SenderConfig;
use crate::logger::init_logger;
use crate::services::campaign_service::CampaignService;
use crate::services::counter_store::SqliteCounterStore;
use crate::services::operation_service::OperationService;
use crate::services::send_executor::SmtpMailTransport;
use crate::services::send_log_service::SqliteSendLog;

mod app;
mod config;
mod handlers;
mod logger;
mod models;
mod services;
#[cfg(test)]
mod tests;

async fn setup_database(db_path: &Path) -> anyhow::Result<Pool<Sqlite>> {
    // Crear carpeta contenedora si hace falta
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    log::info!("Conectando a SQLite en {:?}", db_path);

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    Ok(db_pool)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = SenderConfig::from_env().expect("Configuración inválida");

    let providers = match &config.providers_file {
        Some(path) => {
            ProviderRegistry::load_with_overrides(path).expect("No se pudo cargar PROVIDERS_FILE")
        }
        None => ProviderRegistry::default(),
    };

    let db_pool = setup_database(&config.database_path)
        .await
        .expect("No se pudo conectar a la base de datos SQLite.");

    let operation_service = OperationService::new(db_pool.clone());
    if let Err(e) = operation_service.run_migrations().await {
        panic!("Fallo en migraciones: {:?}", e);
    }

    let campaign_service = CampaignService::new(
        operation_service.clone(),
        Arc::new(providers),
        Arc::new(SmtpMailTransport),
        Arc::new(SqliteCounterStore::new(db_pool.clone())),
        Arc::new(SqliteSendLog::new(db_pool.clone())),
        config.campaign_defaults.clone(),
    );

    log::info!("Levantando servidor en {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(operation_service.clone()))
            .app_data(web::Data::new(campaign_service.clone()))
            .configure(app::init_app)
    })
    .workers(1)
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}
