mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod utils;

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::services::email_service::EmailService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().map_err(std::io::Error::other)?;

    tracing::info!("connecting to database");
    let db = db::establish_connection(&config)
        .await
        .map_err(std::io::Error::other)?;
    tracing::info!("database connected");
    db::ensure_schema(&db).await.map_err(std::io::Error::other)?;

    let emails = web::Data::new(EmailService::from_config(&config));
    if config.mail_relay_url.is_none() {
        tracing::warn!("MAIL_RELAY_URL not set, emails will only be logged");
    }

    let bind = (config.host, config.port);
    let db = web::Data::new(db);
    let config = web::Data::new(config);

    tracing::info!(host = %bind.0, port = bind.1, "starting server");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(db.clone())
            .app_data(emails.clone())
            .app_data(config.clone())
            .configure(routes::configure_routes)
    })
        .bind(bind)?
        .run()
        .await
}
