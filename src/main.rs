// src/main.rs

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{error, info};

// Import modules
mod api;
mod config;
mod error;
mod models;
mod services;
mod utils;

use api::{configure, AppState};
use config::ServerConfig;
use models::{InferenceService, LstmRegressor};
use services::YahooFinanceClient;

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    // Initialize environment variables
    dotenv::dotenv().ok();

    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    // The model is loaded once; the server does not start without it.
    let model = match LstmRegressor::load_from_file(&config.model_path) {
        Ok(model) => model,
        Err(e) => {
            error!("Error loading model from {}: {}", config.model_path, e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "Failed to load model"));
        }
    };
    info!("Loaded model from {}", config.model_path);

    let provider = YahooFinanceClient::new(&config.yahoo_base_url, config.http_timeout).map_err(|e| {
        error!("Error building market data client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let app_state = web::Data::new(AppState {
        provider: Arc::new(provider),
        inference: InferenceService::new(Arc::new(model)),
        default_symbol: config.default_symbol.clone(),
    });

    info!("Listening on http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
