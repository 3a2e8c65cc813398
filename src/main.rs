mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod utils;

#[cfg(test)]
mod test_support;

use actix_web::middleware::{Logger, NormalizePath, TrailingSlash};
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use std::io;

use crate::config::AppConfig;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().map_err(|err| {
        error!("Invalid configuration: {}", err);
        io::Error::new(io::ErrorKind::InvalidInput, err)
    })?;

    let pool = db::create_pool(&config).await.map_err(|err| {
        error!("Failed to connect to the database: {}", err);
        io::Error::new(io::ErrorKind::ConnectionRefused, err)
    })?;

    db::seed_permissions(&pool)
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

    if let Some(admin) = &config.admin {
        db::bootstrap_admin(&pool, admin)
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    }

    let bind_address = config.bind_address.clone();
    info!("Starting server at {}", bind_address);

    let pool = web::Data::new(pool);
    let config = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::new(TrailingSlash::Always))
            .wrap(Logger::default())
            .app_data(pool.clone())
            .app_data(config.clone())
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
