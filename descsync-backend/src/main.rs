use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::io;
use std::sync::Arc;

mod composer;
mod config;
mod controllers;
mod db;
mod error;
mod gateway;
mod middleware;
mod models;
mod operations;
mod pipeline;
mod plans;
mod sync;
mod variables;
mod vault;

#[cfg(test)]
mod test_support;

use config::Config;
use db::Database;
use gateway::{QuotaGateway, YouTubeClient};
use operations::Operations;
use pipeline::{JobDispatcher, LocalQueue, Pipeline};
use plans::{DbTierLookup, PlanLimiter};
use sync::{SyncOrchestrator, SyncScheduler};
use variables::VariableStore;
use vault::{CredentialVault, OAuthClient, TokenCipher};

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub ops: Arc<Operations>,
}

fn startup_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(startup_error)?;
    let port = config.port;
    log::info!("Loaded configuration: {:?}", config);

    log::info!("Initializing database at {}", config.database_url);
    let db = Arc::new(Database::new(&config.database_url).map_err(startup_error)?);

    // One client per process, injected into every component that calls out
    log::info!("Initializing platform clients");
    let cipher = TokenCipher::new(&config.token_encryption_secret).map_err(startup_error)?;
    let oauth = Arc::new(
        OAuthClient::new(
            config.oauth_token_url.as_deref(),
            &config.oauth_client_id,
            &config.oauth_client_secret,
            &config.oauth_redirect_uri,
        )
        .map_err(startup_error)?,
    );
    let platform = Arc::new(
        YouTubeClient::new(
            config.platform_api_base_url.as_deref(),
            config.analytics_api_base_url.as_deref(),
        )
        .map_err(startup_error)?,
    );

    let vault = Arc::new(
        CredentialVault::new(db.clone(), cipher, oauth)
            .with_refresh_margin(config.token_refresh_margin_secs),
    );
    let gateway = Arc::new(QuotaGateway::new(db.clone(), vault.clone(), platform));
    let limiter = Arc::new(PlanLimiter::new(
        db.clone(),
        Arc::new(DbTierLookup::new(db.clone())),
    ));
    let variables = Arc::new(VariableStore::new(db.clone()));

    log::info!("Initializing job queue");
    let (queue, job_rx) = LocalQueue::channel();
    let queue = Arc::new(queue);

    let pipeline = Arc::new(
        Pipeline::new(db.clone(), gateway.clone(), variables.clone(), queue.clone())
            .with_concurrency(config.rebuild_concurrency)
            .with_separator(config.description_separator.clone()),
    );
    let orchestrator = Arc::new(
        SyncOrchestrator::new(
            db.clone(),
            gateway.clone(),
            limiter.clone(),
            variables.clone(),
            queue.clone(),
        )
        .with_sync_lease(config.sync_lease_secs),
    );
    let ops = Arc::new(Operations::new(
        db.clone(),
        vault,
        gateway,
        limiter,
        variables,
        pipeline.clone(),
        orchestrator.clone(),
        queue.clone(),
    ));

    // Job worker
    let dispatcher = Arc::new(JobDispatcher::new(pipeline, orchestrator));
    let (worker_shutdown_tx, worker_shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(dispatcher.run(job_rx, worker_shutdown_rx));

    // Fleet sync scheduler
    log::info!("Initializing scheduler with schedule '{}'", config.sync_schedule);
    let scheduler = Arc::new(
        SyncScheduler::new(db.clone(), queue, &config.sync_schedule).map_err(startup_error)?,
    );
    let (scheduler_shutdown_tx, scheduler_shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_handle = Arc::clone(&scheduler);
    tokio::spawn(async move {
        scheduler_handle.start(scheduler_shutdown_rx).await;
    });

    log::info!("Starting descsync server on port {}", port);

    let server_db = db.clone();
    let server_config = config.clone();
    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&server_db),
                config: server_config.clone(),
                ops: Arc::clone(&ops),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::channels::config)
            .configure(controllers::library::config)
            .configure(controllers::videos::config)
            .configure(controllers::usage::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    log::info!("Server stopped, shutting down background workers");
    let _ = scheduler_shutdown_tx.send(());
    let _ = worker_shutdown_tx.send(());
    result
}
