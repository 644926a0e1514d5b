use std::io;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use clap::Parser;
use downdetector::monitoring::{HttpChecker, LogTransport, NotificationTransport};
use downdetector::{Engine, Scheduler};
use logger::{LogFormat, init_tracing_with};
use tracing::{info, warn};

mod api;
mod cli;
mod config;
mod database;
mod discord;
mod pool;
mod retention;
mod validation;

use cli::{Cli, Command};
use config::Config;
use database::{LibsqlStore, initialize_database};
use discord::DiscordTransport;
use retention::{RetentionCleanup, RetentionPolicy};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref()).context("failed to load configuration")?;
    let log_format = config.log_format.as_deref().and_then(|f| f.parse::<LogFormat>().ok());
    init_tracing_with(log_format);

    let store = open_store(&config).await?;
    let mut out = io::stdout();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, store).await,
        Command::Add { owner, name, url, guild } => {
            cli::add_service(&store, &mut out, &owner, &name, &url, guild).await
        }
        Command::List { owner } => cli::list_services(&store, &mut out, owner.as_deref()).await,
        Command::Remove { owner, name } => cli::remove_service(&store, &mut out, &owner, &name).await,
        Command::History { id, limit } => cli::show_history(&store, &mut out, id, limit).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<LibsqlStore>> {
    let pool = pool::open_pool(&config.database.path).await?;
    let conn = pool.get().await.context("failed to get database connection")?;
    initialize_database(&conn).await?;
    drop(conn);
    Ok(Arc::new(LibsqlStore::new_from_pool(pool)))
}

fn notification_transport(config: &Config) -> Result<Arc<dyn NotificationTransport>> {
    match config.discord.token.as_deref() {
        Some(token) => {
            info!("Announcing transitions on Discord via {}", config.discord.api_base);
            Ok(Arc::new(DiscordTransport::new(&config.discord.api_base, token)?))
        }
        None => {
            warn!("No Discord token configured, transitions are only logged");
            Ok(Arc::new(LogTransport))
        }
    }
}

async fn serve(config: Config, store: Arc<LibsqlStore>) -> Result<()> {
    info!("{}", config);

    let checker = HttpChecker::new(config.engine.probe_timeout())?;
    let engine = Arc::new(Engine::new(
        store.clone(),
        store.clone(),
        Arc::new(checker),
        notification_transport(&config)?,
        &config.engine,
    ));
    let scheduler = Arc::new(Scheduler::new(engine, config.engine.interval_seconds)?);
    scheduler.start();

    let policy = RetentionPolicy { ping_history_days: config.database.retention_days };
    let cleanup = RetentionCleanup::new(store.clone(), policy).start_periodic_cleanup();

    let state = web::Data::new(api::AppState {
        scheduler: scheduler.clone(),
        metrics: store,
        probe_timeout_ms: config.engine.probe_timeout_ms,
    });

    info!("Control API listening on {}:{}", config.server.bind, config.server.port);
    let served = HttpServer::new(move || App::new().app_data(state.clone()).configure(api::routes))
        .bind((config.server.bind.as_str(), config.server.port))
        .with_context(|| format!("failed to bind {}:{}", config.server.bind, config.server.port))?
        .run()
        .await;

    info!("Shutting down");
    cleanup.abort();
    scheduler.stop().await;
    served.map_err(Into::into)
}
