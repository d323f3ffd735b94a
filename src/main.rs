use std::fs::File;

use chrono::Utc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use config::Config;
use database::DurableStore;
use discord::DiscordApi;
use poster::PosterService;
use service::EventService;
use sheet::SheetsApi;

/// Deferred teardown of completed events and their artifacts.
mod cleanup;
/// Environment-derived runtime configuration.
mod config;
/// Traits and types for the durable store and its fallbacks.
mod database;
/// The chat-platform boundary and its Discord implementation.
mod discord;
/// Domain error types surfaced to callers.
mod error;
/// Event poster rendering boundary.
mod poster;
/// Pre-match reminder scheduling.
mod reminder;
/// The process-scoped coordination service and its flows.
mod service;
/// Spreadsheet logging boundary.
mod sheet;
/// Concurrency-safe claims for the Judge and Recorder slots.
mod slots;
/// Per-person staffing counters for the leaderboard.
mod stats;
/// The authoritative in-memory event table.
mod store;
/// Cancellable one-shot deadline timers.
mod timer;

#[cfg(test)]
mod test_utils;

/// A thread-safe Error type used by the bot.
pub type BotError = anyhow::Error;

/// The service with the production collaborators filled in.
pub type ArenaService = EventService<DiscordApi, SheetsApi, PosterService>;

#[tokio::main]
async fn main() {
    if let Err(e) = setup_tracing() {
        panic!("Error trying to setup tracing: {}", e);
    }

    if let Err(e) = run().await {
        panic!("Error trying to run the bot: {}", e);
    }
}

/// The main function that runs the coordination service.
async fn run() -> Result<(), BotError> {
    // Load the .env file only in the development environment (bypassed with the --release flag)
    #[cfg(debug_assertions)]
    dotenv::dotenv().ok();

    let discord_token =
        std::env::var("DISCORD_TOKEN").expect("Expected DISCORD_TOKEN as an environment variable");
    info!("Successfully loaded Discord Token");

    let config = Config::from_env()?;
    let archive = DurableStore::connect(&config).await;

    let chat = DiscordApi::new(&discord_token, &config)?;
    let sheet = SheetsApi::new(config.sheet_webhook.clone());
    let poster = PosterService::new(config.poster_api.clone());

    let service: ArenaService =
        EventService::start(archive, chat, sheet, poster, &config, Utc::now()).await?;
    info!("Match coordination service is ready.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    service.shutdown().await;

    Ok(())
}

/// Sets up the tracing subscriber for the bot.
fn setup_tracing() -> Result<(), BotError> {
    if cfg!(debug_assertions) {
        let filter = EnvFilter::from_default_env()
            .add_directive("none".parse()?)
            .add_directive("wae_bot=info".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::NONE)
            .pretty()
            .init();

        return Ok(());
    }

    let log_file = File::create("debug.log")?;

    // Set up tracing with a filter that only logs errors in production
    tracing_subscriber::fmt::fmt()
        .with_span_events(FmtSpan::NONE)
        .with_max_level(LevelFilter::ERROR)
        .with_writer(log_file)
        .pretty()
        .init();

    Ok(())
}
