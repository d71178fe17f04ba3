//! Isolated-margin grid bot binary.
//!
//! ## Setup
//!
//! 1. Optionally create a `.env` file in the project root with overrides:
//!    ```
//!    APP_ENGINE__LEVERAGE=5
//!    APP_MODE=paper
//!    ```
//!
//! 2. Run the bot:
//!    ```bash
//!    cargo run --bin isogrid -- --config config.toml
//!    ```
//!
//! Without a config file everything runs on defaults: paper trading
//! BTC/USDT against the in-process simulated venue.

use std::env;
use std::process::exit;
use std::sync::Arc;

use log::{error, info};

use isogrid::{bot, BotError, BotResult, Credentials, RunMode, Settings, SimVenue};

#[tokio::main]
async fn main() {
    // Load .env before reading settings so APP_* overrides apply.
    let dotenv_path = dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" {
        Some(args[2].as_str())
    } else {
        None
    };
    let settings = Settings::new(config_path);

    // Logging must be up before a settings failure gets reported.
    let level = settings
        .as_ref()
        .map(|s| s.log.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    match &dotenv_path {
        Some(path) => info!("loaded environment from {}", path.display()),
        None => info!("no .env file found, using system environment variables"),
    }
    match config_path {
        Some(path) if settings.is_ok() => info!("loaded configuration from {path}"),
        Some(_) => {}
        None => info!("no config file provided, using default configuration"),
    }

    let result = match settings {
        Ok(settings) => run(settings).await,
        Err(e) => Err(BotError::Config(e.to_string())),
    };
    if let Err(e) = result {
        error!("fatal: {e}");
        exit(1);
    }
}

async fn run(settings: Settings) -> BotResult<()> {
    match settings.mode {
        RunMode::Paper => {
            info!(
                "paper trading {} on the simulated venue",
                settings.engine.pair
            );
            let venue = SimVenue::new(settings.paper.clone());
            let price_process = venue.start(settings.engine.pair.clone());
            let result = bot::run(Arc::new(venue), settings.engine).await;
            price_process.abort();
            result
        }
        RunMode::Live => {
            let path = settings
                .credentials_file
                .as_deref()
                .ok_or_else(|| BotError::Config("live mode requires credentials_file".into()))?;
            let _credentials = Credentials::load(path)?;
            info!("loaded API credentials from {path}");
            Err(BotError::Config(
                "no live venue adapter is bundled; implement MarginVenue for \
                 your exchange and wire it in here"
                    .into(),
            ))
        }
    }
}
