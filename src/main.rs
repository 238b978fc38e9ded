// src/main.rs

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// --- Module Declarations ---
mod acquisition;
mod config;
mod content;
mod error;
mod providers;
mod scores;
mod session;
mod state;
mod web;

// --- Imports ---
use crate::acquisition::AcquisitionChain;
use crate::config::load_settings;
use crate::content::LocalPoolCache;
use crate::error::Result as AppResult;
use crate::scores::HighscoreStore;
use crate::session::SessionManagerHandle;
use crate::state::AppState;
use crate::web::run_server;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Setup tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=info,tower_http=debug,{}::acquisition=debug",
                    env!("CARGO_PKG_NAME"),
                    env!("CARGO_PKG_NAME")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load Configuration
    let app_settings = Arc::new(load_settings()?);
    tracing::info!("Configuration loaded: {:?}", app_settings);

    // Initialize the local question pool
    let pool = Arc::new(LocalPoolCache::new(app_settings.pool.clone()).await?);
    tracing::info!(
        pool.questions.count = pool.questions().await.len(),
        "Local question pool initialized."
    );

    // Acquisition chain over the configured providers
    let acquisition = Arc::new(AcquisitionChain::from_settings(
        &app_settings.providers,
        &app_settings.session,
        Arc::clone(&pool),
    ));

    // Highscore store
    let scores = Arc::new(HighscoreStore::new(&app_settings.storage.data_dir));
    tracing::info!(
        highscores.count = scores.list().await.len(),
        "Highscore store opened."
    );

    // Session manager actor
    let sessions = SessionManagerHandle::new(32, app_settings.session.clone());

    // Create AppState
    let app_state = AppState {
        sessions,
        acquisition,
        pool,
        scores,
        settings: Arc::clone(&app_settings),
        http: reqwest::Client::new(),
    };

    // Run the web server
    run_server(app_state, app_settings.server.clone()).await?;

    Ok(())
}
