use std::sync::Arc;

use crate::acquisition::AcquisitionChain;
use crate::config::AppSettings;
use crate::content::LocalPoolCache;
use crate::scores::HighscoreStore;
use crate::session::SessionManagerHandle;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManagerHandle,
    pub acquisition: Arc<AcquisitionChain>,
    pub pool: Arc<LocalPoolCache>,
    pub scores: Arc<HighscoreStore>,
    pub settings: Arc<AppSettings>,
    /// Shared client for the relay; provider adapters own their own clients.
    pub http: reqwest::Client,
}
