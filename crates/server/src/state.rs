//! Application state
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use voicebridge_config::Settings;
use voicebridge_core::{AgentService, SttService, TtsService};

use crate::session::SessionManager;

/// The external service collaborators shared by every session.
#[derive(Clone)]
pub struct ServiceSet {
    pub stt: Arc<dyn SttService>,
    pub agent: Arc<dyn AgentService>,
    pub tts: Arc<dyn TtsService>,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Session registry
    pub sessions: Arc<SessionManager>,
    /// External services
    pub services: ServiceSet,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Settings, services: ServiceSet) -> Self {
        let sessions = Arc::new(SessionManager::new(
            config.session.max_sessions,
            Duration::from_secs(config.session.idle_timeout_secs),
            Duration::from_secs(config.session.cleanup_interval_secs),
        ));
        Self {
            config: Arc::new(config),
            sessions,
            services,
        }
    }
}
