//! anonmeet-relay library interface
//!
//! Pairs participants by interest and relays their conversation through
//! two identity-hidden channels until one side ends it or time runs out.

pub mod api;
pub mod collaborators;
pub mod error;
pub mod pairing;
pub mod session;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use anonmeet_common::config::RelaySettings;
use anonmeet_common::events::EventBus;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::collaborators::{CompatibilityOracle, ProfileStore, TransportGateway};
use crate::pairing::PairingEngine;
use crate::session::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PairingEngine>,
    pub sessions: Arc<SessionManager>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub settings: Arc<RelaySettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the core around the three collaborators
    pub fn new(
        settings: RelaySettings,
        store: Arc<dyn ProfileStore>,
        oracle: Arc<dyn CompatibilityOracle>,
        gateway: Arc<dyn TransportGateway>,
        event_bus: EventBus,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(gateway, &settings, event_bus.clone()));
        let engine = Arc::new(PairingEngine::new(
            store,
            oracle,
            sessions.clone(),
            settings.match_threshold,
            settings.pass_concurrency,
            event_bus.clone(),
        ));

        Self {
            engine,
            sessions,
            event_bus,
            settings: Arc::new(settings),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::slack_routes())
        .merge(api::profile_routes())
        .merge(api::session_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
