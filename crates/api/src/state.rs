use std::sync::Arc;

use rewards_domain::config::LedgerConfig;
use rewards_domain::provider::IdentityProvider;
use rewards_domain::services::{
    cache::SessionCache,
    telemetry::{AbuseTracker, TelemetryGuard},
};
use rewards_storage::SeaOrmStorage;

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    sessions: SessionCache,
    telemetry: TelemetryGuard,
    abuse_tracker: AbuseTracker,
    ledger: LedgerConfig,
    discord: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    pub fn new(
        storage: SeaOrmStorage,
        sessions: SessionCache,
        telemetry: TelemetryGuard,
        abuse_tracker: AbuseTracker,
        ledger: LedgerConfig,
    ) -> Self {
        Self {
            storage,
            sessions,
            telemetry,
            abuse_tracker,
            ledger,
            discord: None,
        }
    }

    /// Enables `POST /auth/discord`; without a provider the route answers 503.
    pub fn with_discord(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.discord = Some(provider);
        self
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn abuse_tracker(&self) -> &AbuseTracker {
        &self.abuse_tracker
    }

    pub fn ledger_config(&self) -> &LedgerConfig {
        &self.ledger
    }

    pub fn discord(&self) -> Option<&dyn IdentityProvider> {
        self.discord.as_deref()
    }
}
