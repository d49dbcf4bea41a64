//! # Application State
//!
//! Shared state for the Axum application: the settlement orchestrator, the
//! process configuration and the optional Postgres pool.

use std::sync::Arc;

use coursepay_settlement::SettlementOrchestrator;
use sqlx::PgPool;
use zeroize::Zeroizing;

/// Process configuration read at startup.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, the secret segment is not checked.
    pub auth_token: Option<Zeroizing<String>>,
}

impl AppConfig {
    /// Read `PORT` (default 8080) and `AUTH_TOKEN`.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let auth_token = std::env::var("AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(Zeroizing::new);
        Self { port, auth_token }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Payment settlement pipeline.
    pub settlement: Arc<SettlementOrchestrator>,
    /// Startup configuration.
    pub config: AppConfig,
    /// Postgres pool. `None` when running on in-memory stores.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// State backed by whatever stores `settlement` was wired with.
    pub fn new(settlement: SettlementOrchestrator, config: AppConfig) -> Self {
        Self {
            settlement: Arc::new(settlement),
            config,
            db_pool: None,
        }
    }

    /// Attach the pool used by the readiness probe.
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Whether backing services answer.
    pub async fn is_ready(&self) -> bool {
        match &self.db_pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => true,
        }
    }
}
