//! # Service Bootstrap
//!
//! Wires configuration, the gateway client and the store adapters into an
//! [`AppState`].
//!
//! ## Sequence
//!
//! 1. **Gateway**: `GatewayConfig::from_env`. A missing or empty signing
//!    secret is fatal here, never a per-request 500.
//! 2. **Settlement**: `SettlementConfig::from_env`.
//! 3. **Stores**: Postgres adapters when a pool is given, otherwise
//!    in-memory stores. In-memory mode seeds the subject catalog from the
//!    JSON file named by `SUBJECT_CATALOG`, if set.

use std::path::Path;
use std::sync::Arc;

use coursepay_gateway::{ConfigError, EsewaClient, GatewayConfig, GatewayError, IntentSigner};
use coursepay_settlement::{
    InMemoryCatalog, InMemoryEnrollmentStore, InMemoryPaymentStore, SettlementConfig,
    SettlementOrchestrator, Stores, Subject,
};
use sqlx::PgPool;

use crate::db::{PgEnrollmentStore, PgPaymentStore, PgSubjectCatalog};
use crate::state::{AppConfig, AppState};

/// Errors during bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Gateway or settlement configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The gateway HTTP client could not be built.
    #[error("gateway client error: {0}")]
    Gateway(#[from] GatewayError),

    /// The subject catalog file could not be loaded.
    #[error("subject catalog {path}: {reason}")]
    Catalog { path: String, reason: String },
}

/// Build the application state from the environment.
pub fn bootstrap(config: AppConfig, pool: Option<PgPool>) -> Result<AppState, BootstrapError> {
    let gateway_config = GatewayConfig::from_env()?;
    let gateway = EsewaClient::new(&gateway_config)?;
    let signer = IntentSigner::from_config(&gateway_config);
    let settlement_config = SettlementConfig::from_env()?;
    let status_url = gateway_config.status_url()?;
    if settlement_config.verify_timeout < gateway_config.timeout {
        tracing::warn!(
            verify_timeout = ?settlement_config.verify_timeout,
            gateway_timeout = ?gateway_config.timeout,
            "verification deadline is shorter than the gateway timeout; slow status checks will be cut off"
        );
    }

    tracing::info!(
        product_code = %gateway_config.product_code,
        %status_url,
        verify_timeout = ?settlement_config.verify_timeout,
        storage = if pool.is_some() { "postgres" } else { "memory" },
        "coursepay bootstrap"
    );

    let stores = match &pool {
        Some(pool) => postgres_stores(pool.clone()),
        None => {
            let seed = match std::env::var("SUBJECT_CATALOG") {
                Ok(path) => load_catalog(Path::new(&path))?,
                Err(_) => Vec::new(),
            };
            in_memory_stores(seed)
        }
    };

    let orchestrator =
        SettlementOrchestrator::new(stores, Arc::new(gateway), signer, settlement_config);
    let state = AppState::new(orchestrator, config);
    Ok(match pool {
        Some(pool) => state.with_pool(pool),
        None => state,
    })
}

/// Postgres-backed store adapters sharing one pool.
pub fn postgres_stores(pool: PgPool) -> Stores {
    Stores {
        payments: Arc::new(PgPaymentStore::new(pool.clone())),
        enrollments: Arc::new(PgEnrollmentStore::new(pool.clone())),
        catalog: Arc::new(PgSubjectCatalog::new(pool)),
    }
}

/// Fresh in-memory stores with `subjects` in the catalog.
pub fn in_memory_stores(subjects: Vec<Subject>) -> Stores {
    let catalog = InMemoryCatalog::new();
    for subject in subjects {
        catalog.insert(subject);
    }
    Stores {
        payments: Arc::new(InMemoryPaymentStore::new()),
        enrollments: Arc::new(InMemoryEnrollmentStore::new()),
        catalog: Arc::new(catalog),
    }
}

/// Read a JSON array of subjects.
pub fn load_catalog(path: &Path) -> Result<Vec<Subject>, BootstrapError> {
    let catalog_error = |reason: String| BootstrapError::Catalog {
        path: path.display().to_string(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| catalog_error(e.to_string()))?;
    let subjects: Vec<Subject> =
        serde_json::from_str(&raw).map_err(|e| catalog_error(e.to_string()))?;
    tracing::info!(count = subjects.len(), "subject catalog loaded");
    Ok(subjects)
}
