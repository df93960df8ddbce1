//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::services::{CatalogService, Notifier, SessionSigner};
use crate::telegram::InitDataVerifier;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    catalog: CatalogService,
    sessions: SessionSigner,
    verifier: InitDataVerifier,
    notifier: Notifier,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let notifier = Notifier::from_config(&config);
        Self::with_notifier(config, pool, notifier)
    }

    /// Create state with a given notifier (tests pass [`Notifier::disabled`]).
    #[must_use]
    pub fn with_notifier(config: StorefrontConfig, pool: PgPool, notifier: Notifier) -> Self {
        let sessions = SessionSigner::new(
            config.session_secret.clone(),
            config.session_ttl_secs,
            config.is_https(),
        );
        let verifier = InitDataVerifier::new(
            config.telegram.bot_token.clone(),
            config.telegram.init_data_max_age_secs,
        );
        let catalog = CatalogService::new(pool.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                catalog,
                sessions,
                verifier,
                notifier,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Cached catalog reads.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    /// Session token signer.
    #[must_use]
    pub fn sessions(&self) -> &SessionSigner {
        &self.inner.sessions
    }

    /// Telegram `initData` verifier.
    #[must_use]
    pub fn verifier(&self) -> &InitDataVerifier {
        &self.inner.verifier
    }

    /// Order notifications.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }
}
