use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::api;
use crate::config::ConfigRegistry;
use crate::observability::LogRing;
use crate::state::StateStore;
use crate::store::PersistentStore;
use crate::transport::HttpTransport;

/// Shared application state handed to every `axum` handler.
pub struct AppState {
    pub config: ConfigRegistry,
    pub state: StateStore,
    pub transport: HttpTransport,
    pub logs: LogRing,
    admin_key: String,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<PersistentStore>, transport: HttpTransport, admin_key: String) -> Self {
        Self {
            config: ConfigRegistry::new(Arc::clone(&store)),
            state: StateStore::new(store),
            transport,
            logs: LogRing::new(),
            admin_key,
        }
    }

    /// Authenticate an incoming request against the shared admin key.
    ///
    /// # Errors
    /// Returns `ProxyError::Auth` when the bearer token is missing or wrong.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), crate::error::ProxyError> {
        crate::auth::authenticate(headers, &self.admin_key)
    }
}

/// Build the full `axum` router: the proxy endpoint, the synthetic models
/// listing, the admin CRUD/observability surface, and the unauthenticated
/// health probes. Shared by the real binary and integration tests alike so
/// both exercise exactly the same routing table.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::health::handler))
        .route("/v1", get(api::health::v1_status))
        .route("/v1/models", get(api::models::handler))
        .route("/v1/chat/completions", axum::routing::post(api::chat::handler))
        .route(
            "/admin/config",
            get(api::admin::list_config).post(api::admin::create_config),
        )
        .route(
            "/admin/config/{id}",
            axum::routing::put(api::admin::update_config).delete(api::admin::delete_config),
        )
        .route("/admin/stats", get(api::admin::stats))
        .route("/admin/logs", get(api::admin::logs))
        .with_state(state)
}
