use std::sync::Arc;

use tracing::error;

use orbit_db::Database;
use orbit_gateway::Dispatcher;

use crate::error::{ApiError, ApiResult};
use crate::llm::ChatCompleter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    /// Mark the `jwt` cookie `Secure` (production behind TLS).
    pub cookie_secure: bool,
    pub llm: Arc<dyn ChatCompleter>,
    pub llm_model: String,
}

/// Run a database closure off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
}
