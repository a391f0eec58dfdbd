use std::sync::Arc;
use telemon_storage::MetricsStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricsStore>,
    /// Enables `HashSHA256` verification and response signing.
    pub sign_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn MetricsStore>, sign_key: Option<&str>) -> Self {
        Self {
            store,
            sign_key: sign_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }
}
