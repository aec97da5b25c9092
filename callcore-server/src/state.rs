use std::sync::Arc;

use callcore::CallCore;

/// Shared handle axum clones into every handler. One per process,
/// built once in `main` from [`callcore::CallCore::new`].
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<CallCore>,
}
