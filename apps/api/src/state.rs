use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::session::store::SessionStore;

/// Shared application state injected into all route handlers via Axum
/// extractors. The store and model client are passed explicitly — there is
/// no ambient database handle or global configuration.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub llm: LlmClient,
    /// Kept for handlers that need runtime settings beyond the pool/client.
    #[allow(dead_code)]
    pub config: Config,
}
