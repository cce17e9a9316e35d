//! Shared Application State
//!
//! The `AppState` struct holds the shared, clonable resources every handler
//! needs: the session store, the chat-LLM client, the content library, and
//! the loaded configuration.

use crate::config::Config;
use std::sync::Arc;
use troupe_core::{content::ContentLibrary, llm_client::LLMClient};

/// The shared application state, created once at startup and passed to all
/// handlers. All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<crate::store::Store>,
    pub llm_client: Arc<dyn LLMClient>,
    pub library: Arc<ContentLibrary>,
    pub config: Arc<Config>,
}
