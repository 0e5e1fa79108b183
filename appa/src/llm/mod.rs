mod api;
mod provider;

pub use api::LlmApiClient;
pub use provider::{LlmBackend, LlmProvider};
