mod context;
mod orchestrator;

pub use context::{build_search_string, format_context_blocks, INSUFFICIENT_CONTEXT_NOTE};
pub use orchestrator::{RetrievalOrchestrator, RetrievalOutcome};
