//! Retrieval-augmented question answering over a user's documents:
//! vector-search retrieval with optional judge escalation, cached and
//! recovered model generation, and best-effort analytics.
//!
//! External collaborators (vector store, language model, judge, memory,
//! analytics) are trait objects supplied by the embedding application;
//! [`llm`] ships an OpenAI-compatible [`traits::LanguageModel`].

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod llm;
pub mod models;
pub mod recovery;
pub mod retrieval;
pub mod service;
pub mod telemetry;
pub mod traits;

pub use config::Config;
pub use error::{AppaError, Result};
pub use models::{AnswerRequest, AnswerResponse};
pub use service::{AnswerService, StreamingAnswer};
