//! Research client boundary
//!
//! The orchestrator only sees [`ResearchClient`]: given a company or firm
//! name it returns a typed record or an error. Prompt construction, response
//! decoding, correction re-prompts and transport retries all live behind
//! this trait.

pub mod gemini;
pub mod parse;
pub mod prompts;

use crate::company::{CompanyRecord, PeFirmProfile};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use gemini::GeminiClient;

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Gemini API key is not configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode Gemini response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ResearchError {
    /// Throttling, server-side failures and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ResearchError::Http(e) => e.is_timeout() || e.is_connect(),
            ResearchError::Api { status, .. } => *status == 429 || *status >= 500,
            ResearchError::MissingApiKey | ResearchError::Decode(_) => false,
        }
    }
}

/// External knowledge service that researches companies and PE firms.
///
/// Calls are not idempotent: the service is live, so repeated calls may
/// return different answers. "Not found" is encoded as Unknown/N-A fields on
/// the returned record, never as an error.
#[async_trait]
pub trait ResearchClient: Send + Sync {
    async fn analyze_company(&self, name: &str) -> Result<CompanyRecord, ResearchError>;

    async fn research_pe_firm(&self, name: &str) -> Result<PeFirmProfile, ResearchError>;
}

/// Builds a client for one batch from its API credential.
pub type ClientFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn ResearchClient>, ResearchError> + Send + Sync>;
