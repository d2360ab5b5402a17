// src/error.rs
// =============================================================================
// Error types for the sitemap checking pipeline.
//
// Five kinds of things can go wrong:
// - Config: the concurrency setting or a sitemap URI is invalid (fatal,
//   nothing has started yet)
// - Fetch: downloading a sitemap failed (transport error or non-2xx)
// - Decode: the sitemap body is not well-formed XML / gzip
// - Task: a sitemap task panicked (reported under its own sitemap)
// - Probe: a single URL is dead (local, only flips the final verdict)
//
// Rust concepts:
// - thiserror: derives std::error::Error and Display from attributes
// - Enums with named fields: each variant carries its own context
// =============================================================================

use thiserror::Error;

/// Every error the checker can report.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Invalid run configuration (e.g. CONC=abc).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The sitemap could not be downloaded.
    #[error("failed to fetch sitemap {source_uri}: {reason}")]
    Fetch { source_uri: String, reason: String },

    /// The sitemap was downloaded but could not be parsed.
    #[error("failed to decode sitemap {source_uri}: {reason}")]
    Decode { source_uri: String, reason: String },

    /// A sitemap task died before it could report (panic).
    #[error("sitemap task for {source_uri} crashed: {reason}")]
    Task { source_uri: String, reason: String },

    /// A URL did not answer HEAD with 200.
    #[error("dead url {url}: {reason}")]
    Probe { url: String, reason: String },

    /// The shared HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

impl CheckError {
    pub fn fetch(source_uri: &str, reason: impl ToString) -> Self {
        CheckError::Fetch {
            source_uri: source_uri.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(source_uri: &str, reason: impl ToString) -> Self {
        CheckError::Decode {
            source_uri: source_uri.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn task(source_uri: &str, reason: impl ToString) -> Self {
        CheckError::Task {
            source_uri: source_uri.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable tag, used in the JSON report.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::Config(_) => "config",
            CheckError::Fetch { .. } => "fetch",
            CheckError::Decode { .. } => "decode",
            CheckError::Task { .. } => "task",
            CheckError::Probe { .. } => "probe",
            CheckError::Client(_) => "client",
        }
    }
}
