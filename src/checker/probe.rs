// src/checker/probe.rs
// =============================================================================
// This module checks if a single URL is alive.
//
// Key functionality:
// - Makes an HTTP HEAD request (lightweight, no body download)
// - A URL is alive only if it answers exactly 200 OK
// - Anything else (404, 500, timeout, DNS failure, ...) is a dead outcome
//   that carries the reason
//
// Rust concepts:
// - Enums with data: DeadReason holds either a status code or error details
// - impl Display: so a reason prints as "status_code=404"
// =============================================================================

use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;

/// Every HEAD probe gives up after this long.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Rough category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Request timed out
    Timeout,
    /// Could not resolve hostname
    Dns,
    /// TCP connection failed
    Connect,
    /// SSL/TLS certificate or handshake error
    Tls,
    /// Too many redirects (redirect loop)
    TooManyRedirects,
    /// Other error (bad URL, broken body, ...)
    Other,
}

impl TransportKind {
    /// Categorizes a reqwest error.
    ///
    /// reqwest only exposes a few `is_*` helpers, so the full error chain
    /// text is used for the finer DNS / TLS distinction.
    pub fn classify(error: &reqwest::Error) -> Self {
        let chain = error_chain(error).to_lowercase();

        if error.is_timeout() {
            TransportKind::Timeout
        } else if error.is_redirect() {
            TransportKind::TooManyRedirects
        } else if chain.contains("dns") || chain.contains("resolve") {
            TransportKind::Dns
        } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
            TransportKind::Tls
        } else if error.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Other
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Timeout => "timeout",
            TransportKind::Dns => "dns",
            TransportKind::Connect => "connect",
            TransportKind::Tls => "tls",
            TransportKind::TooManyRedirects => "too_many_redirects",
            TransportKind::Other => "error",
        };
        f.write_str(name)
    }
}

/// Why a URL was considered dead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeadReason {
    /// The server answered, but not with 200.
    Status { code: u16 },
    /// No usable answer at all.
    Transport { kind: TransportKind, message: String },
}

impl DeadReason {
    pub fn transport(error: &reqwest::Error) -> Self {
        DeadReason::Transport {
            kind: TransportKind::classify(error),
            message: error_chain(error),
        }
    }
}

impl fmt::Display for DeadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadReason::Status { code } => write!(f, "status_code={code}"),
            DeadReason::Transport { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

/// Result of probing one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Alive,
    Dead(DeadReason),
}

impl CheckOutcome {
    pub fn is_alive(&self) -> bool {
        matches!(self, CheckOutcome::Alive)
    }
}

/// Sends one HEAD request and classifies the answer.
///
/// The client is expected to carry the user agent and redirect policy
/// (see `coordinator::build_client`); the timeout is applied per request.
pub async fn probe(client: &Client, url: &str) -> CheckOutcome {
    match client.head(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => analyze_status(response.status()),
        Err(e) => CheckOutcome::Dead(DeadReason::transport(&e)),
    }
}

fn analyze_status(status: StatusCode) -> CheckOutcome {
    // Exactly 200, not any 2xx
    if status == StatusCode::OK {
        CheckOutcome::Alive
    } else {
        CheckOutcome::Dead(DeadReason::Status {
            code: status.as_u16(),
        })
    }
}

/// Joins an error and all of its sources into one line.
///
/// reqwest's top-level message is just "error sending request for url";
/// the useful part (DNS, refused, certificate) lives in the sources.
pub fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
