// src/config.rs
// =============================================================================
// Turns the parsed CLI into a validated RunConfig.
//
// RunConfig is built once, before any network work, and then only read.
// Every stage receives it (or the pieces it needs) explicitly.
// =============================================================================

use std::num::NonZeroUsize;

use url::Url;

use crate::cli::Cli;
use crate::error::CheckError;

/// Concurrency used when CONC / --concurrency is absent.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// What to do when a sitemap cannot be fetched or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SitemapErrorPolicy {
    /// Cancel the whole run on the first broken sitemap.
    #[default]
    Abort,
    /// Log the failure and keep going with the other sitemaps.
    Continue,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of checker workers, also the capacity of the URL queue.
    pub concurrency: NonZeroUsize,
    /// Sitemap URIs, in the order they were given.
    pub sitemaps: Vec<String>,
    /// Log alive URLs too.
    pub verbose: bool,
    pub on_sitemap_error: SitemapErrorPolicy,
}

impl RunConfig {
    pub fn new(concurrency: NonZeroUsize, sitemaps: Vec<String>) -> Self {
        Self {
            concurrency,
            sitemaps,
            verbose: false,
            on_sitemap_error: SitemapErrorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SitemapErrorPolicy) -> Self {
        self.on_sitemap_error = policy;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl TryFrom<&Cli> for RunConfig {
    type Error = CheckError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let concurrency = parse_concurrency(cli.concurrency.as_deref())?;

        for sitemap in &cli.sitemaps {
            validate_sitemap_uri(sitemap)?;
        }

        let policy = if cli.keep_going {
            SitemapErrorPolicy::Continue
        } else {
            SitemapErrorPolicy::Abort
        };

        Ok(RunConfig::new(concurrency, cli.sitemaps.clone())
            .with_policy(policy)
            .with_verbose(cli.verbose))
    }
}

/// Parses the CONC setting.
///
/// Absent (or blank) means the default; anything else must be a positive
/// integer.
pub fn parse_concurrency(raw: Option<&str>) -> Result<NonZeroUsize, CheckError> {
    let value = match raw.map(str::trim) {
        None | Some("") => return Ok(default_concurrency()),
        Some(value) => value,
    };

    let number: usize = value
        .parse()
        .map_err(|e| CheckError::Config(format!("CONC={value:?} is not a valid number: {e}")))?;

    NonZeroUsize::new(number)
        .ok_or_else(|| CheckError::Config("CONC must be at least 1".to_string()))
}

fn default_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN)
}

fn validate_sitemap_uri(raw: &str) -> Result<(), CheckError> {
    let url = Url::parse(raw)
        .map_err(|e| CheckError::Config(format!("invalid sitemap URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(CheckError::Config(format!(
            "unsupported scheme '{other}' in sitemap URL '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_absent_concurrency_uses_default() {
        assert_eq!(parse_concurrency(None).unwrap().get(), 100);
        assert_eq!(parse_concurrency(Some("  ")).unwrap().get(), 100);
    }

    #[test]
    fn test_valid_concurrency() {
        assert_eq!(parse_concurrency(Some("8")).unwrap().get(), 8);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = parse_concurrency(Some("0")).unwrap_err();
        assert!(matches!(err, CheckError::Config(_)));
    }

    #[test]
    fn test_garbage_concurrency_rejected() {
        assert!(matches!(
            parse_concurrency(Some("abc")),
            Err(CheckError::Config(_))
        ));
        assert!(matches!(
            parse_concurrency(Some("-3")),
            Err(CheckError::Config(_))
        ));
    }

    #[test]
    fn test_config_from_cli() {
        let cli = Cli::try_parse_from([
            "sitemap-checker",
            "--concurrency",
            "4",
            "--keep-going",
            "-v",
            "https://example.com/sitemap.xml.gz",
        ])
        .unwrap();

        let config = RunConfig::try_from(&cli).unwrap();
        assert_eq!(config.concurrency.get(), 4);
        assert_eq!(config.on_sitemap_error, SitemapErrorPolicy::Continue);
        assert!(config.verbose);
        assert_eq!(config.sitemaps, vec!["https://example.com/sitemap.xml.gz"]);
    }

    #[test]
    fn test_config_rejects_non_http_sitemap() {
        let cli = Cli::try_parse_from(["sitemap-checker", "-c", "2", "ftp://example.com/s.xml"])
            .unwrap();
        assert!(matches!(RunConfig::try_from(&cli), Err(CheckError::Config(_))));

        let cli = Cli::try_parse_from(["sitemap-checker", "-c", "2", "not a url"]).unwrap();
        assert!(matches!(RunConfig::try_from(&cli), Err(CheckError::Config(_))));
    }
}
