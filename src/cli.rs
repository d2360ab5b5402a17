// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API: the CLI structure is a plain struct and clap
// generates the parsing code from the #[...] attributes.
//
// The concurrency limit can come from either --concurrency or the CONC
// environment variable. It is kept as a raw string here and validated in
// config.rs so that a bad value becomes our own ConfigError.
// =============================================================================

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "sitemap-checker",
    version = "0.1.0",
    about = "Check that every URL listed in XML sitemaps is alive",
    long_about = "sitemap-checker downloads each sitemap, extracts every <url><loc> entry and \
                  sends a HEAD request to it. Any URL that does not answer 200 is reported \
                  and the process exits with code 1. Handy as a CI/CD or cron job."
)]
pub struct Cli {
    /// Sitemap URLs to check (e.g., https://example.com/sitemap.xml)
    ///
    /// One or more positional arguments. Gzip-compressed sitemaps work too.
    #[arg(required = true, value_name = "SITEMAP")]
    pub sitemaps: Vec<String>,

    /// Number of URLs probed at the same time (default: 100)
    ///
    /// Also read from the CONC environment variable.
    /// Must be a positive integer.
    #[arg(short, long, env = "CONC", value_name = "N")]
    pub concurrency: Option<String>,

    /// Keep checking the other sitemaps when one fails to download or parse
    ///
    /// Without this flag the first broken sitemap stops the whole run.
    #[arg(long)]
    pub keep_going: bool,

    /// Log alive URLs as well as dead ones
    #[arg(short, long)]
    pub verbose: bool,

    /// Output the final report in JSON format instead of a table
    #[arg(long)]
    pub json: bool,
}
