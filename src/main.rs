// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Set up logging (tracing, to stderr)
// 2. Parse command-line arguments using clap and validate them (CONC, URLs)
// 3. Run the sitemap check pipeline
// 4. Print the report and exit with proper code (0 = all alive, 1 = dead
//    URLs, broken sitemaps or bad configuration)
// =============================================================================

// Module declarations - tells Rust about our other source files
mod checker;     // src/checker/ - HEAD probes and the worker pool
mod cli;         // src/cli.rs - command-line parsing
mod config;      // src/config.rs - validated run configuration
mod coordinator; // src/coordinator.rs - wires the pipeline together
mod error;       // src/error.rs - error types
mod sitemap;     // src/sitemap/ - sitemap download, decoding and fan-out
mod telemetry;   // src/telemetry.rs - logging setup

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use cli::Cli;
use config::RunConfig;
use coordinator::RunReport;

#[tokio::main]
async fn main() {
    telemetry::init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // Bad configuration or no HTTP client: nothing was checked
            error!("{:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

// Returns the process exit code for a completed run
async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = RunConfig::try_from(&cli)?;

    info!(
        concurrency = config.concurrency.get(),
        sitemaps = config.sitemaps.len(),
        "starting sitemap check"
    );

    let report = coordinator::run(&config).await?;
    print_report(&report, cli.json)?;

    Ok(report.exit_code())
}

// Prints the report either as a table or JSON
fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let json_output = serde_json::to_string_pretty(report)?;
        println!("{}", json_output);
    } else {
        print_table(report);
    }
    Ok(())
}

// Prints dead URLs and failed sitemaps as a human-readable table
fn print_table(report: &RunReport) {
    if !report.dead.is_empty() {
        println!("{:<70} {:<30}", "DEAD URL", "REASON");
        println!("{}", "=".repeat(100));

        for dead in &report.dead {
            // Truncate URL if too long for display
            let url_display = if dead.url.chars().count() > 67 {
                format!("{}...", dead.url.chars().take(67).collect::<String>())
            } else {
                dead.url.clone()
            };
            println!("{:<70} {:<30}", url_display, dead.reason.to_string());
        }
        println!();
    }

    for failure in &report.failures {
        println!("❌ sitemap {} [{}]: {}", failure.source, failure.error.kind(), failure.error);
    }

    let delivered: usize = report.sitemaps.iter().map(|s| s.delivered).sum();

    println!("📊 Summary:");
    println!("   🗺️  Sitemaps read: {}", report.sitemaps.len());
    println!("   ⚠️  Sitemaps failed: {}", report.failures.len());
    println!("   📋 URLs found: {}", delivered);
    println!("   ✅ Alive: {}", report.probed - report.dead.len());
    println!("   ❌ Dead: {}", report.dead.len());
    if report.cancelled {
        println!("   ⏹️  Run was cancelled before every URL was checked");
    }
}
