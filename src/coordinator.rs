// src/coordinator.rs
// =============================================================================
// The run coordinator wires the two stages together and builds the verdict.
//
//   sitemaps ──► [ FanOut: 1 task / sitemap ] ──► bounded queue (cap = N)
//                                                      │
//                          [ CheckerPool: N workers ] ◄┘
//                                     │
//                      probe records  ▼
//                              coordinator folds them into a RunReport
//
// The coordinator:
// - builds the shared HTTP client
// - owns the cancellation token (cancelled on every way out via a DropGuard)
// - is the only place the run result is updated, so no locks or atomics are
//   needed for it
// =============================================================================

use reqwest::redirect::Policy;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::checker::{CheckOutcome, CheckerPool, DeadReason, ProbeRecord};
use crate::config::RunConfig;
use crate::error::CheckError;
use crate::sitemap::{FanOut, SitemapFailure, SitemapSummary};

/// Sent with every request so site owners can tell who is knocking.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Sitemapcheckerbot/0.1; +https://github.com/Apmyp/sitemap_checker)";

const MAX_REDIRECTS: usize = 10;

/// A URL that did not answer 200.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLink {
    pub url: String,
    pub reason: DeadReason,
    /// Which worker probed it.
    pub worker: usize,
}

/// Everything a run found out.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    /// Number of URLs probed (alive or dead).
    pub probed: usize,
    pub dead: Vec<DeadLink>,
    pub sitemaps: Vec<SitemapSummary>,
    pub failures: Vec<SitemapFailure>,
    /// The run was cut short by cancellation.
    pub cancelled: bool,
}

impl RunReport {
    /// True only if no URL was dead and every sitemap was read.
    pub fn all_alive(&self) -> bool {
        self.dead.is_empty() && self.failures.is_empty()
    }

    /// 0 = everything alive, 1 = dead URLs or broken sitemaps.
    pub fn exit_code(&self) -> i32 {
        if self.all_alive() {
            0
        } else {
            1
        }
    }

    fn record(&mut self, record: ProbeRecord) {
        self.probed += 1;
        if record.outcome.is_alive() {
            return;
        }
        if let CheckOutcome::Dead(reason) = record.outcome {
            self.dead.push(DeadLink {
                url: record.url,
                reason,
                worker: record.worker,
            });
        }
    }
}

/// Builds the HTTP client shared by the fan-out and the checker pool.
///
/// No global timeout: sitemap downloads may legitimately take a while.
/// Probes set their own.
pub fn build_client() -> Result<Client, CheckError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()?;
    Ok(client)
}

/// Runs one full check.
pub async fn run(config: &RunConfig) -> Result<RunReport, CheckError> {
    let client = build_client()?;
    Ok(run_with_client(config, client).await)
}

/// Runs one full check with the given client.
pub async fn run_with_client(config: &RunConfig, client: Client) -> RunReport {
    let cancel = CancellationToken::new();
    // Whatever happens below, leaving this function cancels the run
    let _cancel_on_exit = cancel.clone().drop_guard();

    let (queue_tx, queue_rx) = mpsc::channel(config.concurrency.get());

    let fan_out = FanOut::spawn(
        client.clone(),
        &config.sitemaps,
        queue_tx,
        cancel.clone(),
        config.on_sitemap_error,
    );
    let mut pool = CheckerPool::spawn(
        config.concurrency,
        queue_rx,
        client,
        cancel.clone(),
        config.verbose,
    );
    debug!(workers = pool.worker_count(), "checker pool running");

    let mut report = RunReport::default();
    while let Some(record) = pool.next_record().await {
        report.record(record);
    }
    pool.join().await;

    let sitemaps = fan_out.join().await;
    report.sitemaps = sitemaps.summaries;
    report.failures = sitemaps.failures;
    report.cancelled = cancel.is_cancelled();

    info!(
        probed = report.probed,
        dead = report.dead.len(),
        failed_sitemaps = report.failures.len(),
        cancelled = report.cancelled,
        "run finished"
    );

    report
}
