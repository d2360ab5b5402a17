// src/sitemap/fanout.rs
// =============================================================================
// Sitemap fan-out: one task per sitemap, all feeding the same URL queue.
//
// How it works:
// 1. Every sitemap gets its own task (they download in parallel)
// 2. A task fetches the document, decodes it entry by entry and pushes each
//    URL onto the bounded queue
// 3. When the queue is full the push waits. That throttles decoding down to
//    the speed of the checker workers
// 4. Every wait (fetch, decode, push) is raced against the cancellation
//    token; a cancelled task stops without pushing anything else
// 5. A supervisor collects each task's result. A failed sitemap either
//    cancels the whole run or is just logged, depending on the policy
//
// The queue is closed by ownership: only the sitemap tasks hold a Sender,
// so the queue closes exactly once, when the last task returns.
// =============================================================================

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use reqwest::Client;
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::decode::{DocumentKind, SitemapDecoder};
use super::fetch::fetch_sitemap;
use crate::config::SitemapErrorPolicy;
use crate::error::CheckError;

/// What one sitemap task did.
#[derive(Debug, Clone, Serialize)]
pub struct SitemapSummary {
    pub source: String,
    /// URLs pushed onto the queue.
    pub delivered: usize,
    /// True when cancellation cut the task short.
    pub abandoned: bool,
}

/// A sitemap that could not be fetched or decoded.
#[derive(Debug, Serialize)]
pub struct SitemapFailure {
    pub source: String,
    #[serde(serialize_with = "error_as_string")]
    pub error: CheckError,
}

fn error_as_string<S: Serializer>(error: &CheckError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Everything the fan-out stage reports once all its tasks are done.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub summaries: Vec<SitemapSummary>,
    pub failures: Vec<SitemapFailure>,
}

/// Handle to a running fan-out stage.
pub struct FanOut {
    supervisor: JoinHandle<FanOutReport>,
}

impl FanOut {
    /// Starts one task per sitemap.
    ///
    /// `queue` is moved in and cloned into each task, so the caller keeps no
    /// write handle and the queue closes when the last task ends.
    pub fn spawn(
        client: Client,
        sources: &[String],
        queue: mpsc::Sender<String>,
        cancel: CancellationToken,
        policy: SitemapErrorPolicy,
    ) -> Self {
        let mut tasks = JoinSet::new();

        for source in sources {
            let task = SitemapTask {
                source: source.clone(),
                client: client.clone(),
                queue: queue.clone(),
                cancel: cancel.clone(),
            };
            tasks.spawn(task.run());
        }
        drop(queue);

        let supervisor = tokio::spawn(supervise(tasks, cancel, policy));
        Self { supervisor }
    }

    /// Waits for every sitemap task and returns their results.
    pub async fn join(self) -> FanOutReport {
        match self.supervisor.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "sitemap supervisor panicked");
                FanOutReport::default()
            }
        }
    }
}

async fn supervise(
    mut tasks: JoinSet<Result<SitemapSummary, SitemapFailure>>,
    cancel: CancellationToken,
    policy: SitemapErrorPolicy,
) -> FanOutReport {
    let mut report = FanOutReport::default();

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok(Ok(summary)) => {
                debug!(
                    sitemap = %summary.source,
                    delivered = summary.delivered,
                    abandoned = summary.abandoned,
                    "sitemap done"
                );
                report.summaries.push(summary);
                continue;
            }
            Ok(Err(failure)) => failure,
            // Panics are caught inside the task, so this is only reachable
            // if the task was aborted
            Err(e) => SitemapFailure {
                source: "<unknown>".to_string(),
                error: CheckError::task("<unknown>", e),
            },
        };

        error!(sitemap = %failure.source, "{}", failure.error);
        if policy == SitemapErrorPolicy::Abort && !cancel.is_cancelled() {
            warn!("cancelling run after sitemap failure");
            cancel.cancel();
        }
        report.failures.push(failure);
    }

    report
}

struct SitemapTask {
    source: String,
    client: Client,
    queue: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl SitemapTask {
    async fn run(self) -> Result<SitemapSummary, SitemapFailure> {
        let result = catch_panic(&self.source, self.process()).await;
        match result {
            Ok(summary) => Ok(summary),
            Err(error) => Err(SitemapFailure {
                source: self.source,
                error,
            }),
        }
    }

    async fn process(&self) -> Result<SitemapSummary, CheckError> {
        info!(sitemap = %self.source, "fetching sitemap");

        let body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(self.summary(0, true)),
            body = fetch_sitemap(&self.client, &self.source) => body?,
        };

        let mut decoder = SitemapDecoder::new(body);
        let mut delivered = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(self.summary(delivered, true)),
                next = decoder.next_url() => {
                    next.map_err(|e| CheckError::decode(&self.source, e))?
                }
            };

            let Some(url) = next else {
                break;
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(sitemap = %self.source, delivered, "run cancelled, dropping remaining urls");
                    return Ok(self.summary(delivered, true));
                }
                sent = self.queue.send(url) => {
                    if sent.is_err() {
                        // Every checker worker is gone
                        return Ok(self.summary(delivered, true));
                    }
                    delivered += 1;
                }
            }
        }

        if decoder.kind() == Some(DocumentKind::SitemapIndex) {
            warn!(
                sitemap = %self.source,
                "sitemap index found; nested sitemaps are not followed"
            );
        }

        Ok(self.summary(delivered, false))
    }

    fn summary(&self, delivered: usize, abandoned: bool) -> SitemapSummary {
        SitemapSummary {
            source: self.source.clone(),
            delivered,
            abandoned,
        }
    }
}

/// Turns a panic inside a sitemap task into a `Task` error for that sitemap.
async fn catch_panic<F>(source: &str, task: F) -> Result<SitemapSummary, CheckError>
where
    F: Future<Output = Result<SitemapSummary, CheckError>>,
{
    match AssertUnwindSafe(task).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(CheckError::task(source, panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn urlset(urls: &[&str]) -> String {
        let entries: String = urls
            .iter()
            .map(|u| format!("<url><loc>{u}</loc></url>"))
            .collect();
        format!("<urlset>{entries}</urlset>")
    }

    async fn mount_sitemap(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_all_sitemaps_feed_one_queue_then_close_it() {
        let server = MockServer::start().await;
        mount_sitemap(&server, "/one.xml", 200, urlset(&["https://a.test/1", "https://a.test/2"]))
            .await;
        mount_sitemap(&server, "/two.xml", 200, urlset(&["https://b.test/1"])).await;

        let sources = vec![
            format!("{}/one.xml", server.uri()),
            format!("{}/two.xml", server.uri()),
        ];
        let (tx, mut rx) = mpsc::channel(1);
        let fan_out = FanOut::spawn(
            Client::new(),
            &sources,
            tx,
            CancellationToken::new(),
            SitemapErrorPolicy::Abort,
        );

        let mut urls = Vec::new();
        while let Some(url) = rx.recv().await {
            urls.push(url);
        }
        urls.sort();
        assert_eq!(urls, vec!["https://a.test/1", "https://a.test/2", "https://b.test/1"]);

        let report = fan_out.join().await;
        assert!(report.failures.is_empty());
        assert_eq!(report.summaries.len(), 2);
        assert!(report.summaries.iter().all(|s| !s.abandoned));
        let delivered: usize = report.summaries.iter().map(|s| s.delivered).sum();
        assert_eq!(delivered, 3);
    }

    #[tokio::test]
    async fn test_failure_cancels_run_under_abort_policy() {
        let server = MockServer::start().await;
        mount_sitemap(&server, "/broken.xml", 404, String::new()).await;

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let fan_out = FanOut::spawn(
            Client::new(),
            &[format!("{}/broken.xml", server.uri())],
            tx,
            cancel.clone(),
            SitemapErrorPolicy::Abort,
        );

        assert_eq!(rx.recv().await, None);
        let report = fan_out.join().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.kind(), "fetch");
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_failure_is_only_logged_under_continue_policy() {
        let server = MockServer::start().await;
        mount_sitemap(&server, "/bad.xml", 200, "<urlset><url></urlset>".to_string()).await;

        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let fan_out = FanOut::spawn(
            Client::new(),
            &[format!("{}/bad.xml", server.uri())],
            tx,
            cancel.clone(),
            SitemapErrorPolicy::Continue,
        );

        let report = fan_out.join().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.kind(), "decode");
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported_under_its_sitemap() {
        let result = catch_panic("https://a.test/sitemap.xml", async {
            if true {
                panic!("decoder exploded");
            }
            Ok(SitemapSummary {
                source: String::new(),
                delivered: 0,
                abandoned: false,
            })
        })
        .await;

        match result {
            Err(err @ CheckError::Task { .. }) => {
                assert_eq!(err.kind(), "task");
                let message = err.to_string();
                assert!(message.contains("https://a.test/sitemap.xml"));
                assert!(message.contains("decoder exploded"));
            }
            other => panic!("expected a task error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_producer_does_not_block_on_full_queue() {
        let server = MockServer::start().await;
        let urls: Vec<String> = (0..10).map(|i| format!("https://a.test/{i}")).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        mount_sitemap(&server, "/big.xml", 200, urlset(&refs)).await;

        let cancel = CancellationToken::new();
        // Nobody reads: the task fills the single slot and then waits
        let (tx, _rx) = mpsc::channel(1);
        let fan_out = FanOut::spawn(
            Client::new(),
            &[format!("{}/big.xml", server.uri())],
            tx,
            cancel.clone(),
            SitemapErrorPolicy::Abort,
        );

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        cancel.cancel();

        let report = tokio::time::timeout(std::time::Duration::from_secs(5), fan_out.join())
            .await
            .expect("fan-out hung on a full queue");
        assert_eq!(report.summaries.len(), 1);
        assert!(report.summaries[0].abandoned);
        assert_eq!(report.summaries[0].delivered, 1);
    }
}
