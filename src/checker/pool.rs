// src/checker/pool.rs
// =============================================================================
// The URL checker pool: a fixed number of workers draining one shared queue.
//
// How it works:
// 1. N workers are spawned (N = the concurrency limit)
// 2. Each worker takes the next URL from the queue, probes it, and sends a
//    ProbeRecord to the coordinator
// 3. A worker stops when the queue is closed and empty (normal end), or when
//    the run is cancelled
//
// Cancellation is cooperative:
// - Waiting for the next URL is raced against the cancellation token, so an
//   idle worker returns as soon as the run is cancelled
// - A probe that already started is NOT raced; it finishes or hits its own
//   10 second timeout
//
// Rust concepts:
// - tokio::select!: wait on several futures, take whichever finishes first
// - Arc<Mutex<Receiver>>: tokio's mpsc channel has one receiver, so the
//   workers share it behind an async mutex
// - JoinSet: a group of spawned tasks we can wait on together
// =============================================================================

use std::num::NonZeroUsize;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::probe::{probe, CheckOutcome};
use crate::error::CheckError;

type SharedQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// One probe, as reported by a worker.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub worker: usize,
    pub url: String,
    pub outcome: CheckOutcome,
}

/// A running pool of checker workers.
pub struct CheckerPool {
    workers: JoinSet<()>,
    records: mpsc::Receiver<ProbeRecord>,
}

impl CheckerPool {
    /// Spawns exactly `size` workers reading from `queue`.
    pub fn spawn(
        size: NonZeroUsize,
        queue: mpsc::Receiver<String>,
        client: Client,
        cancel: CancellationToken,
        verbose: bool,
    ) -> Self {
        let queue: SharedQueue = Arc::new(Mutex::new(queue));
        let (record_tx, records) = mpsc::channel(size.get());

        let mut workers = JoinSet::new();
        for id in 0..size.get() {
            let worker = Worker {
                id,
                queue: queue.clone(),
                client: client.clone(),
                cancel: cancel.clone(),
                records: record_tx.clone(),
                verbose,
            };
            workers.spawn(worker.run());
        }

        debug!(workers = size.get(), "checker pool started");

        Self { workers, records }
    }

    /// Number of workers that have not been joined yet.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Next probe record; `None` once every worker has exited.
    pub async fn next_record(&mut self) -> Option<ProbeRecord> {
        self.records.recv().await
    }

    /// Waits for every worker task to finish.
    pub async fn join(mut self) {
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "checker worker panicked");
            }
        }
    }
}

struct Worker {
    id: usize,
    queue: SharedQueue,
    client: Client,
    cancel: CancellationToken,
    records: mpsc::Sender<ProbeRecord>,
    verbose: bool,
}

impl Worker {
    async fn run(self) {
        loop {
            // Check cancellation first so a cancelled run never starts
            // another probe, even with URLs still queued
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(worker = self.id, "run cancelled, worker stopping");
                    break;
                }
                next = next_url(&self.queue) => next,
            };

            // Queue closed and drained: no more work
            let Some(url) = next else {
                break;
            };

            // Cancelled while this URL was being dequeued
            if self.cancel.is_cancelled() {
                debug!(worker = self.id, url, "run cancelled, url not checked");
                break;
            }

            let outcome = probe(&self.client, &url).await;
            self.log_outcome(&url, &outcome);

            let record = ProbeRecord {
                worker: self.id,
                url,
                outcome,
            };
            if self.records.send(record).await.is_err() {
                // Nobody is listening anymore
                break;
            }
        }

        debug!(worker = self.id, "worker finished");
    }

    fn log_outcome(&self, url: &str, outcome: &CheckOutcome) {
        match outcome {
            CheckOutcome::Dead(reason) => {
                let err = CheckError::Probe {
                    url: url.to_string(),
                    reason: reason.to_string(),
                };
                warn!(worker = self.id, "{err}");
            }
            CheckOutcome::Alive if self.verbose => info!(worker = self.id, url, "alive url"),
            CheckOutcome::Alive => debug!(worker = self.id, url, "alive url"),
        }
    }
}

async fn next_url(queue: &SharedQueue) -> Option<String> {
    queue.lock().await.recv().await
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What does `biased;` do in select!?
//    - Normally select! picks a random ready branch
//    - biased makes it check branches top to bottom
//    - So if the run is cancelled AND a URL is waiting, cancellation wins
//
// 2. Why is the probe outside the select!?
//    - Anything inside select! gets dropped when another branch wins
//    - Dropping a reqwest future aborts the request mid-flight
//    - Keeping the probe outside means it always runs to the end
//
// 3. When does the queue report "closed"?
//    - recv() returns None once every Sender is dropped and the buffer is
//      empty
//    - The fan-out tasks own the senders, so that happens exactly when the
//      last sitemap task returns
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pool_size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    async fn drain(pool: &mut CheckerPool) -> Vec<ProbeRecord> {
        let mut records = Vec::new();
        while let Some(record) = pool.next_record().await {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_spawns_exactly_n_workers_and_terminates() {
        let (tx, rx) = mpsc::channel::<String>(7);
        let mut pool = CheckerPool::spawn(
            pool_size(7),
            rx,
            Client::new(),
            CancellationToken::new(),
            false,
        );
        assert_eq!(pool.worker_count(), 7);

        // Closing the queue is all it takes for every worker to exit
        drop(tx);
        let records = tokio::time::timeout(Duration::from_secs(5), drain(&mut pool))
            .await
            .expect("pool did not terminate");
        assert!(records.is_empty());
        pool.join().await;
    }

    #[tokio::test]
    async fn test_each_url_checked_once() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .expect(5)
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::channel(3);
        let mut pool =
            CheckerPool::spawn(pool_size(3), rx, Client::new(), CancellationToken::new(), true);

        let uri = server.uri();
        tokio::spawn(async move {
            for i in 0..5 {
                tx.send(format!("{uri}/page/{i}")).await.unwrap();
            }
        });

        let mut records = drain(&mut pool).await;
        pool.join().await;

        records.sort_by(|a, b| a.url.cmp(&b.url));
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.outcome.is_alive()));
        assert!(records.iter().all(|r| r.worker < 3));
        assert!(records[0].url.ends_with("/page/0"));
    }

    #[tokio::test]
    async fn test_no_new_probe_starts_after_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // URLs are already waiting when the pool starts, but the run is
        // cancelled: however the dequeue and the cancellation interleave,
        // no worker may send a request
        let (tx, rx) = mpsc::channel(4);
        for i in 0..4 {
            tx.send(format!("{}/queued/{i}", server.uri())).await.unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut pool = CheckerPool::spawn(pool_size(4), rx, Client::new(), cancel, false);
        let records = tokio::time::timeout(Duration::from_secs(5), drain(&mut pool))
            .await
            .expect("pool did not stop after cancellation");
        pool.join().await;

        assert!(records.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn test_cancellation_stops_idle_workers_but_lets_probes_finish() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let mut pool = CheckerPool::spawn(pool_size(3), rx, Client::new(), cancel.clone(), false);

        // Two workers pick these up; the third waits on the empty queue
        tx.send(format!("{}/slow/1", server.uri())).await.unwrap();
        tx.send(format!("{}/slow/2", server.uri())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        cancel.cancel();

        // Queued after cancellation: must never be probed
        tx.send(format!("{}/never", server.uri())).await.unwrap();

        // The queue is still open (tx alive), so the pool can only end
        // because of cancellation
        let records = tokio::time::timeout(Duration::from_secs(5), drain(&mut pool))
            .await
            .expect("pool did not stop after cancellation");
        pool.join().await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.outcome.is_alive()));
        assert!(records.iter().all(|r| !r.url.ends_with("/never")));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2);
        drop(tx);
    }
}
