//! Stress tests for the sync core.
//!
//! These harnesses hammer a server or store from many threads and then
//! check the log is still a gap-free, duplicate-free sequence.

use crate::fixtures::TestClient;
use pulse_protocol::ClientEvent;
use pulse_server::{EventStore, SyncServer};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread: appends or exchanges, depending on the test.
    pub operations: usize,
    /// Number of concurrent threads, one device each.
    pub threads: usize,
    /// Events recorded before each exchange.
    pub batch_size: usize,
    /// Distinct manifest entries; 0 makes every event untracked.
    pub resource_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 100,
            threads: 4,
            batch_size: 5,
            resource_count: 0,
        }
    }
}

/// Appends from every thread directly to `store`.
pub fn stress_concurrent_appends(store: Arc<dyn EventStore>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;

            thread::spawn(move || {
                let device = format!("device-{t}");
                for i in 0..operations {
                    let event = ClientEvent::new(format!("{t}-{i}"), "stress", vec![0xAB; 32], i as i64);
                    match store.append(&device, &event) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs full sync exchanges from every thread, each thread acting as one
/// device. Returns the result and the final state of each client.
///
/// A client's cursor jumps to the highest id it received, which can be
/// one of its own appends; an event another device committed between
/// this client's download and upload is then never delivered to it.
/// Callers that need complete projections should rewind and resync.
pub fn stress_concurrent_devices(
    server: &SyncServer,
    config: &StressConfig,
) -> (StressTestResult, Vec<TestClient>) {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let resources: Vec<String> = (0..config.resource_count).map(|r| format!("res-{r}")).collect();

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let server = server.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let resources = resources.clone();
            let config = config.clone();

            thread::spawn(move || {
                let mut client = TestClient::new(format!("device-{t}"));
                for i in 0..config.operations {
                    for b in 0..config.batch_size {
                        let manifest: Vec<&str> = resources
                            .get((t + i + b) % resources.len().max(1))
                            .map(String::as_str)
                            .into_iter()
                            .collect();
                        client.record(&manifest);
                    }
                    match client.sync(&server) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
                client
            })
        })
        .collect();

    let clients = handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .collect();

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    (result, clients)
}

/// Has every thread resubmit the same batch under the same device id.
pub fn stress_resubmission(server: &SyncServer, config: &StressConfig) -> StressTestResult {
    let batch: Vec<ClientEvent> = (0..config.batch_size)
        .map(|i| ClientEvent::new(format!("shared-{i}"), "stress", Vec::new(), i as i64))
        .collect();
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let server = server.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let batch = batch.clone();
            let operations = config.operations;

            thread::spawn(move || {
                for _ in 0..operations {
                    let mut client = TestClient::new("shared-device");
                    for event in &batch {
                        client.queue(event.clone());
                    }
                    match client.sync(&server) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Checks the whole log: ids are exactly `1..=n` in order and no
/// `(device, client event id)` pair appears twice. Returns `n`.
pub fn verify_log(store: &dyn EventStore) -> Result<usize, String> {
    let events = store.list_after(0).map_err(|e| e.to_string())?;
    let mut seen = HashSet::new();

    for (i, event) in events.iter().enumerate() {
        let expected = i as i64 + 1;
        if event.server_event_id != expected {
            return Err(format!(
                "expected id {expected} at position {i}, found {}",
                event.server_event_id
            ));
        }
        let key = (
            event.origin_client_device_id.as_str(),
            event.origin_client_event_id.as_str(),
        );
        if !seen.insert(key) {
            return Err(format!("{key:?} committed twice"));
        }
    }

    Ok(events.len())
}
