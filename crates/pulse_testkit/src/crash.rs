//! Crash recovery testing for the durable event log.
//!
//! A crash while appending leaves a prefix of the log on disk. These
//! harnesses cut a captured log at every possible length, reopen it, and
//! check that exactly the fully written events come back and that the
//! store accepts appends again.
//!
//! ## Usage
//!
//! ```rust
//! use pulse_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new(5);
//! harness.run_all_tests();
//! assert!(harness.all_passed(), "{}", harness.summary());
//! ```

use crate::fixtures::{TestClient, TestServer};
use pulse_protocol::ClientEvent;
use pulse_server::{EventStore, LogEventStore, StoreResult};
use pulse_storage::MemoryBackend;

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected events after recovery.
    pub expected_events: usize,
    /// Actual events after recovery.
    pub actual_events: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, events: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_events: events,
            actual_events: events,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_events: expected,
            actual_events: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    /// Events written before each simulated crash.
    pub event_count: usize,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness that writes `event_count` events per scenario.
    pub fn new(event_count: usize) -> Self {
        Self {
            event_count,
            results: Vec::new(),
        }
    }

    fn event(&self, i: usize) -> ClientEvent {
        ClientEvent::new(format!("ev-{i}"), "crash", vec![i as u8; 16], i as i64)
            .with_manifest([format!("res-{}", i % 3)])
    }

    /// Writes the scenario's events and returns the raw log plus the byte
    /// length after each event.
    fn captured_log(&self) -> StoreResult<(Vec<u8>, Vec<u64>)> {
        let store = LogEventStore::open(MemoryBackend::new())?;
        let mut boundaries = Vec::with_capacity(self.event_count);
        for i in 0..self.event_count {
            store.append("device", &self.event(i))?;
            boundaries.push(store.log_size());
        }
        Ok((store.into_backend().bytes().to_vec(), boundaries))
    }

    fn record(&mut self, result: CrashRecoveryResult) -> CrashRecoveryResult {
        self.results.push(result.clone());
        result
    }

    /// Cuts the log at every byte length and checks that only whole
    /// events survive and that the next append gets the next id.
    pub fn test_truncation_at_every_offset(&mut self) -> CrashRecoveryResult {
        let description = "Torn tail truncated at every offset";
        let (bytes, boundaries) = match self.captured_log() {
            Ok(log) => log,
            Err(e) => return self.record(CrashRecoveryResult::fail(description, 0, 0, &e.to_string())),
        };

        for cut in 0..=bytes.len() {
            let expected = boundaries.iter().filter(|&&b| b <= cut as u64).count();
            let outcome = LogEventStore::open(MemoryBackend::with_bytes(bytes[..cut].to_vec()))
                .and_then(|store| {
                    let recovered = store.len()?;
                    let next = store.append("device", &self.event(recovered))?;
                    Ok((recovered, next.server_event_id))
                });

            match outcome {
                Ok((recovered, next_id)) if recovered == expected && next_id == expected as i64 + 1 => {}
                Ok((recovered, next_id)) => {
                    return self.record(CrashRecoveryResult::fail(
                        description,
                        expected,
                        recovered,
                        &format!("cut at {cut}: next id {next_id}"),
                    ));
                }
                Err(e) => {
                    return self.record(CrashRecoveryResult::fail(
                        description,
                        expected,
                        0,
                        &format!("cut at {cut}: {e}"),
                    ));
                }
            }
        }

        self.record(CrashRecoveryResult::pass(description, self.event_count))
    }

    /// Flips a byte in the final frame's checksum and checks that only that
    /// frame is dropped.
    pub fn test_corrupt_tail_dropped(&mut self) -> CrashRecoveryResult {
        let description = "Corrupt final frame dropped";
        let expected = self.event_count.saturating_sub(1);

        let outcome = self.captured_log().and_then(|(mut bytes, _)| {
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
            LogEventStore::open(MemoryBackend::with_bytes(bytes))?.len()
        });

        let result = match outcome {
            Ok(actual) if actual == expected => CrashRecoveryResult::pass(description, actual),
            Ok(actual) => CrashRecoveryResult::fail(description, expected, actual, "wrong event count"),
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// Fails the backend mid-run and checks that nothing after the
    /// failure is visible, before or after reopening.
    pub fn test_failed_write_not_committed(&mut self) -> CrashRecoveryResult {
        let description = "Failed write not committed";
        let committed = self.event_count / 2;

        let outcome = (|| -> StoreResult<(usize, bool)> {
            let mut backend = MemoryBackend::new();
            {
                let store = LogEventStore::open(backend)?;
                for i in 0..committed {
                    store.append("device", &self.event(i))?;
                }
                backend = store.into_backend();
            }
            backend.set_reject_writes(true);
            let store = LogEventStore::open(backend)?;
            let rejected = store.append("device", &self.event(committed)).is_err();

            let mut backend = store.into_backend();
            backend.set_reject_writes(false);
            let store = LogEventStore::open(backend)?;
            let absent = !store.exists("device", &format!("ev-{committed}"))?;
            Ok((store.len()?, rejected && absent))
        })();

        let result = match outcome {
            Ok((actual, true)) if actual == committed => CrashRecoveryResult::pass(description, actual),
            Ok((actual, _)) => {
                CrashRecoveryResult::fail(description, committed, actual, "failed append became visible")
            }
            Err(e) => CrashRecoveryResult::fail(description, committed, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// Syncs through a file-backed server, restarts it, and checks that
    /// resubmitting the same events commits nothing new.
    pub fn test_idempotency_survives_restart(&mut self) -> CrashRecoveryResult {
        let description = "Idempotency survives restart";
        let expected = self.event_count;

        let outcome = (|| -> Result<usize, String> {
            let server = TestServer::file();
            let batch: Vec<ClientEvent> = (0..expected).map(|i| self.event(i)).collect();

            let mut client = TestClient::new("device");
            batch.iter().cloned().for_each(|e| client.queue(e));
            client.sync(&server).map_err(|e| e.to_string())?;

            let server = server.restart().map_err(|e| e.to_string())?;
            let mut replay = TestClient::new("device");
            batch.into_iter().for_each(|e| replay.queue(e));
            let response = replay.sync(&server).map_err(|e| e.to_string())?;
            if response.success_client_event_ids.len() != expected {
                return Err("resubmission not acknowledged".into());
            }
            server.event_store().len().map_err(|e| e.to_string())
        })();

        let result = match outcome {
            Ok(actual) if actual == expected => CrashRecoveryResult::pass(description, actual),
            Ok(actual) => CrashRecoveryResult::fail(description, expected, actual, "duplicate commit"),
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e),
        };
        self.record(result)
    }

    /// Runs all crash recovery tests.
    pub fn run_all_tests(&mut self) -> Vec<CrashRecoveryResult> {
        vec![
            self.test_truncation_at_every_offset(),
            self.test_corrupt_tail_dropped(),
            self.test_failed_write_not_committed(),
            self.test_idempotency_survives_restart(),
        ]
    }

    /// Returns a summary of all test results.
    pub fn summary(&self) -> String {
        let passed = self.results.iter().filter(|r| r.passed).count();
        let mut summary = format!("Crash recovery: {}/{} passed\n", passed, self.results.len());
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            summary.push_str(&format!("  [{}] {}", status, result.description));
            if let Some(error) = &result.error {
                summary.push_str(&format!(": {}", error));
            }
            summary.push('\n');
        }
        summary
    }

    /// Returns true if all tests passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}
