//! Server configuration.

use pulse_protocol::ConflictPolicy;
use std::time::Duration;

/// Configuration for the sync core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How overlapping edits are arbitrated.
    pub conflict_policy: ConflictPolicy,
    /// Poll interval suggested to clients as `nextHeartbeatMs`.
    pub heartbeat_interval: Duration,
    /// Maximum pending events accepted in one request; unlimited when
    /// `None`. A request over the limit acknowledges nothing, so a device
    /// whose outbox outgrew it has to split its batch to make progress.
    pub max_pending_events: Option<usize>,
}

impl ServerConfig {
    /// Creates a configuration with the production defaults.
    pub fn new() -> Self {
        Self {
            conflict_policy: ConflictPolicy::OverlapReject,
            heartbeat_interval: Duration::from_millis(15_000),
            max_pending_events: None,
        }
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the suggested heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Caps the pending events per request.
    pub fn with_max_pending_events(mut self, max: usize) -> Self {
        self.max_pending_events = Some(max);
        self
    }

    /// The heartbeat interval as carried on the wire.
    pub fn heartbeat_ms(&self) -> i32 {
        i32::try_from(self.heartbeat_interval.as_millis()).unwrap_or(i32::MAX)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.conflict_policy, ConflictPolicy::OverlapReject);
        assert_eq!(config.heartbeat_ms(), 15_000);
        assert_eq!(config.max_pending_events, None);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_conflict_policy(ConflictPolicy::NewerWins)
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_max_pending_events(10);

        assert_eq!(config.conflict_policy, ConflictPolicy::NewerWins);
        assert_eq!(config.heartbeat_ms(), 5_000);
        assert_eq!(config.max_pending_events, Some(10));
    }

    #[test]
    fn huge_heartbeat_saturates() {
        let config = ServerConfig::new().with_heartbeat_interval(Duration::from_secs(u64::MAX / 4));
        assert_eq!(config.heartbeat_ms(), i32::MAX);
    }
}
