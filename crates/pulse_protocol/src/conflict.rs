//! Conflict arbitration between a device's pending events and the events
//! it has not yet seen.
//!
//! Manifest entries act as per-resource optimistic-lock tokens: a pending
//! event may be admitted only if no unseen event from someone else touched
//! the same resources (or, under [`ConflictPolicy::NewerWins`], only if it
//! is strictly newer than every such event).
//!
//! Arbitration is pure. Each pending event is judged on its own against
//! one fixed comparison set, so batch order never changes the outcome,
//! only the order of [`Resolution::success_ids`].

use crate::event::{ClientEvent, ServerEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Reason reported under [`ConflictPolicy::OverlapReject`].
pub const REASON_MANIFEST_OVERLAP: &str = "manifest overlap";

/// Reason reported under [`ConflictPolicy::NewerWins`].
pub const REASON_NEWER_WINS: &str = "CONFLICT|NEWER_WINS";

/// How overlapping edits are arbitrated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Any unseen touch of a shared resource rejects the pending event,
    /// whatever the timestamps.
    #[default]
    OverlapReject,
    /// A pending event wins only if its `created_at` is strictly greater
    /// than every unseen event's on each shared resource. Ties go to the
    /// event already on the server.
    NewerWins,
}

impl ConflictPolicy {
    /// Maps the boolean `newerWins` switch onto a policy.
    pub fn from_newer_wins(newer_wins: bool) -> Self {
        if newer_wins {
            ConflictPolicy::NewerWins
        } else {
            ConflictPolicy::OverlapReject
        }
    }

    /// The reason string recorded for a rejected event.
    pub fn reason(&self) -> &'static str {
        match self {
            ConflictPolicy::OverlapReject => REASON_MANIFEST_OVERLAP,
            ConflictPolicy::NewerWins => REASON_NEWER_WINS,
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::OverlapReject => f.write_str("overlap"),
            ConflictPolicy::NewerWins => f.write_str("newer-wins"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overlap" | "overlap-reject" => Ok(ConflictPolicy::OverlapReject),
            "newer-wins" | "newer" => Ok(ConflictPolicy::NewerWins),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// Outcome of arbitrating one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Admitted client event ids, in pending order.
    pub success_ids: Vec<String>,
    /// Rejected client event ids mapped to a reason.
    pub errors: BTreeMap<String, String>,
}

impl Resolution {
    /// Returns the admitted ids as a set, for filtering the batch.
    pub fn admitted(&self) -> HashSet<&str> {
        self.success_ids.iter().map(String::as_str).collect()
    }
}

/// Pluggable arbiter used by the sync coordinator.
pub trait ConflictResolver: Send + Sync {
    /// Decides which of `pending` may be admitted given `new_events`, the
    /// events the submitting device has not yet seen.
    fn resolve(&self, pending: &[ClientEvent], new_events: &[ServerEvent]) -> Resolution;
}

/// The manifest-based arbiter, under one [`ConflictPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestConflictResolver {
    policy: ConflictPolicy,
}

impl ManifestConflictResolver {
    /// Creates a resolver for `policy`.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// The policy in force.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }
}

impl ConflictResolver for ManifestConflictResolver {
    fn resolve(&self, pending: &[ClientEvent], new_events: &[ServerEvent]) -> Resolution {
        resolve(pending, new_events, self.policy)
    }
}

/// Arbitrates `pending` against `new_events` under `policy`.
///
/// A server event whose `origin_client_event_id` matches one of the
/// pending ids is left out of the comparison set, so a resubmitted event
/// never conflicts with its own stored record. Events with no manifest
/// entries are always admitted.
pub fn resolve(
    pending: &[ClientEvent],
    new_events: &[ServerEvent],
    policy: ConflictPolicy,
) -> Resolution {
    let mut resolution = Resolution::default();
    if pending.is_empty() {
        return resolution;
    }

    let pending_ids: HashSet<&str> = pending
        .iter()
        .map(|e| e.client_event_id.as_str())
        .collect();
    let competitors = new_events
        .iter()
        .filter(|e| !pending_ids.contains(e.origin_client_event_id.as_str()));

    let conflicts: Box<dyn Fn(&ClientEvent) -> bool + '_> = match policy {
        ConflictPolicy::OverlapReject => {
            let touched: HashSet<&str> = competitors
                .flat_map(|e| e.payload_manifest.iter().map(String::as_str))
                .collect();
            Box::new(move |event: &ClientEvent| {
                event
                    .payload_manifest
                    .iter()
                    .any(|entry| touched.contains(entry.as_str()))
            })
        }
        ConflictPolicy::NewerWins => {
            let mut latest: HashMap<&str, i64> = HashMap::new();
            for event in competitors {
                for entry in &event.payload_manifest {
                    latest
                        .entry(entry.as_str())
                        .and_modify(|at| *at = (*at).max(event.created_at))
                        .or_insert(event.created_at);
                }
            }
            Box::new(move |event: &ClientEvent| {
                event.payload_manifest.iter().any(|entry| {
                    latest
                        .get(entry.as_str())
                        .is_some_and(|&at| event.created_at <= at)
                })
            })
        }
    };

    for event in pending {
        if conflicts(event) {
            resolution
                .errors
                .insert(event.client_event_id.clone(), policy.reason().to_string());
        } else {
            resolution.success_ids.push(event.client_event_id.clone());
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pending(id: &str, manifest: &[&str], created_at: i64) -> ClientEvent {
        ClientEvent::new(id, "t", Vec::new(), created_at).with_manifest(manifest.iter().copied())
    }

    fn stored(id: i64, origin: &str, manifest: &[&str], created_at: i64) -> ServerEvent {
        ServerEvent::from_client(id, "other-device", &pending(origin, manifest, created_at))
    }

    #[test]
    fn empty_batch_resolves_to_nothing() {
        let seen = [stored(1, "x", &["R"], 0)];
        for policy in [ConflictPolicy::OverlapReject, ConflictPolicy::NewerWins] {
            assert_eq!(resolve(&[], &seen, policy), Resolution::default());
        }
    }

    #[test]
    fn overlap_rejects_regardless_of_time() {
        let seen = [stored(1, "x", &["R"], 0)];
        let batch = [pending("new-1", &["R"], 1_000), pending("new-2", &["S"], 0)];

        let resolution = resolve(&batch, &seen, ConflictPolicy::OverlapReject);

        assert_eq!(resolution.success_ids, vec!["new-2"]);
        assert_eq!(resolution.errors["new-1"], REASON_MANIFEST_OVERLAP);
        assert!(resolution.errors["new-1"].contains("overlap"));
    }

    #[test]
    fn untracked_events_never_conflict() {
        let seen = [stored(1, "x", &["R"], 100)];
        let batch = [pending("free", &[], 0)];

        for policy in [ConflictPolicy::OverlapReject, ConflictPolicy::NewerWins] {
            let resolution = resolve(&batch, &seen, policy);
            assert_eq!(resolution.success_ids, vec!["free"]);
            assert!(resolution.errors.is_empty());
        }
    }

    #[test]
    fn newer_wins_ties_go_to_server() {
        let seen = [stored(1, "x", &["R"], 100), stored(2, "y", &["R"], 50)];

        let older = resolve(&[pending("a", &["R"], 99)], &seen, ConflictPolicy::NewerWins);
        let tie = resolve(&[pending("b", &["R"], 100)], &seen, ConflictPolicy::NewerWins);
        let newer = resolve(&[pending("c", &["R"], 101)], &seen, ConflictPolicy::NewerWins);

        assert_eq!(older.errors["a"], REASON_NEWER_WINS);
        assert_eq!(tie.errors["b"], REASON_NEWER_WINS);
        assert_eq!(newer.success_ids, vec!["c"]);
    }

    #[test]
    fn newer_wins_checks_every_shared_entry() {
        let seen = [stored(1, "x", &["A"], 10), stored(2, "y", &["B"], 500)];
        let batch = [pending("p", &["A", "B"], 100)];

        let resolution = resolve(&batch, &seen, ConflictPolicy::NewerWins);
        assert!(resolution.errors.contains_key("p"));
    }

    #[test]
    fn own_events_are_excluded_from_comparison() {
        // Already-committed copies of this very batch.
        let seen = [stored(1, "mine-1", &["R"], 0), stored(2, "mine-2", &["R"], 0)];
        let batch = [pending("mine-1", &["R"], 0), pending("mine-2", &["R"], 0)];

        for policy in [ConflictPolicy::OverlapReject, ConflictPolicy::NewerWins] {
            let resolution = resolve(&batch, &seen, policy);
            assert_eq!(resolution.success_ids, vec!["mine-1", "mine-2"]);
            assert!(resolution.errors.is_empty());
        }
    }

    #[test]
    fn policy_parsing_and_flag() {
        assert_eq!("overlap".parse::<ConflictPolicy>(), Ok(ConflictPolicy::OverlapReject));
        assert_eq!("newer-wins".parse::<ConflictPolicy>(), Ok(ConflictPolicy::NewerWins));
        assert!("whatever".parse::<ConflictPolicy>().is_err());
        assert_eq!(ConflictPolicy::from_newer_wins(true), ConflictPolicy::NewerWins);
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::OverlapReject);
        assert_eq!(
            ManifestConflictResolver::new(ConflictPolicy::NewerWins).policy(),
            ConflictPolicy::NewerWins
        );
    }

    fn arb_manifest() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(prop::sample::select(vec!["A", "B", "C", "D"]), 0..3)
            .prop_map(|v| v.into_iter().map(String::from).collect())
    }

    fn arb_batch() -> impl Strategy<Value = (Vec<ClientEvent>, Vec<ServerEvent>)> {
        let pending = prop::collection::vec((arb_manifest(), 0i64..20), 0..8).prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (manifest, at))| {
                    ClientEvent::new(format!("p{i}"), "t", Vec::new(), at).with_manifest(manifest)
                })
                .collect::<Vec<_>>()
        });
        let seen = prop::collection::vec((arb_manifest(), 0i64..20, 0usize..12), 0..8)
            .prop_map(|items| {
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, (manifest, at, origin))| {
                        let event = ClientEvent::new(format!("p{origin}"), "t", Vec::new(), at)
                            .with_manifest(manifest);
                        ServerEvent::from_client(i as i64 + 1, "peer", &event)
                    })
                    .collect::<Vec<_>>()
            });
        (pending, seen)
    }

    proptest! {
        #[test]
        fn every_pending_event_gets_exactly_one_verdict((batch, seen) in arb_batch()) {
            for policy in [ConflictPolicy::OverlapReject, ConflictPolicy::NewerWins] {
                let resolution = resolve(&batch, &seen, policy);
                prop_assert_eq!(resolution.success_ids.len() + resolution.errors.len(), batch.len());
                for id in &resolution.success_ids {
                    prop_assert!(!resolution.errors.contains_key(id));
                }
            }
        }

        #[test]
        fn newer_wins_admits_everything_overlap_admits((batch, seen) in arb_batch()) {
            let strict = resolve(&batch, &seen, ConflictPolicy::OverlapReject);
            let lenient = resolve(&batch, &seen, ConflictPolicy::NewerWins);
            let lenient_ids = lenient.admitted();
            for id in &strict.success_ids {
                prop_assert!(lenient_ids.contains(id.as_str()));
            }
        }

        #[test]
        fn verdicts_do_not_depend_on_batch_order((batch, seen) in arb_batch()) {
            let mut reversed = batch.clone();
            reversed.reverse();
            for policy in [ConflictPolicy::OverlapReject, ConflictPolicy::NewerWins] {
                let forward = resolve(&batch, &seen, policy);
                let backward = resolve(&reversed, &seen, policy);
                prop_assert_eq!(forward.admitted(), backward.admitted());
                prop_assert_eq!(forward.errors, backward.errors);
            }
        }
    }
}
