//! Replicated state algebra.
//!
//! Pure functions over the gossiped state map: the per-entry total order, the
//! join (`combine`), the self-entry term-bump trick (`check_updated`), and
//! deterministic leader computation (`compute_leader`). Nothing in this
//! module touches a clock, a channel, or I/O - every function here is a pure
//! function of its arguments, which is what makes the join laws in the crate
//! tests checkable at all.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;

/// One peer's gossiped liveness record.
///
/// Small, `Copy` plain old data - safe to hand across the `Transport`
/// boundary and cheap to clone into a new `State` on every merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Bumped when an observer must overrule a stale remote view of its own
    /// entry after a crash-restart (the owning peer's `version` resets to 1,
    /// but a remote still remembers a much higher `version` for the old
    /// incarnation).
    pub term: u64,
    /// Nanoseconds since `UNIX_EPOCH`, chosen once at process birth. The
    /// durable identity ranking: older peer wins leader election.
    pub timestamp: i64,
    /// Bumped by the owning peer on every sync tick; proves liveness.
    pub version: u64,
    /// Sticky-on marker: the entry is expired, or the owning peer is
    /// shutting down. Excluded from leader-election candidates.
    pub out_of_sync: bool,
}

/// The replicated map: peer address -> that peer's latest known `Entry`.
pub type State = HashMap<String, Entry>;

/// A leader identity: the pair leader election orders on.
///
/// Ordered by `(timestamp ascending, addr ascending)` - the longest-lived
/// peer leads, and address breaks ties between peers born in the same
/// nanosecond.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId {
    /// Start-time ranking key.
    pub timestamp: i64,
    /// The peer's network address.
    pub addr: String,
}

/// Strict total order on entries: `a < b` iff, by lexicographic priority,
/// `term`, then `timestamp`, then `version`, then `out_of_sync` (false sorts
/// less than true, so an out-of-sync entry is preserved across merges until
/// a later term/timestamp/version supersedes it).
pub fn entry_less(a: &Entry, b: &Entry) -> bool {
    if a.term != b.term {
        return a.term < b.term;
    }
    if a.timestamp != b.timestamp {
        return a.timestamp < b.timestamp;
    }
    if a.version != b.version {
        return a.version < b.version;
    }
    !a.out_of_sync && b.out_of_sync
}

/// Join two states: for every key present in either map, keep the greater
/// entry under [`entry_less`]. Idempotent, commutative, associative - ties
/// (equal entries) resolve to either side, since they compare equal.
pub fn combine(a: &State, b: &State) -> State {
    let mut result = a.clone();
    for (addr, entry) in b {
        match result.get(addr) {
            Some(existing) if !entry_less(existing, entry) => {}
            _ => {
                result.insert(addr.clone(), *entry);
            }
        }
    }
    result
}

/// Decide how to bump the self-entry when the sync tick fires.
///
/// Returns `(new_term, updated)`:
/// - `addr` absent from `state`: `(0, true)` - the candidate is accepted
///   as-is into a fresh slot. The `0` is a sentinel; callers must not adopt
///   it into their own term counter.
/// - the existing entry is strictly less than `candidate`: `(0, true)` -
///   candidate wins under its own (already correct) term. Again a sentinel.
/// - otherwise: `candidate.term` is rewritten to the existing entry's term;
///   if that revised candidate now strictly exceeds the existing entry,
///   returns `(existing.term, false)` - the caller should adopt that term.
///   Else returns `(existing.term + 1, false)` - the caller must jump to a
///   higher term to overrule the remote's stale-but-still-winning view.
pub fn check_updated(state: &State, addr: &str, mut candidate: Entry) -> (u64, bool) {
    let Some(existing) = state.get(addr) else {
        return (0, true);
    };

    if entry_less(existing, &candidate) {
        return (0, true);
    }

    candidate.term = existing.term;
    if entry_less(existing, &candidate) {
        (existing.term, false)
    } else {
        (existing.term + 1, false)
    }
}

/// Return a state identical to `state` except with `addr` unconditionally
/// mapped to `entry` - no merge, a plain replace. Used only when the engine
/// authors its own entry (sync tick, shutdown), never for merging remote
/// state.
pub fn put_entry(state: &State, addr: &str, entry: Entry) -> State {
    let mut result = state.clone();
    result.insert(addr.to_string(), entry);
    result
}

/// Deterministic leader election.
///
/// The candidate set always includes `self_addr`, regardless of its
/// `out_of_sync` bit or its absence from `last_update` (a peer is always a
/// candidate for itself). Every other address is a candidate iff its entry
/// is not `out_of_sync` and `last_update` records it as having changed more
/// recently than `min_time`. The leader is the minimum [`NodeId`] over the
/// candidate set.
pub fn compute_leader(
    state: &State,
    self_addr: &str,
    min_time: Instant,
    last_update: &HashMap<String, Instant>,
) -> NodeId {
    let mut candidates: Vec<NodeId> = Vec::new();

    if let Some(self_entry) = state.get(self_addr) {
        candidates.push(NodeId {
            timestamp: self_entry.timestamp,
            addr: self_addr.to_string(),
        });
    }

    for (addr, entry) in state {
        if addr == self_addr {
            continue;
        }
        if entry.out_of_sync {
            continue;
        }
        let Some(&last_seen) = last_update.get(addr) else {
            continue;
        };
        if last_seen <= min_time {
            continue;
        }
        candidates.push(NodeId {
            timestamp: entry.timestamp,
            addr: addr.clone(),
        });
    }

    candidates
        .into_iter()
        .min()
        .expect("self_addr must always be a candidate once state[self_addr] exists")
}
