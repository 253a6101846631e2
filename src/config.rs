//! Engine configuration: the remote-address round-robin list and the three
//! tunable durations, with the defaults the engine falls back to when the
//! caller doesn't set them.

use std::time::Duration;

const DEFAULT_SYNC_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_EXPIRE_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_CALL_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine configuration.
///
/// Built with [`Config::default`] plus chainable `with_*`/`add_*` methods,
/// e.g.:
///
/// ```
/// use peer_coordinator::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .add_remote_address("10.0.0.2:9000")
///     .add_remote_address("10.0.0.3:9000")
///     .with_sync_duration(Duration::from_secs(2));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Remote peer addresses gossiped to in round-robin order on every sync
    /// tick. Empty means this peer gossips to nobody (a single-node cluster).
    pub remote_addresses: Vec<String>,
    /// Interval between self-entry bumps and gossip dispatch.
    pub sync_duration: Duration,
    /// Silence window after which a peer's entry is marked out-of-sync.
    pub expire_duration: Duration,
    /// Per-gossip RPC deadline.
    pub call_remote_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_addresses: Vec::new(),
            sync_duration: DEFAULT_SYNC_DURATION,
            expire_duration: DEFAULT_EXPIRE_DURATION,
            call_remote_timeout: DEFAULT_CALL_REMOTE_TIMEOUT,
        }
    }
}

impl Config {
    /// Append a remote address to the round-robin gossip list.
    pub fn add_remote_address(mut self, addr: impl Into<String>) -> Self {
        self.remote_addresses.push(addr.into());
        self
    }

    /// Override the interval between self-entry bumps and gossip ticks.
    pub fn with_sync_duration(mut self, d: Duration) -> Self {
        self.sync_duration = d;
        self
    }

    /// Override the silence window after which an entry is marked
    /// out-of-sync.
    pub fn with_expire_duration(mut self, d: Duration) -> Self {
        self.expire_duration = d;
        self
    }

    /// Override the per-gossip RPC deadline.
    pub fn with_call_remote_timeout(mut self, d: Duration) -> Self {
        self.call_remote_timeout = d;
        self
    }

    /// Reject configurations that can never make progress: a zero sync or
    /// expire duration would spin the event loop or immediately expire every
    /// peer, which is never what a caller intends.
    pub fn validate(&self) -> Result<(), String> {
        if self.sync_duration.is_zero() {
            return Err("sync_duration must be greater than zero".to_string());
        }
        if self.expire_duration.is_zero() {
            return Err("expire_duration must be greater than zero".to_string());
        }
        Ok(())
    }
}
