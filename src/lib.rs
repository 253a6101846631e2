//! Embeddable gossip-based leader election and coordination engine.
//!
//! Peers exchange a small replicated map of liveness entries over an
//! application-supplied [`Transport`]; leadership is a pure function of that
//! map, so every peer that has converged on the same view computes the same
//! leader without a separate election protocol.
//!
//! # Architecture
//!
//! - **State algebra** ([`state`]): the replicated `Entry` map, its join
//!   semigroup (`combine`), and deterministic leader computation - all pure
//!   functions, no clock or I/O.
//! - **Event loop** ([`engine`], crate-private): a single task owns every
//!   mutable field and reacts to one `tokio::select!` over inbound updates,
//!   gossip replies, timers, leader-watch requests, and the leader task's
//!   finish signal. No locks, no shared mutable state.
//! - **Facade** ([`facade`]): [`Coordinator`] drives the event loop;
//!   [`CoordinatorHandle`] submits updates and creates [`LeaderWatcher`]s.
//! - **Capabilities** ([`capability`]): [`Runner`] and [`Transport`], the two
//!   things a caller must supply.

#![warn(missing_docs)]

pub mod capability;
pub mod config;
mod engine;
mod error;
pub mod facade;
pub mod state;
pub mod timer;

pub use capability::{Runner, Transport};
pub use config::Config;
pub use error::{CoordError, Result};
pub use facade::{Coordinator, CoordinatorHandle, LeaderWatcher};
pub use state::{Entry, NodeId, State};
pub use timer::{Timer, TokioTimer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_reachable_from_crate_root() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
