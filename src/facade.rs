//! Public entry point: constructs the engine, picks the self identity, and
//! hands back a cheaply-cloneable handle for submitting updates and watching
//! the leader while [`Coordinator::run`] drives the event loop on its own
//! task.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::capability::{Runner, Transport};
use crate::config::Config;
use crate::engine::{Engine, LeaderWatchRequest, UpdateRequest};
use crate::error::{CoordError, Result};
use crate::state::State;

/// Owns the event loop. Construct with [`Coordinator::new`], then move the
/// returned `Coordinator` onto its own task and call [`Coordinator::run`];
/// use the paired [`CoordinatorHandle`] from any other task to submit
/// updates or watch the leader.
pub struct Coordinator {
    engine: Engine,
}

impl Coordinator {
    /// Construct a coordinator for `self_addr`, using `runner` for the
    /// leader task and `transport` for gossip calls. The self identity's
    /// `timestamp` is nanoseconds since `UNIX_EPOCH` at construction time,
    /// matching every other peer's timestamp source.
    pub fn new(
        self_addr: impl Into<String>,
        config: Config,
        runner: Arc<dyn Runner>,
        transport: Arc<dyn Transport>,
    ) -> (Coordinator, CoordinatorHandle) {
        let self_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before UNIX_EPOCH")
            .as_nanos() as i64;

        let (engine, update_tx, watch_tx) =
            Engine::new(self_addr.into(), self_timestamp, config, runner, transport);

        let coordinator = Coordinator { engine };
        let handle = CoordinatorHandle { update_tx, watch_tx };
        (coordinator, handle)
    }

    /// Run the event loop until `token` is cancelled. Consumes `self`: a
    /// coordinator is driven by exactly one task for its whole lifetime.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        self.engine.run(token).await
    }
}

/// A cheap, `Clone`-able reference to a running [`Coordinator`]. Used to
/// submit inbound gossip updates and to create [`LeaderWatcher`]s from
/// whatever task is driving the `Transport` server side or watching for
/// leadership changes.
#[derive(Clone)]
pub struct CoordinatorHandle {
    update_tx: mpsc::Sender<UpdateRequest>,
    watch_tx: mpsc::Sender<LeaderWatchRequest>,
}

impl CoordinatorHandle {
    /// Feed a remote peer's gossiped state into the engine and wait for the
    /// merged result. This is what a `Transport` server implementation calls
    /// when it receives an inbound gossip push.
    pub async fn submit_update(&self, state: State) -> Result<State> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.update_tx
            .send(UpdateRequest { state, resp: resp_tx })
            .await
            .map_err(|_| CoordError::ChannelClosed("update"))?;
        resp_rx.await.map_err(|_| CoordError::ChannelClosed("update"))
    }

    /// Create a new [`LeaderWatcher`], starting from the empty string so its
    /// first `watch` call returns as soon as any leader is known.
    pub fn new_leader_watcher(&self) -> LeaderWatcher {
        LeaderWatcher {
            handle: self.clone(),
            last_leader: String::new(),
        }
    }
}

/// Blocks on leader changes one at a time. Each successful [`watch`][Self::watch]
/// call remembers the leader it returned, so the next call only resolves once
/// the leader differs again.
pub struct LeaderWatcher {
    handle: CoordinatorHandle,
    last_leader: String,
}

impl LeaderWatcher {
    /// Wait until the leader differs from the last one this watcher
    /// observed, or `token` is cancelled (in which case the empty string is
    /// returned without waiting).
    pub async fn watch(&mut self, token: CancellationToken) -> String {
        let (resp_tx, resp_rx) = oneshot::channel();
        let req = LeaderWatchRequest {
            last_leader: self.last_leader.clone(),
            resp: resp_tx,
        };

        if self.handle.watch_tx.send(req).await.is_err() {
            return self.last_leader.clone();
        }

        tokio::select! {
            _ = token.cancelled() => String::new(),
            leader = resp_rx => {
                match leader {
                    Ok(leader) => {
                        self.last_leader = leader.clone();
                        leader
                    }
                    Err(_) => self.last_leader.clone(),
                }
            }
        }
    }
}
