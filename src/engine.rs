//! The single-task event loop: owns all mutable state and drives every state
//! transition from one `tokio::select!`. Nothing here is behind a lock -
//! concurrent access from callers goes through channels into this loop
//! instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::capability::{Runner, Transport};
use crate::config::Config;
use crate::error::{CoordError, Result};
use crate::state::{check_updated, combine, compute_leader, put_entry};
use crate::state::{Entry, NodeId, State};
use crate::timer::{Timer, TokioTimer, SENTINEL_DURATION};

const UPDATE_CHANNEL_CAPACITY: usize = 256;
const WATCH_CHANNEL_CAPACITY: usize = 128;
const GOSSIP_REPLY_CHANNEL_CAPACITY: usize = 16;

/// An inbound update from the outside world (a remote peer's gossip push,
/// relayed here by the caller's `Transport` server side). The engine replies
/// on `resp` with its own state *after* merging, exactly what the original
/// caller of `update_remote` on the peer side expects back.
pub(crate) struct UpdateRequest {
    pub state: State,
    pub resp: oneshot::Sender<State>,
}

/// A request from a `LeaderWatcher` to block until the leader differs from
/// `last_leader`.
pub(crate) struct LeaderWatchRequest {
    pub last_leader: String,
    pub resp: oneshot::Sender<String>,
}

struct GossipReply {
    addr: String,
    result: Result<State>,
}

/// Owns every mutable piece of coordinator state and runs the event loop.
/// Constructed via [`Engine::new`], consumed by [`Engine::run`].
pub(crate) struct Engine {
    self_addr: String,
    self_timestamp: i64,
    config: Config,
    runner: Arc<dyn Runner>,
    transport: Arc<dyn Transport>,

    sync_timer: Box<dyn Timer>,
    expire_timer: Box<dyn Timer>,

    update_rx: mpsc::Receiver<UpdateRequest>,
    watch_rx: mpsc::Receiver<LeaderWatchRequest>,
    gossip_reply_tx: mpsc::Sender<GossipReply>,
    gossip_reply_rx: mpsc::Receiver<GossipReply>,

    state: State,
    state_term: u64,
    state_version: u64,
    last_update: HashMap<String, Instant>,
    leader: NodeId,
    runner_running: bool,
    cancel_runner: Option<CancellationToken>,
    finish_rx: Option<oneshot::Receiver<()>>,
    leader_wait_list: Vec<oneshot::Sender<String>>,
    next_addr_index: usize,
}

impl Engine {
    /// Build a fresh engine plus the two senders callers use to talk to it.
    pub(crate) fn new(
        self_addr: String,
        self_timestamp: i64,
        config: Config,
        runner: Arc<dyn Runner>,
        transport: Arc<dyn Transport>,
    ) -> (Engine, mpsc::Sender<UpdateRequest>, mpsc::Sender<LeaderWatchRequest>) {
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (watch_tx, watch_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let (gossip_reply_tx, gossip_reply_rx) = mpsc::channel(GOSSIP_REPLY_CHANNEL_CAPACITY);

        let engine = Engine {
            self_addr,
            self_timestamp,
            config,
            runner,
            transport,
            sync_timer: Box::new(TokioTimer::new()),
            expire_timer: Box::new(TokioTimer::new()),
            update_rx,
            watch_rx,
            gossip_reply_tx,
            gossip_reply_rx,
            state: State::new(),
            state_term: 0,
            state_version: 0,
            last_update: HashMap::new(),
            leader: NodeId {
                timestamp: 0,
                addr: String::new(),
            },
            runner_running: false,
            cancel_runner: None,
            finish_rx: None,
            leader_wait_list: Vec::new(),
            next_addr_index: 0,
        };

        (engine, update_tx, watch_tx)
    }

    fn self_node(&self) -> NodeId {
        NodeId {
            timestamp: self.self_timestamp,
            addr: self.self_addr.clone(),
        }
    }

    /// Run until `token` is cancelled or every inbound channel is closed.
    pub(crate) async fn run(mut self, token: CancellationToken) -> Result<()> {
        self.init().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    self.shutdown();
                    return Ok(());
                }

                maybe_req = self.update_rx.recv() => {
                    match maybe_req {
                        Some(req) => self.handle_update(req).await,
                        None => {
                            self.shutdown();
                            return Ok(());
                        }
                    }
                }

                maybe_reply = self.gossip_reply_rx.recv() => {
                    if let Some(reply) = maybe_reply {
                        self.handle_gossip_reply(reply).await;
                    }
                }

                () = &mut self.sync_timer => {
                    self.sync_timer.reset_after_fire(self.config.sync_duration);
                    self.handle_sync_tick().await;
                }

                () = &mut self.expire_timer => {
                    self.expire_timer.reset_after_fire(SENTINEL_DURATION);
                    self.handle_expire_tick().await;
                }

                maybe_watch = self.watch_rx.recv() => {
                    if let Some(req) = maybe_watch {
                        self.handle_leader_watch(req);
                    }
                }

                res = async {
                    match &mut self.finish_rx {
                        Some(rx) => rx.await,
                        None => std::future::pending().await,
                    }
                }, if self.finish_rx.is_some() => {
                    self.finish_rx = None;
                    let _ = res;
                    self.handle_finish().await;
                }
            }
        }
    }

    async fn init(&mut self) {
        self.sync_timer.reset(self.config.sync_duration);

        self.state_term = 1;
        self.state_version = 1;
        let self_entry = Entry {
            term: self.state_term,
            timestamp: self.self_timestamp,
            version: self.state_version,
            out_of_sync: false,
        };
        self.state = put_entry(&self.state, &self.self_addr, self_entry);

        tracing::info!(
            self_addr = %self.self_addr,
            sync_duration_ms = self.config.sync_duration.as_millis() as u64,
            expire_duration_ms = self.config.expire_duration.as_millis() as u64,
            remote_count = self.config.remote_addresses.len(),
            "coordinator initialized"
        );

        for addr in self.config.remote_addresses.clone() {
            self.dispatch_gossip(addr);
        }

        self.compute_and_start_leader().await;
    }

    fn merge_and_observe(&mut self, incoming: State) {
        let now = Instant::now();
        let merged = combine(&self.state, &incoming);

        for (addr, entry) in merged.iter() {
            if addr == &self.self_addr {
                continue;
            }
            match self.state.get(addr) {
                Some(old) if old == entry => {}
                _ => {
                    self.last_update.insert(addr.clone(), now);
                }
            }
        }

        self.state = self.expire_scan(now, merged);
    }

    /// Flip entries silent for longer than `expire_duration` to out-of-sync,
    /// and re-arm the expire timer for the soonest remaining deadline.
    fn expire_scan(&mut self, now: Instant, mut working: State) -> State {
        let mut min_last_seen: Option<Instant> = None;

        for (addr, &last_seen) in self.last_update.iter() {
            let entry = *working.get(addr).unwrap_or_else(|| {
                panic!("last_update entry for {addr} missing from state - invariant violated")
            });
            if entry.out_of_sync {
                continue;
            }

            if last_seen + self.config.expire_duration <= now {
                let mut flipped = entry;
                flipped.out_of_sync = true;
                working.insert(addr.clone(), flipped);
                continue;
            }

            if min_last_seen.map_or(true, |m| last_seen < m) {
                min_last_seen = Some(last_seen);
            }
        }

        if let Some(min) = min_last_seen {
            self.expire_timer.reset(min + self.config.expire_duration - now);
        }

        working
    }

    async fn handle_update(&mut self, req: UpdateRequest) {
        self.merge_and_observe(req.state);
        let _ = req.resp.send(self.state.clone());
        self.compute_and_start_leader().await;
    }

    async fn handle_gossip_reply(&mut self, reply: GossipReply) {
        match reply.result {
            Ok(state) => {
                self.merge_and_observe(state);
                self.compute_and_start_leader().await;
            }
            Err(err) => {
                tracing::warn!(addr = %reply.addr, error = %err, "gossip call failed");
            }
        }
    }

    async fn handle_sync_tick(&mut self) {
        self.state_version += 1;
        let mut candidate = Entry {
            term: self.state_term,
            timestamp: self.self_timestamp,
            version: self.state_version,
            out_of_sync: false,
        };

        let (new_term, updated) = check_updated(&self.state, &self.self_addr, candidate);
        if !updated {
            self.state_term = new_term;
            candidate.term = new_term;
        }

        self.state = put_entry(&self.state, &self.self_addr, candidate);

        tracing::debug!(
            addr = %self.self_addr,
            term = candidate.term,
            version = candidate.version,
            "sync tick authored self entry"
        );

        if !self.config.remote_addresses.is_empty() {
            let addr = self.config.remote_addresses[self.next_addr_index].clone();
            self.next_addr_index = (self.next_addr_index + 1) % self.config.remote_addresses.len();
            self.dispatch_gossip(addr);
        }

        self.compute_and_start_leader().await;
    }

    async fn handle_expire_tick(&mut self) {
        let now = Instant::now();
        let state = std::mem::take(&mut self.state);
        self.state = self.expire_scan(now, state);
        self.compute_and_start_leader().await;
    }

    fn handle_leader_watch(&mut self, req: LeaderWatchRequest) {
        if req.last_leader != self.leader.addr {
            let _ = req.resp.send(self.leader.addr.clone());
        } else {
            self.leader_wait_list.push(req.resp);
        }
    }

    async fn handle_finish(&mut self) {
        self.runner_running = false;
        self.start_leader().await;
    }

    async fn compute_and_start_leader(&mut self) {
        let now = Instant::now();
        let min_time = now - self.config.expire_duration;
        let new_leader = compute_leader(&self.state, &self.self_addr, min_time, &self.last_update);

        let self_node = self.self_node();
        if self.leader == self_node && new_leader != self_node {
            if let Some(token) = self.cancel_runner.take() {
                token.cancel();
            }
        }

        if self.leader.addr != new_leader.addr {
            tracing::info!(old = %self.leader.addr, new = %new_leader.addr, "leader changed");
            for tx in self.leader_wait_list.drain(..) {
                let _ = tx.send(new_leader.addr.clone());
            }
        }

        self.leader = new_leader;
        self.start_leader().await;
    }

    async fn start_leader(&mut self) {
        if self.runner_running {
            return;
        }
        if self.leader != self.self_node() {
            return;
        }

        let token = CancellationToken::new();
        let (finish_tx, finish_rx) = oneshot::channel();
        let child = token.clone();
        self.cancel_runner = Some(token);
        self.finish_rx = Some(finish_rx);
        self.runner_running = true;

        tracing::info!(addr = %self.self_addr, "starting leader task");
        self.runner.start(child, finish_tx).await;
    }

    fn dispatch_gossip(&self, addr: String) {
        let transport = Arc::clone(&self.transport);
        let state = self.state.clone();
        let timeout_dur = self.config.call_remote_timeout;
        let reply_tx = self.gossip_reply_tx.clone();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout_dur, transport.update_remote(&addr, state)).await {
                Ok(result) => result,
                Err(_) => Err(CoordError::Timeout { addr: addr.clone() }),
            };
            let _ = reply_tx.send(GossipReply { addr, result }).await;
        });
    }

    /// Mark self out-of-sync and push a best-effort final gossip round. Does
    /// not wait for replies - the engine is exiting right after this.
    fn shutdown(&mut self) {
        tracing::info!(addr = %self.self_addr, "shutting down");

        let entry = Entry {
            term: self.state_term,
            timestamp: self.self_timestamp,
            version: self.state_version,
            out_of_sync: true,
        };
        self.state = put_entry(&self.state, &self.self_addr, entry);

        for addr in self.config.remote_addresses.clone() {
            self.dispatch_gossip(addr);
        }
    }
}
