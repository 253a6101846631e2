//! End-to-end scenarios driven entirely through the public facade: a fake
//! `Runner` that counts start invocations, a fake `Transport` that records
//! which addresses it was asked to gossip to, and `tokio::time::pause` +
//! `advance` to drive timer-based behavior deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use peer_coordinator::{Config, Coordinator, Entry, Result, Runner, State, Transport};

struct CountingRunner {
    starts: Arc<AtomicUsize>,
}

#[async_trait]
impl Runner for CountingRunner {
    async fn start(&self, token: CancellationToken, finish: tokio::sync::oneshot::Sender<()>) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        // Holds the "task" open until told to stop, the way a real leader
        // task would, so it only ever sends `finish` once per start.
        tokio::spawn(async move {
            token.cancelled().await;
            let _ = finish.send(());
        });
    }
}

struct LoopbackTransport {
    calls: Mutex<Vec<String>>,
}

impl LoopbackTransport {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn update_remote(&self, addr: &str, state: State) -> Result<State> {
        self.calls.lock().unwrap().push(addr.to_string());
        Ok(state)
    }
}

fn peer_entry(timestamp: i64, version: u64) -> Entry {
    Entry {
        term: 1,
        timestamp,
        version,
        out_of_sync: false,
    }
}

#[tokio::test]
async fn bootstrap_alone_elects_self_and_starts_once() {
    let starts = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(CountingRunner {
        starts: Arc::clone(&starts),
    });
    let transport = Arc::new(LoopbackTransport::new());

    let (coordinator, handle) = Coordinator::new("self-addr", Config::default(), runner, transport);
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_handle = tokio::spawn(async move { coordinator.run(run_token).await });

    let mut watcher = handle.new_leader_watcher();
    let leader = watcher.watch(token.clone()).await;
    assert_eq!(leader, "self-addr");

    token.cancel();
    run_handle.await.unwrap().unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn peer_with_smaller_timestamp_becomes_leader_and_self_does_not_start() {
    let starts = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(CountingRunner {
        starts: Arc::clone(&starts),
    });
    let transport = Arc::new(LoopbackTransport::new());

    let (coordinator, handle) = Coordinator::new("self-addr", Config::default(), runner, transport);
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_handle = tokio::spawn(async move { coordinator.run(run_token).await });

    let mut watcher = handle.new_leader_watcher();
    assert_eq!(watcher.watch(token.clone()).await, "self-addr");

    // "peer-a" has timestamp 0, unconditionally smaller than any real
    // nanos-since-epoch self timestamp, so it must win the election.
    let mut incoming = State::new();
    incoming.insert("peer-a".to_string(), peer_entry(0, 1));
    let merged = handle.submit_update(incoming).await.unwrap();
    assert!(merged.contains_key("peer-a"));

    let leader = watcher.watch(token.clone()).await;
    assert_eq!(leader, "peer-a");
    assert_eq!(starts.load(Ordering::SeqCst), 1, "self must not start a second leader task");

    token.cancel();
    run_handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn leader_loss_and_reacquisition_on_peer_expiry() {
    let starts = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(CountingRunner {
        starts: Arc::clone(&starts),
    });
    let transport = Arc::new(LoopbackTransport::new());

    let config = Config::default().with_expire_duration(Duration::from_millis(200));
    let (coordinator, handle) = Coordinator::new("self-addr", config, runner, transport);
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_handle = tokio::spawn(async move { coordinator.run(run_token).await });

    let mut watcher = handle.new_leader_watcher();
    assert_eq!(watcher.watch(token.clone()).await, "self-addr");
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    let mut incoming = State::new();
    incoming.insert("peer-a".to_string(), peer_entry(0, 1));
    handle.submit_update(incoming).await.unwrap();
    assert_eq!(watcher.watch(token.clone()).await, "peer-a");

    // peer-a stays silent past its expiry window and is never re-gossiped,
    // so the expire timer must flip it out-of-sync and self must reclaim
    // leadership.
    tokio::time::advance(Duration::from_millis(250)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let leader = watcher.watch(token.clone()).await;
    assert_eq!(leader, "self-addr");
    assert_eq!(starts.load(Ordering::SeqCst), 2, "self must restart the leader task on reacquisition");

    token.cancel();
    run_handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn sync_ticks_gossip_remotes_in_round_robin_order() {
    let starts = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(CountingRunner {
        starts: Arc::clone(&starts),
    });
    let transport = Arc::new(LoopbackTransport::new());

    let config = Config::default()
        .add_remote_address("peer-a")
        .add_remote_address("peer-b")
        .with_sync_duration(Duration::from_millis(50));
    let (coordinator, _handle) =
        Coordinator::new("self-addr", config, runner, Arc::clone(&transport) as Arc<dyn Transport>);

    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_handle = tokio::spawn(async move { coordinator.run(run_token).await });

    // init() dispatches one round to every remote immediately, then each
    // sync tick dispatches to exactly the next address in the list.
    for _ in 0..4 {
        tokio::time::advance(Duration::from_millis(50)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    token.cancel();
    run_handle.await.unwrap().unwrap();
    tokio::task::yield_now().await;

    let calls = transport.calls();
    assert!(calls.contains(&"peer-a".to_string()));
    assert!(calls.contains(&"peer-b".to_string()));

    // After the initial fan-out to both addresses, every subsequent dispatch
    // must alternate strictly between the two.
    let after_init = &calls[2..];
    for pair in after_init.windows(2) {
        assert_ne!(pair[0], pair[1], "round-robin must not call the same address twice in a row");
    }
}

#[tokio::test]
async fn watcher_blocks_until_leader_actually_changes() {
    let starts = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(CountingRunner {
        starts: Arc::clone(&starts),
    });
    let transport = Arc::new(LoopbackTransport::new());

    let (coordinator, handle) = Coordinator::new("self-addr", Config::default(), runner, transport);
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_handle = tokio::spawn(async move { coordinator.run(run_token).await });

    let mut watcher = handle.new_leader_watcher();
    assert_eq!(watcher.watch(token.clone()).await, "self-addr");

    let watch_handle = handle.clone();
    let watch_token = token.clone();
    let waiter = tokio::spawn(async move {
        let mut watcher = watcher;
        watcher.watch(watch_token).await
    });

    // Give the spawned watch a chance to register before the leader changes.
    tokio::task::yield_now().await;

    let mut incoming = State::new();
    incoming.insert("peer-a".to_string(), peer_entry(0, 1));
    let _ = watch_handle.submit_update(incoming).await.unwrap();

    let leader = waiter.await.unwrap();
    assert_eq!(leader, "peer-a");

    token.cancel();
    run_handle.await.unwrap().unwrap();
}
