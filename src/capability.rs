//! The two external collaborators the engine calls out to: the caller's
//! long-running task (`Runner`) and the gossip transport (`Transport`).
//! Both are modelled as `#[async_trait]` object-safe traits so the engine can
//! hold them as `Arc<dyn Runner>` / `Arc<dyn Transport>` without needing a
//! generic parameter that would otherwise infect `Engine`'s and
//! `Coordinator`'s type signatures.

use crate::state::State;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// The caller-supplied task whose lifecycle the leader manages.
///
/// `start` must return promptly: it is called from inside the engine's event
/// loop, so it must spawn the actual work (e.g. via `tokio::spawn`) rather
/// than run it inline. The task must send exactly one value on `finish` when
/// it exits, whether it ran to completion or observed `token` cancelled.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Launch the long-running task, signalling `finish` exactly once on
    /// exit.
    async fn start(&self, token: CancellationToken, finish: oneshot::Sender<()>);
}

/// The gossip transport: carries this peer's `State` to another peer and
/// returns whatever state comes back (typically the peer's own merged view,
/// folded back in by the engine as another update event).
///
/// Implementations are expected to apply their own `call_remote_timeout`
/// internally or rely on the engine wrapping the call in
/// `tokio::time::timeout` - the engine does the latter, so a `Transport`
/// only needs to behave correctly when cancelled mid-flight.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Gossip `state` to `addr`, returning the peer's reply.
    async fn update_remote(&self, addr: &str, state: State) -> Result<State>;
}
