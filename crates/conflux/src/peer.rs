//! The reconciliation peer.
//!
//! A started peer runs three tasks:
//!
//! - the **command actor**, which owns the prefix tree and executes every
//!   tree operation and every reconciliation session strictly one at a time;
//! - the **listener**, which accepts connections one at a time, performs the
//!   handshake and waits while the actor serves the session;
//! - the **gossip** loop, supplied by the application.
//!
//! The listener and gossip loop watch a shared enable flag and each
//! acknowledge once when it is cleared. A stopped peer cannot be started
//! again.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use conflux_core::{FieldElement, ZSet};
use conflux_recon::{
    check_compatible, handshake, respond, serve, ConfigMap, SessionStats, TcpTransport, Transport,
};
use conflux_tree::{MemPrefixTree, PrefixTree};

use crate::config::PeerConfig;
use crate::error::{PeerError, Result};
use crate::gossip::{wait_disabled, Gossip, IdleGossip};

const ACTION_CAP: usize = 64;

/// Tasks that acknowledge a stop: the listener and the gossip loop.
const STOP_ACKS: usize = 2;

/// Elements a remote holds that the local tree lacks, learned in one
/// successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recover {
    pub remote_addr: String,
    pub remote_config: ConfigMap,
    pub remote_elements: Vec<FieldElement>,
}

impl fmt::Display for Recover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} elements",
            self.remote_addr,
            self.remote_elements.len()
        )
    }
}

enum Action {
    Insert {
        z: FieldElement,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        z: FieldElement,
        reply: oneshot::Sender<Result<()>>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
    Serve {
        transport: Box<dyn Transport>,
        remote_config: ConfigMap,
        reply: oneshot::Sender<Result<SessionStats>>,
    },
    Initiate {
        transport: Box<dyn Transport>,
        remote_config: ConfigMap,
        reply: oneshot::Sender<Result<ZSet>>,
    },
    Shutdown,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Insert { z, .. } => write!(f, "Insert({z})"),
            Action::Remove { z, .. } => write!(f, "Remove({z})"),
            Action::Len { .. } => f.write_str("Len"),
            Action::Serve { transport, .. } => write!(f, "Serve({})", transport.remote_addr()),
            Action::Initiate { transport, .. } => {
                write!(f, "Initiate({})", transport.remote_addr())
            }
            Action::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// A cloneable handle for submitting commands to a running peer.
#[derive(Clone)]
pub struct PeerHandle {
    config: Arc<PeerConfig>,
    actions: mpsc::Sender<Action>,
}

impl PeerHandle {
    /// The peer's configuration.
    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Insert an element into the tree.
    pub async fn insert(&self, z: FieldElement) -> Result<()> {
        self.request(|reply| Action::Insert { z, reply }).await?
    }

    /// Remove an element from the tree.
    pub async fn remove(&self, z: FieldElement) -> Result<()> {
        self.request(|reply| Action::Remove { z, reply }).await?
    }

    /// Number of elements in the tree.
    pub async fn len(&self) -> Result<usize> {
        self.request(|reply| Action::Len { reply }).await
    }

    /// Connect to a remote peer and answer its reconciliation session.
    ///
    /// Returns the elements the remote holds and we lack; the same set is
    /// also delivered as a [`Recover`] event when non-empty.
    pub async fn reconcile_with<A: ToSocketAddrs>(&self, addr: A) -> Result<ZSet> {
        let mut transport = TcpTransport::connect(addr).await?;
        let remote = transport.remote_addr();
        info!(%remote, "initiating reconciliation");

        let local = self.config.config_map();
        let remote_config =
            handshake::initiate(&mut transport, &local, self.config.handshake_timeout).await?;
        check_compatible(&local, &remote_config)?;

        self.request(|reply| Action::Initiate {
            transport: Box::new(transport),
            remote_config,
            reply,
        })
        .await?
    }

    /// Handshake with an accepted connection and serve its session.
    async fn accept(&self, stream: TcpStream) -> Result<SessionStats> {
        let mut transport = TcpTransport::new(stream)?;
        let local = self.config.config_map();
        let remote_config =
            handshake::accept(&mut transport, &local, self.config.handshake_timeout).await?;
        check_compatible(&local, &remote_config)?;

        self.request(|reply| Action::Serve {
            transport: Box::new(transport),
            remote_config,
            reply,
        })
        .await?
    }

    async fn send(&self, action: Action) -> Result<()> {
        self.actions
            .send(action)
            .await
            .map_err(|_| PeerError::ActorGone)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Action) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| PeerError::ActorGone)
    }
}

fn send_reply<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        warn!("failed to send reply: receiver dropped");
    }
}

/// Owns the tree; runs commands one at a time.
struct Actor<P> {
    tree: P,
    config: Arc<PeerConfig>,
    actions: mpsc::Receiver<Action>,
    recover_tx: mpsc::Sender<Recover>,
    enabled: watch::Receiver<bool>,
}

impl<P: PrefixTree> Actor<P> {
    async fn run(mut self) {
        while let Some(action) = self.actions.recv().await {
            trace!(%action, "tick");
            if let Action::Shutdown = action {
                break;
            }
            self.on_action(action).await;
        }
        debug!("command actor stopped");
    }

    async fn on_action(&mut self, action: Action) {
        match action {
            Action::Insert { z, reply } => {
                send_reply(reply, self.tree.insert(&z).map_err(PeerError::from));
            }
            Action::Remove { z, reply } => {
                send_reply(reply, self.tree.remove(&z).map_err(PeerError::from));
            }
            Action::Len { reply } => send_reply(reply, self.tree.len()),
            Action::Serve {
                mut transport,
                remote_config,
                reply,
            } => {
                let result = serve(&self.tree, &mut *transport, &self.config.recon).await;
                let remote_addr = close(transport.as_mut()).await;
                let result = match result {
                    Ok(outcome) => {
                        self.deliver(remote_addr, remote_config, outcome.recovered)
                            .await;
                        Ok(outcome.stats)
                    }
                    Err(e) => Err(e.into()),
                };
                send_reply(reply, result);
            }
            Action::Initiate {
                mut transport,
                remote_config,
                reply,
            } => {
                let result = respond(&self.tree, &mut *transport, &self.config.recon).await;
                let remote_addr = close(transport.as_mut()).await;
                let result = match result {
                    Ok(recovered) => {
                        self.deliver(remote_addr, remote_config, recovered.clone())
                            .await;
                        Ok(recovered)
                    }
                    Err(e) => Err(e.into()),
                };
                send_reply(reply, result);
            }
            Action::Shutdown => {}
        }
    }

    /// Hand recovered elements to the application.
    ///
    /// Gives up if the peer is disabled while the channel is full.
    async fn deliver(&mut self, remote_addr: String, remote_config: ConfigMap, recovered: ZSet) {
        if recovered.is_empty() {
            return;
        }
        let recover = Recover {
            remote_addr,
            remote_config,
            remote_elements: recovered.items(),
        };
        debug!(%recover, "delivering recover");

        tokio::select! {
            biased;
            sent = self.recover_tx.send(recover) => {
                if sent.is_err() {
                    debug!("recover receiver dropped");
                }
            }
            _ = wait_disabled(&mut self.enabled) => {
                warn!("peer stopping, recover event dropped");
            }
        }
    }
}

/// Close a session's connection, returning the remote address.
async fn close(transport: &mut dyn Transport) -> String {
    let remote_addr = transport.remote_addr();
    if let Err(e) = transport.close().await {
        debug!(remote = %remote_addr, error = %e, "close failed");
    }
    remote_addr
}

async fn listen(
    listener: TcpListener,
    handle: PeerHandle,
    mut enabled: watch::Receiver<bool>,
    stopped: mpsc::Sender<()>,
) {
    loop {
        tokio::select! {
            _ = wait_disabled(&mut enabled) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(%addr, "connection accepted");
                    // The next connection waits until this one is done.
                    tokio::select! {
                        biased;
                        _ = wait_disabled(&mut enabled) => break,
                        served = handle.accept(stream) => match served {
                            Ok(stats) => debug!(%addr, ?stats, "session served"),
                            Err(e) => warn!(%addr, error = %e, "session aborted"),
                        },
                    }
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }

    drop(listener);
    debug!("listener stopped");
    let _ = stopped.send(()).await;
}

struct Running {
    handle: PeerHandle,
    enabled: watch::Sender<bool>,
    stopped: mpsc::Receiver<()>,
    actor: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// A reconciliation peer over a prefix tree.
pub struct Peer<P: PrefixTree> {
    config: Arc<PeerConfig>,
    tree: Option<P>,
    gossip: Arc<dyn Gossip>,
    recover_rx: Option<mpsc::Receiver<Recover>>,
    running: Option<Running>,
    stopped: bool,
}

impl Peer<MemPrefixTree> {
    /// A peer over an empty in-memory tree shaped by `config.tree`.
    pub fn in_memory(config: PeerConfig) -> Result<Self> {
        let tree = MemPrefixTree::new(config.tree.clone())?;
        Ok(Self::new(config, tree))
    }
}

impl<P: PrefixTree> Peer<P> {
    /// Create a stopped peer that never initiates on its own.
    pub fn new(config: PeerConfig, tree: P) -> Self {
        Self::with_gossip(config, tree, IdleGossip)
    }

    /// Create a stopped peer driven by `gossip` once started.
    pub fn with_gossip(mut config: PeerConfig, tree: P, gossip: impl Gossip) -> Self {
        // Advertise the shape of the tree actually in use.
        config.tree.bit_quantum = tree.bit_quantum();
        Self {
            config: Arc::new(config),
            tree: Some(tree),
            gossip: Arc::new(gossip),
            recover_rx: None,
            running: None,
            stopped: false,
        }
    }

    /// The peer's configuration.
    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// True between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind the listener and spawn the actor, listener and gossip tasks.
    ///
    /// Fails with [`PeerError::Stopped`] once the peer has been stopped.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(PeerError::AlreadyStarted);
        }
        if self.stopped {
            return Err(PeerError::Stopped);
        }
        self.config.validate()?;

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.config.recon_port)).await?;
        let local_addr = listener.local_addr()?;
        let tree = self.tree.take().ok_or(PeerError::Stopped)?;

        let (action_tx, action_rx) = mpsc::channel(ACTION_CAP);
        let (enabled_tx, enabled_rx) = watch::channel(true);
        let (stopped_tx, stopped_rx) = mpsc::channel(STOP_ACKS);
        let (recover_tx, recover_rx) = mpsc::channel(self.config.recover_buffer.max(1));

        let handle = PeerHandle {
            config: Arc::clone(&self.config),
            actions: action_tx,
        };
        let span = info_span!("peer", name = %self.config.log_name);

        let actor = Actor {
            tree,
            config: Arc::clone(&self.config),
            actions: action_rx,
            recover_tx,
            enabled: enabled_rx.clone(),
        };
        let actor = tokio::spawn(actor.run().instrument(span.clone()));

        tokio::spawn(
            listen(
                listener,
                handle.clone(),
                enabled_rx.clone(),
                stopped_tx.clone(),
            )
            .instrument(span.clone()),
        );

        let gossip = Arc::clone(&self.gossip);
        let gossip_handle = handle.clone();
        tokio::spawn(
            async move {
                gossip.run(gossip_handle, enabled_rx).await;
                debug!("gossip stopped");
                let _ = stopped_tx.send(()).await;
            }
            .instrument(span),
        );

        self.recover_rx = Some(recover_rx);
        self.running = Some(Running {
            handle,
            enabled: enabled_tx,
            stopped: stopped_rx,
            actor,
            local_addr,
        });
        info!(peer = %self.config.log_name, %local_addr, "started");
        Ok(())
    }

    /// Stop the background tasks and drop the tree.
    ///
    /// Commands still queued behind the shutdown fail with
    /// [`PeerError::ActorGone`]; later calls on the peer fail with
    /// [`PeerError::Stopped`]. Stopping a peer that is not running only logs.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            info!(peer = %self.config.log_name, "stop: peer not running");
            return;
        };
        info!(peer = %self.config.log_name, "stopping");

        self.stopped = true;
        running.enabled.send_replace(false);
        for _ in 0..STOP_ACKS {
            if running.stopped.recv().await.is_none() {
                warn!(peer = %self.config.log_name, "stop acknowledgements ended early");
                break;
            }
        }

        if running.handle.send(Action::Shutdown).await.is_err() {
            warn!(peer = %self.config.log_name, "command actor already gone");
        }
        drop(running.handle);
        if let Err(e) = running.actor.await {
            error!(peer = %self.config.log_name, error = %e, "command actor failed");
        }
        self.recover_rx = None;
        info!(peer = %self.config.log_name, "stopped");
    }

    /// A handle for submitting commands, e.g. from application tasks.
    pub fn handle(&self) -> Result<PeerHandle> {
        Ok(self.running()?.handle.clone())
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.running()?.local_addr)
    }

    /// Take the receiver of [`Recover`] events. Available once per start.
    pub fn take_recover_rx(&mut self) -> Option<mpsc::Receiver<Recover>> {
        self.recover_rx.take()
    }

    /// Insert an element into the tree.
    pub async fn insert(&self, z: FieldElement) -> Result<()> {
        self.running()?.handle.insert(z).await
    }

    /// Remove an element from the tree.
    pub async fn remove(&self, z: FieldElement) -> Result<()> {
        self.running()?.handle.remove(z).await
    }

    /// Number of elements in the tree.
    pub async fn len(&self) -> Result<usize> {
        self.running()?.handle.len().await
    }

    /// Reconcile with the peer listening at `addr`.
    pub async fn reconcile_with<A: ToSocketAddrs>(&self, addr: A) -> Result<ZSet> {
        self.running()?.handle.reconcile_with(addr).await
    }

    fn running(&self) -> Result<&Running> {
        match &self.running {
            Some(running) => Ok(running),
            None if self.stopped => Err(PeerError::Stopped),
            None => Err(PeerError::NotRunning),
        }
    }
}

impl<P: PrefixTree> Drop for Peer<P> {
    fn drop(&mut self) {
        // The tasks wind down once disabled; the actor exits when the last
        // handle is dropped.
        if let Some(running) = &self.running {
            running.enabled.send_replace(false);
        }
    }
}
