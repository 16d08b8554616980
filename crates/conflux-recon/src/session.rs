//! Server side of a reconciliation session.
//!
//! The session walks the local prefix tree top-down, sending one request per
//! node and refining wherever the remote answers `SyncFail`. Requests are
//! pipelined: up to `max_outstanding_recon_requests` may be awaiting replies,
//! and replies are matched to requests strictly in send order.
//!
//! ```text
//! request_q: nodes still to ask about
//! bottom_q:  requests sent and awaiting a reply, plus flush barriers
//! ```
//!
//! When no reply is buffered and either the window is full or nothing is left
//! to send, a `FlushEnded` barrier is queued and the session switches to
//! blocking reads until the barrier reaches the front.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use conflux_core::{Bitstring, ZSet};
use conflux_tree::{PrefixNode, PrefixTree};

use crate::error::{ReconError, Result};
use crate::messages::ReconMsg;
use crate::transport::Transport;

/// Configuration for reconciliation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Nodes smaller than this are sent in full rather than as a digest.
    pub mbar: usize,
    /// Maximum requests awaiting a reply at once.
    pub max_outstanding_recon_requests: usize,
    /// Bound on each blocking read while flushing.
    pub read_timeout: Duration,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            mbar: 5,
            max_outstanding_recon_requests: 100,
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl ReconConfig {
    fn window(&self) -> usize {
        self.max_outstanding_recon_requests.max(1)
    }
}

/// A node to ask the remote about.
#[derive(Debug)]
pub struct RequestEntry<N> {
    pub node: N,
    pub key: Bitstring,
}

/// An entry of the in-flight queue.
#[derive(Debug)]
pub enum BottomEntry<N> {
    /// A request sent and awaiting its reply.
    Bottom(RequestEntry<N>),
    /// Barrier marking the end of a flush.
    FlushEnded,
}

/// Counters collected over one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub full_requests: usize,
    pub poly_requests: usize,
    pub replies: usize,
    pub flushes: usize,
    pub peak_in_flight: usize,
}

/// Result of a completed session.
#[derive(Debug, Default)]
pub struct SessionOutcome {
    /// Elements the remote has and we lack.
    pub recovered: ZSet,
    pub stats: SessionStats,
}

/// One reconciliation session against a connected remote.
pub struct ReconSession<'t, T: ?Sized, N> {
    config: ReconConfig,
    transport: &'t mut T,
    request_q: VecDeque<RequestEntry<N>>,
    bottom_q: VecDeque<BottomEntry<N>>,
    recovered: ZSet,
    flushing: bool,
    in_flight: usize,
    stats: SessionStats,
}

impl<'t, T, N> ReconSession<'t, T, N>
where
    T: Transport + ?Sized,
    N: PrefixNode + Send,
{
    /// Create a session over an established, handshaken transport.
    pub fn new(config: ReconConfig, transport: &'t mut T) -> Self {
        Self {
            config,
            transport,
            request_q: VecDeque::new(),
            bottom_q: VecDeque::new(),
            recovered: ZSet::new(),
            flushing: false,
            in_flight: 0,
            stats: SessionStats::default(),
        }
    }

    /// Reconcile the subtree at `root`, addressed to the remote as `key`.
    ///
    /// Sends `Done` once every request has been answered. Any error aborts
    /// the session without sending anything further.
    pub async fn run(mut self, root: N, key: Bitstring) -> Result<SessionOutcome> {
        debug!(remote = %self.transport.remote_addr(), %key, "reconciliation started");
        self.request_q.push_back(RequestEntry { node: root, key });

        while !(self.request_q.is_empty() && self.bottom_q.is_empty()) {
            match self.bottom_q.pop_front() {
                None => self.send_next().await?,
                Some(BottomEntry::FlushEnded) => {
                    trace!("flush ended");
                    self.flushing = false;
                }
                Some(BottomEntry::Bottom(entry)) => self.poll_reply(entry).await?,
            }
        }

        self.transport.send(ReconMsg::Done).await?;
        debug!(
            remote = %self.transport.remote_addr(),
            recovered = self.recovered.len(),
            stats = ?self.stats,
            "reconciliation finished"
        );
        Ok(SessionOutcome {
            recovered: self.recovered,
            stats: self.stats,
        })
    }

    /// Handle the oldest in-flight request, which has been popped as `entry`.
    async fn poll_reply(&mut self, entry: RequestEntry<N>) -> Result<()> {
        if let Some(msg) = self.transport.try_recv()? {
            return self.handle_reply(msg, entry).await;
        }

        // `entry` is still in flight, so it counts toward the window.
        let window_full = self.bottom_q.len() + 1 >= self.config.window();
        if window_full || self.request_q.is_empty() {
            if self.flushing {
                let msg = self.transport.recv(self.config.read_timeout).await?;
                return self.handle_reply(msg, entry).await;
            }
            self.bottom_q.push_front(BottomEntry::Bottom(entry));
            self.flush();
            return Ok(());
        }

        self.bottom_q.push_front(BottomEntry::Bottom(entry));
        self.send_next().await
    }

    fn flush(&mut self) {
        trace!(in_flight = self.in_flight, "flush queue");
        self.bottom_q.push_back(BottomEntry::FlushEnded);
        self.flushing = true;
        self.stats.flushes += 1;
    }

    async fn send_next(&mut self) -> Result<()> {
        if let Some(req) = self.request_q.pop_front() {
            self.send_request(req).await?;
        }
        Ok(())
    }

    async fn send_request(&mut self, req: RequestEntry<N>) -> Result<()> {
        let msg = if req.node.is_leaf() || req.node.size() < self.config.mbar {
            self.stats.full_requests += 1;
            ReconMsg::ReconRqstFull {
                prefix: req.key.clone(),
                elements: req.node.elements().into_iter().collect(),
            }
        } else {
            self.stats.poly_requests += 1;
            ReconMsg::ReconRqstPoly {
                prefix: req.key.clone(),
                size: req.node.size(),
                samples: req.node.svalues(),
            }
        };
        trace!(%msg, "send request");
        self.transport.send(msg).await?;

        self.bottom_q.push_back(BottomEntry::Bottom(req));
        self.in_flight += 1;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight);
        Ok(())
    }

    async fn handle_reply(&mut self, msg: ReconMsg, req: RequestEntry<N>) -> Result<()> {
        trace!(%msg, key = %req.key, "handle reply");
        self.in_flight -= 1;
        self.stats.replies += 1;

        match msg {
            ReconMsg::SyncFail => {
                if req.node.is_leaf() {
                    return Err(ReconError::SyncFailAtLeaf(req.key));
                }
                for child in req.node.children() {
                    let key = child.key();
                    trace!(%key, "push child");
                    self.request_q.push_back(RequestEntry { node: child, key });
                }
            }
            ReconMsg::Elements { zset } => {
                self.recovered.add_all(&zset);
            }
            ReconMsg::FullElements { zset } => {
                let local: ZSet = req.node.elements().into_iter().collect();
                let local_diff = ZSet::diff(&local, &zset);
                let remote_diff = ZSet::diff(&zset, &local);
                self.transport
                    .send(ReconMsg::Elements { zset: local_diff })
                    .await?;
                self.recovered.add_all(&remote_diff);
            }
            other => return Err(ReconError::UnexpectedMessage(other.tag())),
        }
        Ok(())
    }
}

/// Run a session over the whole tree, starting at its root.
pub async fn serve<P, T>(tree: &P, transport: &mut T, config: &ReconConfig) -> Result<SessionOutcome>
where
    P: PrefixTree,
    T: Transport + ?Sized,
{
    let root = tree.root()?;
    ReconSession::new(config.clone(), transport)
        .run(root, Bitstring::default())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MsgTag;
    use crate::transport::memory::MemoryTransport;
    use conflux_core::FieldElement;
    use conflux_tree::{MemPrefixTree, TreeConfig};
    use num_bigint::BigInt;
    use tokio::task::JoinHandle;

    const P: i64 = 65537;
    const WAIT: Duration = Duration::from_secs(5);

    fn zp(n: i64) -> FieldElement {
        FieldElement::new(P, n)
    }

    fn zset(values: &[i64]) -> ZSet {
        values.iter().map(|&n| zp(n)).collect()
    }

    fn tree(values: impl IntoIterator<Item = i64>) -> MemPrefixTree {
        let config = TreeConfig {
            bit_quantum: 2,
            split_threshold: 4,
            join_threshold: 2,
            num_samples: 3,
            modulus: BigInt::from(P),
        };
        let elements: Vec<_> = values.into_iter().map(zp).collect();
        MemPrefixTree::with_elements(config, &elements).unwrap()
    }

    fn recon_config(mbar: usize, window: usize) -> ReconConfig {
        ReconConfig {
            mbar,
            max_outstanding_recon_requests: window,
            read_timeout: WAIT,
        }
    }

    /// Spawn a remote that answers each message with `reply` and returns
    /// everything it received, stopping at `Done` or a closed connection.
    fn spawn_remote<F>(mut remote: MemoryTransport, mut reply: F) -> JoinHandle<Vec<ReconMsg>>
    where
        F: FnMut(&ReconMsg) -> Option<ReconMsg> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(msg) = remote.recv(WAIT).await {
                if let Some(answer) = reply(&msg) {
                    if remote.send(answer).await.is_err() {
                        break;
                    }
                }
                let done = msg == ReconMsg::Done;
                seen.push(msg);
                if done {
                    break;
                }
            }
            seen
        })
    }

    #[tokio::test]
    async fn test_empty_sets() {
        let (mut local, remote) = MemoryTransport::pair();
        let remote = spawn_remote(remote, |msg| match msg {
            ReconMsg::ReconRqstFull { .. } => Some(ReconMsg::Elements { zset: ZSet::new() }),
            _ => None,
        });

        let outcome = serve(&tree([]), &mut local, &recon_config(5, 100))
            .await
            .unwrap();
        assert!(outcome.recovered.is_empty());

        let seen = remote.await.unwrap();
        let tags: Vec<_> = seen.iter().map(ReconMsg::tag).collect();
        assert_eq!(tags, vec![MsgTag::ReconRqstFull, MsgTag::Done]);
    }

    #[tokio::test]
    async fn test_leaf_full_request() {
        let (mut local, remote) = MemoryTransport::pair();
        let theirs = zset(&[3, 4]);
        let remote = spawn_remote(remote, move |msg| match msg {
            ReconMsg::ReconRqstFull { elements, .. } => Some(ReconMsg::Elements {
                zset: ZSet::diff(&theirs, elements),
            }),
            _ => None,
        });

        let outcome = serve(&tree([1, 2, 3]), &mut local, &recon_config(5, 100))
            .await
            .unwrap();
        assert_eq!(outcome.recovered, zset(&[4]));
        assert_eq!(outcome.stats.full_requests, 1);

        let seen = remote.await.unwrap();
        match &seen[0] {
            ReconMsg::ReconRqstFull { prefix, elements } => {
                assert!(prefix.is_empty());
                assert_eq!(elements, &zset(&[1, 2, 3]));
            }
            other => panic!("unexpected first message: {other}"),
        }
    }

    #[tokio::test]
    async fn test_full_elements_reply() {
        let (mut local, remote) = MemoryTransport::pair();
        let ours: Vec<i64> = (1..=10).collect();
        let remote = spawn_remote(remote, |msg| match msg {
            ReconMsg::ReconRqstPoly { .. } => Some(ReconMsg::FullElements {
                zset: zset(&[2, 500]),
            }),
            _ => None,
        });

        let outcome = serve(&tree(ours), &mut local, &recon_config(5, 100))
            .await
            .unwrap();
        assert_eq!(outcome.recovered, zset(&[500]));

        let seen = remote.await.unwrap();
        assert_eq!(seen[0].tag(), MsgTag::ReconRqstPoly);
        let expected: Vec<i64> = (1..=10).filter(|&n| n != 2).collect();
        assert_eq!(
            seen[1],
            ReconMsg::Elements {
                zset: zset(&expected)
            }
        );
        assert_eq!(seen[2], ReconMsg::Done);
    }

    #[tokio::test]
    async fn test_sync_fail_pushes_children() {
        let (mut local, remote) = MemoryTransport::pair();
        let ours = tree((1..=40).map(|n| n * 1543));
        let child_keys: Vec<Bitstring> = ours
            .root()
            .unwrap()
            .children()
            .iter()
            .map(PrefixNode::key)
            .collect();
        assert_eq!(child_keys.len(), 4);

        let mut first = true;
        let remote = spawn_remote(remote, move |msg| match msg {
            ReconMsg::ReconRqstPoly { .. } | ReconMsg::ReconRqstFull { .. } if first => {
                first = false;
                Some(ReconMsg::SyncFail)
            }
            ReconMsg::ReconRqstPoly { .. } | ReconMsg::ReconRqstFull { .. } => {
                Some(ReconMsg::Elements { zset: ZSet::new() })
            }
            _ => None,
        });

        let outcome = serve(&ours, &mut local, &recon_config(5, 100)).await.unwrap();
        assert!(outcome.recovered.is_empty());
        assert_eq!(outcome.stats.replies, 5);

        let seen = remote.await.unwrap();
        let prefixes: Vec<Bitstring> = seen[1..5]
            .iter()
            .map(|msg| match msg {
                ReconMsg::ReconRqstPoly { prefix, .. } | ReconMsg::ReconRqstFull { prefix, .. } => {
                    prefix.clone()
                }
                other => panic!("unexpected message: {other}"),
            })
            .collect();
        assert_eq!(prefixes, child_keys);
        assert_eq!(seen[5], ReconMsg::Done);
    }

    #[tokio::test]
    async fn test_sync_fail_at_leaf() {
        let (mut local, remote) = MemoryTransport::pair();
        let _remote = spawn_remote(remote, |_| Some(ReconMsg::SyncFail));

        let result = serve(&tree([1, 2]), &mut local, &recon_config(5, 100)).await;
        match result {
            Err(ReconError::SyncFailAtLeaf(key)) => assert!(key.is_empty()),
            other => panic!("expected SyncFailAtLeaf, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unexpected_reply() {
        let (mut local, remote) = MemoryTransport::pair();
        let remote = spawn_remote(remote, |msg| match msg {
            ReconMsg::ReconRqstFull { .. } => Some(ReconMsg::Done),
            _ => None,
        });

        let result = serve(&tree([1]), &mut local, &recon_config(5, 100)).await;
        assert!(matches!(
            result,
            Err(ReconError::UnexpectedMessage(MsgTag::Done))
        ));

        // Nothing follows the failed exchange.
        drop(local);
        let seen = remote.await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_window_bounds_in_flight() {
        const WINDOW: usize = 3;
        let (mut local, mut remote) = MemoryTransport::pair();
        let ours = tree((1..=300).map(|n| n * 211));

        let remote = tokio::spawn(async move {
            let mut peak = 0;
            loop {
                let mut batch = vec![remote.recv(WAIT).await.unwrap()];
                while let Some(msg) = remote.try_recv().unwrap() {
                    batch.push(msg);
                }
                let requests = batch
                    .iter()
                    .filter(|m| matches!(m.tag(), MsgTag::ReconRqstPoly | MsgTag::ReconRqstFull))
                    .count();
                peak = usize::max(peak, requests);

                let mut done = false;
                for msg in batch {
                    let answer = match msg {
                        ReconMsg::ReconRqstPoly { .. } => ReconMsg::SyncFail,
                        ReconMsg::ReconRqstFull { .. } => ReconMsg::Elements { zset: ZSet::new() },
                        ReconMsg::Done => {
                            done = true;
                            continue;
                        }
                        _ => continue,
                    };
                    remote.send(answer).await.unwrap();
                }
                if done {
                    return peak;
                }
            }
        });

        let outcome = serve(&ours, &mut local, &recon_config(2, WINDOW))
            .await
            .unwrap();
        let remote_peak = remote.await.unwrap();

        assert!(outcome.stats.peak_in_flight <= WINDOW);
        assert!(remote_peak <= WINDOW);
        assert!(outcome.stats.poly_requests > 1);
        assert!(outcome.stats.flushes > 0);
        assert_eq!(
            outcome.stats.replies,
            outcome.stats.full_requests + outcome.stats.poly_requests
        );
    }
}
