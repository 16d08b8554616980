//! Gossip seam: the loop that decides when to reconcile with whom.
//!
//! Partner selection is left to the application. The peer runs one
//! [`Gossip`] task alongside its listener and waits for it to return when
//! stopping.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::peer::PeerHandle;

/// A gossip strategy run by a started peer.
#[async_trait]
pub trait Gossip: Send + Sync + 'static {
    /// Run until `enabled` turns false (or its sender is dropped).
    async fn run(&self, handle: PeerHandle, enabled: watch::Receiver<bool>);
}

/// Gossip that never initiates; it only waits to be stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleGossip;

#[async_trait]
impl Gossip for IdleGossip {
    async fn run(&self, handle: PeerHandle, mut enabled: watch::Receiver<bool>) {
        drop(handle);
        wait_disabled(&mut enabled).await;
    }
}

/// Resolve once the peer is disabled.
pub async fn wait_disabled(enabled: &mut watch::Receiver<bool>) {
    let _ = enabled.wait_for(|on| !*on).await;
}
