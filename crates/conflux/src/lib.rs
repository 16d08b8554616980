//! # Conflux
//!
//! A peer that keeps a set of field elements in sync with remote peers using
//! MTZ set reconciliation.
//!
//! ## Overview
//!
//! A [`Peer`] owns a prefix tree of elements. While running it listens for
//! incoming reconciliation sessions, and it can open sessions to other peers
//! with [`Peer::reconcile_with`]. Whenever a session finishes having found
//! elements the remote holds and we lack, a [`Recover`] event is emitted;
//! inserting those elements is up to the application.
//!
//! All tree access goes through a single command actor, so inserts, removes
//! and whole sessions never interleave.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conflux::{Peer, PeerConfig};
//! use conflux::core::FieldElement;
//!
//! async fn example() -> conflux::Result<()> {
//!     let config = PeerConfig::default();
//!     let modulus = config.tree.modulus.clone();
//!     let mut peer = Peer::in_memory(config)?;
//!     peer.start().await?;
//!
//!     peer.insert(FieldElement::new(modulus, 42)).await?;
//!     let recovered = peer.reconcile_with("192.0.2.10:11370").await?;
//!     println!("remote had {} elements we lacked", recovered.len());
//!
//!     peer.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `conflux::core` - Field elements, bitstrings and element sets
//! - `conflux::tree` - Prefix tree abstraction and the in-memory tree
//! - `conflux::recon` - Reconciliation protocol and transports

pub mod config;
pub mod error;
pub mod gossip;
pub mod peer;

// Re-export component crates
pub use conflux_core as core;
pub use conflux_recon as recon;
pub use conflux_tree as tree;

pub use config::PeerConfig;
pub use error::{PeerError, Result};
pub use gossip::{Gossip, IdleGossip};
pub use peer::{Peer, PeerHandle, Recover};
