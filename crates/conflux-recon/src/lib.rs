//! # Conflux Recon
//!
//! Pipelined set reconciliation between two prefix trees.
//!
//! ## Overview
//!
//! The accepting side drives the session: it walks its tree from the root,
//! sending a digest of each node (or the node's full contents when small).
//! The connecting side answers each request with the elements the server is
//! missing, with its own contents for that prefix, or with `SyncFail` to ask
//! for a finer split. Both sides end up knowing exactly which elements the
//! other holds and they lack.
//!
//! ## Message Flow
//!
//! ```text
//! Initiator                            Server
//!   |-------- Config ------------------>|
//!   |<------- Config -------------------|
//!   |<------- ReconRqstPoly(root) ------|
//!   |-------- SyncFail ---------------->|
//!   |<------- ReconRqstFull(00) --------|
//!   |<------- ReconRqstPoly(01) --------|
//!   |-------- Elements ---------------->|
//!   |-------- FullElements ------------>|
//!   |<------- Elements -----------------|
//!   |<------- Done ---------------------|
//! ```
//!
//! Replies are matched to requests in FIFO order; see [`session`] for the
//! flow-control rules.

pub mod error;
pub mod handshake;
pub mod initiator;
pub mod messages;
pub mod session;
pub mod transport;
pub mod wire;

pub use error::{ReconError, Result};
pub use handshake::{check_compatible, ConfigMap};
pub use initiator::respond;
pub use messages::{config_keys, MsgTag, ReconMsg};
pub use session::{
    serve, BottomEntry, ReconConfig, ReconSession, RequestEntry, SessionOutcome, SessionStats,
};
pub use transport::memory::MemoryTransport;
pub use transport::tcp::TcpTransport;
pub use transport::Transport;
pub use wire::MAX_MESSAGE_SIZE;
