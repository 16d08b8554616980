//! Reconciliation protocol message types.
//!
//! Replies carry no correlation identifiers: each reply answers the oldest
//! request still awaiting one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use conflux_core::{Bitstring, FieldElement, ZSet};

/// Keys of the handshake config map.
pub mod config_keys {
    pub const VERSION: &str = "version";
    pub const HTTP_PORT: &str = "http port";
    pub const BIT_QUANTUM: &str = "bitquantum";
    pub const MBAR: &str = "mbar";
    pub const FILTERS: &str = "filters";
}

/// Reconciliation protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconMsg {
    /// Handshake: the sender's capabilities and settings.
    Config { contents: BTreeMap<String, String> },

    /// Request carrying every element under `prefix`.
    ReconRqstFull { prefix: Bitstring, elements: ZSet },

    /// Request carrying a digest of the elements under `prefix`.
    ReconRqstPoly {
        prefix: Bitstring,
        size: usize,
        samples: Vec<FieldElement>,
    },

    /// Elements the receiver is missing.
    Elements { zset: ZSet },

    /// The sender's full contents for the requested prefix.
    FullElements { zset: ZSet },

    /// The sender cannot resolve the request at this granularity.
    SyncFail,

    /// No more requests follow.
    Done,
}

impl ReconMsg {
    /// The variant of this message.
    pub fn tag(&self) -> MsgTag {
        match self {
            ReconMsg::Config { .. } => MsgTag::Config,
            ReconMsg::ReconRqstFull { .. } => MsgTag::ReconRqstFull,
            ReconMsg::ReconRqstPoly { .. } => MsgTag::ReconRqstPoly,
            ReconMsg::Elements { .. } => MsgTag::Elements,
            ReconMsg::FullElements { .. } => MsgTag::FullElements,
            ReconMsg::SyncFail => MsgTag::SyncFail,
            ReconMsg::Done => MsgTag::Done,
        }
    }
}

impl fmt::Display for ReconMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconMsg::Config { contents } => write!(f, "Config({} entries)", contents.len()),
            ReconMsg::ReconRqstFull { prefix, elements } => {
                write!(f, "ReconRqstFull(prefix={prefix}, {} elements)", elements.len())
            }
            ReconMsg::ReconRqstPoly { prefix, size, samples } => write!(
                f,
                "ReconRqstPoly(prefix={prefix}, size={size}, {} samples)",
                samples.len()
            ),
            ReconMsg::Elements { zset } => write!(f, "Elements({})", zset.len()),
            ReconMsg::FullElements { zset } => write!(f, "FullElements({})", zset.len()),
            ReconMsg::SyncFail => f.write_str("SyncFail"),
            ReconMsg::Done => f.write_str("Done"),
        }
    }
}

/// Discriminant of [`ReconMsg`], for logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgTag {
    Config,
    ReconRqstFull,
    ReconRqstPoly,
    Elements,
    FullElements,
    SyncFail,
    Done,
}

impl fmt::Display for MsgTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
