//! Config exchange that opens every connection.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::error::{ReconError, Result};
use crate::messages::{config_keys, ReconMsg};
use crate::transport::Transport;

/// Capability map exchanged in the handshake.
pub type ConfigMap = BTreeMap<String, String>;

/// Settings both sides must agree on.
const MUST_MATCH: [&str; 2] = [config_keys::BIT_QUANTUM, config_keys::MBAR];

/// Accepting side: read the remote config, then answer with ours.
pub async fn accept<T>(transport: &mut T, local: &ConfigMap, timeout: Duration) -> Result<ConfigMap>
where
    T: Transport + ?Sized,
{
    let remote = read_config(transport, timeout).await?;
    transport
        .send(ReconMsg::Config {
            contents: local.clone(),
        })
        .await?;
    debug!(remote = %transport.remote_addr(), ?remote, "handshake accepted");
    Ok(remote)
}

/// Connecting side: send our config, then read the remote's.
pub async fn initiate<T>(
    transport: &mut T,
    local: &ConfigMap,
    timeout: Duration,
) -> Result<ConfigMap>
where
    T: Transport + ?Sized,
{
    transport
        .send(ReconMsg::Config {
            contents: local.clone(),
        })
        .await?;
    let remote = read_config(transport, timeout).await?;
    debug!(remote = %transport.remote_addr(), ?remote, "handshake completed");
    Ok(remote)
}

/// Reject a remote whose tree shape differs from ours.
///
/// Keys absent on either side are not checked.
pub fn check_compatible(local: &ConfigMap, remote: &ConfigMap) -> Result<()> {
    for key in MUST_MATCH {
        if let (Some(l), Some(r)) = (local.get(key), remote.get(key)) {
            if l != r {
                return Err(ReconError::ConfigMismatch {
                    key: key.to_string(),
                    local: l.clone(),
                    remote: r.clone(),
                });
            }
        }
    }
    Ok(())
}

async fn read_config<T>(transport: &mut T, timeout: Duration) -> Result<ConfigMap>
where
    T: Transport + ?Sized,
{
    match transport.recv(timeout).await? {
        ReconMsg::Config { contents } => Ok(contents),
        other => Err(ReconError::UnexpectedMessage(other.tag())),
    }
}
