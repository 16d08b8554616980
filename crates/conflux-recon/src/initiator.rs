//! Client side of a reconciliation session.
//!
//! The initiator answers the server's requests in the order they arrive,
//! consulting its own tree for each requested prefix, until the server
//! sends `Done`.

use tracing::{debug, trace};

use conflux_core::{characteristic_samples, Bitstring, FieldElement, ZSet};
use conflux_tree::{in_prefix, PrefixNode, PrefixTree};

use crate::error::{ReconError, Result};
use crate::messages::ReconMsg;
use crate::session::ReconConfig;
use crate::transport::Transport;

/// Answer the remote's requests against `tree` until it sends `Done`.
///
/// Returns the elements the remote has and the local tree lacks.
pub async fn respond<P, T>(tree: &P, transport: &mut T, config: &ReconConfig) -> Result<ZSet>
where
    P: PrefixTree,
    T: Transport + ?Sized,
{
    debug!(remote = %transport.remote_addr(), "answering reconciliation");
    let mut recovered = ZSet::new();

    loop {
        let msg = transport.recv(config.read_timeout).await?;
        trace!(%msg, "initiator received");
        match msg {
            ReconMsg::ReconRqstPoly {
                prefix,
                size,
                samples,
            } => {
                let reply = answer_poly(tree, config, &prefix, size, &samples)?;
                trace!(%reply, %prefix, "answer poly");
                transport.send(reply).await?;
            }
            ReconMsg::ReconRqstFull { prefix, elements } => {
                let local = local_elements(tree, &prefix)?;
                let local_diff = ZSet::diff(&local, &elements);
                recovered.add_all(&ZSet::diff(&elements, &local));
                transport
                    .send(ReconMsg::Elements { zset: local_diff })
                    .await?;
            }
            ReconMsg::Elements { zset } => recovered.add_all(&zset),
            ReconMsg::Done => break,
            other => return Err(ReconError::UnexpectedMessage(other.tag())),
        }
    }

    debug!(
        remote = %transport.remote_addr(),
        recovered = recovered.len(),
        "reconciliation answered"
    );
    Ok(recovered)
}

fn answer_poly<P: PrefixTree>(
    tree: &P,
    config: &ReconConfig,
    prefix: &Bitstring,
    size: usize,
    samples: &[FieldElement],
) -> Result<ReconMsg> {
    let node = tree.node(prefix)?;

    if node.key() == *prefix {
        if node.size() == size && node.svalues() == samples {
            return Ok(ReconMsg::Elements { zset: ZSet::new() });
        }
        if node.is_leaf() || node.size() < config.mbar {
            return Ok(ReconMsg::FullElements {
                zset: node.elements().into_iter().collect(),
            });
        }
        return Ok(ReconMsg::SyncFail);
    }

    // The local tree stops above `prefix`; the covering node is a leaf.
    let local: Vec<FieldElement> = node
        .elements()
        .into_iter()
        .filter(|z| in_prefix(z, prefix))
        .collect();
    if local.len() == size && characteristic_samples(&local, tree.points()) == samples {
        return Ok(ReconMsg::Elements { zset: ZSet::new() });
    }
    Ok(ReconMsg::FullElements {
        zset: local.into_iter().collect(),
    })
}

fn local_elements<P: PrefixTree>(tree: &P, prefix: &Bitstring) -> Result<ZSet> {
    let node = tree.node(prefix)?;
    Ok(node
        .elements()
        .into_iter()
        .filter(|z| in_prefix(z, prefix))
        .collect())
}
