//! Chain tip resolution across the node pool.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{AppError, BlockInfo, Invocation, UpstreamError};

use super::multiplexer::Multiplexer;

/// Picks a conservative chain tip from every node's `getblockchaininfo`
#[derive(Clone)]
pub struct BlockInfoResolver {
    multiplexer: Arc<Multiplexer>,
}

impl BlockInfoResolver {
    #[must_use]
    pub fn new(multiplexer: Arc<Multiplexer>) -> Self {
        Self { multiplexer }
    }

    /// Lowest tip reported by any reachable node.
    #[instrument(skip(self))]
    pub async fn resolve_tip(&self) -> Result<BlockInfo, AppError> {
        let responses = self
            .multiplexer
            .invoke(&Invocation::blockchain_info(), false, true)
            .await;

        let tip = select_tip(responses.iter()).ok_or(UpstreamError::NoResults)?;
        debug!(height = tip.height, hash = %tip.best_block_hash, "Resolved chain tip");
        Ok(tip)
    }
}

/// Lowest height among parseable entries; the first entry wins a tie.
pub fn select_tip<'a, I>(entries: I) -> Option<BlockInfo>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tip: Option<BlockInfo> = None;
    for entry in entries {
        match serde_json::from_str::<BlockInfo>(entry) {
            Ok(info) => {
                if tip.as_ref().is_none_or(|current| info.height < current.height) {
                    tip = Some(info);
                }
            }
            Err(e) => debug!(error = %e, "Discarding unparseable blockchain info"),
        }
    }
    tip
}
