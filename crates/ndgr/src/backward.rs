//! Catch-up pagination over packed segments.

use std::time::Duration;

use prost::Message;
use tracing::debug;

use crate::error::{FetchPhase, NdgrError, Result};
use crate::fetcher::FetchContext;
use crate::proto::{ChunkedMessage, PackedSegment};

/// Collect up to `want` historical messages starting at `uri`.
///
/// Each page is older than the ones before it, so pages are prepended. The
/// result is in arrival order with the oldest surplus dropped.
pub(crate) async fn pull_backwards(
    ctx: &FetchContext,
    uri: &str,
    want: usize,
    interval: Duration,
) -> Result<Vec<ChunkedMessage>> {
    let mut collected: Vec<ChunkedMessage> = Vec::new();
    let mut next = Some(uri.to_string());
    let mut pages = 0usize;

    while let Some(uri) = next.take() {
        if pages > 0 {
            tokio::select! {
                _ = ctx.token().cancelled() => return Err(NdgrError::Disposed),
                _ = tokio::time::sleep(interval) => {}
            }
        }
        ctx.ensure_live()?;

        let body = ctx
            .fetch_all(&uri, "packed segment", FetchPhase::Backward)
            .await?;
        let packed =
            PackedSegment::decode(body).map_err(|e| NdgrError::decode("packed segment", e))?;
        pages += 1;

        let mut batch = packed.messages;
        batch.append(&mut collected);
        collected = batch;

        if collected.len() >= want {
            break;
        }
        next = packed.next.map(|n| n.uri).filter(|u| !u.is_empty());
    }

    if collected.len() > want {
        let surplus = collected.len() - want;
        collected.drain(..surplus);
    }
    debug!(pages, messages = collected.len(), "Backward pagination complete");
    Ok(collected)
}
