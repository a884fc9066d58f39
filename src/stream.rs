//! Batch compaction: emit documents as they finish.
//!
//! ## Why stream?
//!
//! A folder of scans can take minutes. Yielding each result as soon as its
//! document is done lets callers write outputs incrementally and drive a
//! progress bar instead of holding every compacted file in memory at once.
//!
//! Each document is compacted on Tokio's blocking pool; at most
//! [`CompactConfig::concurrency`] run at a time. Results arrive in
//! completion order tagged with the input index.

use std::pin::Pin;

use futures::stream::{self, StreamExt};
use tokio_stream::Stream;
use tracing::info;

use crate::compact::compact_async;
use crate::config::CompactConfig;
use crate::error::CompactError;
use crate::output::PipelineResult;

/// One finished document: its index in the input list and its outcome.
pub type CompactItem = (usize, Result<PipelineResult, CompactError>);

/// A boxed stream of finished documents.
pub type CompactStream = Pin<Box<dyn Stream<Item = CompactItem> + Send>>;

/// Compact every input concurrently, streaming results as they complete.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfslim::{compact_stream, CompactConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let inputs = vec![std::fs::read("a.pdf")?, std::fs::read("b.pdf")?];
/// let mut results = compact_stream(inputs, &CompactConfig::default());
/// while let Some((index, result)) = results.next().await {
///     match result {
///         Ok(r) => println!("#{index}: {} → {} bytes", r.original_size, r.best.size()),
///         Err(e) => eprintln!("#{index}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn compact_stream(inputs: Vec<Vec<u8>>, config: &CompactConfig) -> CompactStream {
    let concurrency = config.concurrency.max(1);
    info!(
        "Starting batch compaction: {} document(s), concurrency {}",
        inputs.len(),
        concurrency
    );
    let config = config.clone();
    let s = stream::iter(inputs.into_iter().enumerate().map(move |(index, bytes)| {
        let cfg = config.clone();
        async move { (index, compact_async(bytes, cfg).await) }
    }))
    .buffer_unordered(concurrency);
    Box::pin(s)
}

/// Compact every input and return the results in input order.
pub async fn compact_many(
    inputs: Vec<Vec<u8>>,
    config: &CompactConfig,
) -> Vec<Result<PipelineResult, CompactError>> {
    let mut items: Vec<CompactItem> = compact_stream(inputs, config).collect().await;
    items.sort_by_key(|(index, _)| *index);
    items.into_iter().map(|(_, result)| result).collect()
}
