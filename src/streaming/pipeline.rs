//! Reconstruction pipeline.
//!
//! [`Reconstructor`] is the synchronous driver: push chunks in arrival order
//! and receive a unit whenever a window closes. [`reconstruct`] runs the same
//! driver over an async stream of chunks and adds cancellation.

use super::accumulator::Accumulator;
use super::classifier::WindowClassifier;
use super::types::ReconstructedUnit;
use crate::{RawChunk, ReconstructionConfig, StreamError};

/// Drives classification and merging for exactly one completion.
///
/// Not `Clone`, and consumed by [`finish`](Reconstructor::finish): a new
/// completion needs a new reconstructor. After any error the window state is
/// discarded and every later call returns [`StreamError::Poisoned`].
#[derive(Debug)]
pub struct Reconstructor {
    config: ReconstructionConfig,
    classifier: WindowClassifier,
    window: Accumulator,
    emitted: usize,
    failed: bool,
}

impl Reconstructor {
    /// Create a reconstructor for one completion
    pub fn new(config: ReconstructionConfig) -> Self {
        let window = Accumulator::with_argument_limit(config.max_argument_bytes);
        Self {
            config,
            classifier: WindowClassifier::new(),
            window,
            emitted: 0,
            failed: false,
        }
    }

    /// Whether a tool call window is currently open
    pub fn in_tool_accumulation(&self) -> bool {
        self.classifier.in_tool_accumulation()
    }

    /// Number of units emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Feed the next chunk.
    ///
    /// Returns the finished unit when this chunk closes its window, `None`
    /// while a tool call window stays open.
    pub fn push(&mut self, chunk: RawChunk) -> crate::Result<Option<ReconstructedUnit>> {
        if self.failed {
            return Err(StreamError::Poisoned);
        }
        let result = self.step(chunk);
        if let Err(err) = &result {
            tracing::warn!(error = %err, emitted = self.emitted, "stream reconstruction failed");
            self.failed = true;
            self.window = Accumulator::new();
        }
        result
    }

    fn step(&mut self, chunk: RawChunk) -> crate::Result<Option<ReconstructedUnit>> {
        let was_accumulating = self.classifier.in_tool_accumulation();
        let decision = self.classifier.observe(&chunk);
        if decision.in_tool_accumulation && !was_accumulating {
            tracing::debug!(
                indices = ?chunk.tool_call_deltas.iter().map(|f| f.index).collect::<Vec<_>>(),
                "tool call window opened"
            );
        }

        self.window.merge(chunk, decision.mode)?;
        tracing::trace!(chunks = self.window.len(), "chunk merged");

        if !decision.closes_window {
            return Ok(None);
        }

        let window = std::mem::replace(
            &mut self.window,
            Accumulator::with_argument_limit(self.config.max_argument_bytes),
        );
        let chunks = window.len();
        let unit = window.finish(&self.config.default_tool_type)?;
        if unit.is_tool_call() {
            tracing::debug!(chunks, tool_calls = unit.tool_calls.len(), "tool call window closed");
        }
        self.emitted += 1;
        Ok(Some(unit))
    }

    /// Signal normal end of the upstream.
    ///
    /// Fails with [`StreamError::IncompleteStream`] when a tool call window is
    /// still open, since its arguments can never be completed.
    pub fn finish(self) -> crate::Result<()> {
        if self.failed {
            return Err(StreamError::Poisoned);
        }
        if self.classifier.in_tool_accumulation() {
            let open_indices = self.window.tool_call_indices();
            tracing::warn!(?open_indices, "stream ended inside a tool call window");
            return Err(StreamError::IncompleteStream { open_indices });
        }
        tracing::debug!(units = self.emitted, "stream reconstruction finished");
        Ok(())
    }
}

#[cfg(feature = "streaming")]
pub use self::driver::{collect_units, reconstruct, reconstruct_with_cancel, ReconstructedStream};

#[cfg(feature = "streaming")]
mod driver {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_util::stream::{self, BoxStream, Fuse, FusedStream};
    use futures_util::{Stream, StreamExt};
    use tokio_util::sync::CancellationToken;

    use super::Reconstructor;
    use crate::error::BoxError;
    use crate::streaming::types::ReconstructedUnit;
    use crate::{RawChunk, ReconstructionConfig, StreamError};

    /// Stream of reconstructed units for one completion.
    ///
    /// Ends after normal completion, after the first error, or as soon as it
    /// is cancelled. Dropping it drops the upstream. Polling after the end
    /// keeps returning `None`.
    pub struct ReconstructedStream {
        inner: Fuse<BoxStream<'static, crate::Result<ReconstructedUnit>>>,
        cancel: CancellationToken,
    }

    impl ReconstructedStream {
        /// Token that cancels this stream (and anything sharing it).
        ///
        /// Cancelling through the token takes effect on the next poll or on
        /// drop, whichever comes first.
        pub fn cancel_handle(&self) -> CancellationToken {
            self.cancel.clone()
        }

        /// Stop the stream and release the upstream immediately.
        ///
        /// The upstream is dropped here, without waiting for another poll.
        pub fn cancel(&mut self) {
            self.cancel.cancel();
            if !self.inner.is_terminated() {
                tracing::debug!("stream reconstruction cancelled, releasing upstream");
            }
            self.inner = stream::empty().boxed().fuse();
        }

        /// Whether cancellation was requested
        pub fn is_cancelled(&self) -> bool {
            self.cancel.is_cancelled()
        }
    }

    impl std::fmt::Debug for ReconstructedStream {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ReconstructedStream")
                .field("cancelled", &self.cancel.is_cancelled())
                .finish_non_exhaustive()
        }
    }

    impl Stream for ReconstructedStream {
        type Item = crate::Result<ReconstructedUnit>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.poll_next_unpin(cx)
        }
    }

    impl FusedStream for ReconstructedStream {
        fn is_terminated(&self) -> bool {
            self.inner.is_terminated()
        }
    }

    /// Per-completion state carried between polls
    struct PipelineState<S> {
        upstream: S,
        reconstructor: Reconstructor,
        cancel: CancellationToken,
    }

    /// Reconstruct units from an ordered stream of raw chunks
    pub fn reconstruct<S, E>(upstream: S, config: ReconstructionConfig) -> ReconstructedStream
    where
        S: Stream<Item = Result<RawChunk, E>> + Send + Unpin + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        reconstruct_with_cancel(upstream, config, CancellationToken::new())
    }

    /// Like [`reconstruct`], sharing `cancel` with the caller.
    ///
    /// Pass the transport's token (or a child of it) so that one cancel both
    /// stops unit delivery and releases the connection.
    pub fn reconstruct_with_cancel<S, E>(
        upstream: S,
        config: ReconstructionConfig,
        cancel: CancellationToken,
    ) -> ReconstructedStream
    where
        S: Stream<Item = Result<RawChunk, E>> + Send + Unpin + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let state = PipelineState {
            upstream,
            reconstructor: Reconstructor::new(config),
            cancel: cancel.clone(),
        };

        let inner = stream::unfold(Some(state), |state| async move {
            let Some(mut state) = state else {
                return None;
            };
            loop {
                let next = tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => {
                        tracing::debug!(
                            emitted = state.reconstructor.emitted(),
                            open_window = state.reconstructor.in_tool_accumulation(),
                            "stream reconstruction cancelled"
                        );
                        return None;
                    }
                    next = state.upstream.next() => next,
                };

                match next {
                    Some(Ok(chunk)) => match state.reconstructor.push(chunk) {
                        Ok(Some(unit)) => return Some((Ok(unit), Some(state))),
                        Ok(None) => continue,
                        Err(err) => return Some((Err(err), None)),
                    },
                    Some(Err(err)) => {
                        let err = StreamError::transport(err);
                        tracing::warn!(error = %err, "upstream failed");
                        return Some((Err(err), None));
                    }
                    None => {
                        return match state.reconstructor.finish() {
                            Ok(()) => None,
                            Err(err) => Some((Err(err), None)),
                        };
                    }
                }
            }
        });

        ReconstructedStream {
            inner: inner.boxed().fuse(),
            cancel,
        }
    }

    /// Drain a whole completion into its units.
    ///
    /// Convenience for callers that do not render incrementally.
    pub async fn collect_units<S, E>(
        upstream: S,
        config: ReconstructionConfig,
    ) -> crate::Result<Vec<ReconstructedUnit>>
    where
        S: Stream<Item = Result<RawChunk, E>> + Send + Unpin + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let mut units = Vec::new();
        let mut stream = reconstruct(upstream, config);
        while let Some(unit) = stream.next().await {
            units.push(unit?);
        }
        Ok(units)
    }
}
