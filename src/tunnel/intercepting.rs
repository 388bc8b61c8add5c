//! The user-facing tunnel wrapper that binds both interception filters.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{GuacError, Result};
use crate::tunnel::intercept::{
    ByteSink, ByteSource, CompletionSignal, InputInterceptingFilter, OutputInterceptingFilter,
};
use crate::tunnel::{FilteredReader, InstructionReader, Tunnel, TunnelWriter};

/// A tunnel whose reader is decorated with the input- and
/// output-intercepting filters.
///
/// `intercept_output` redirects a download substream into a caller-supplied
/// sink; `intercept_input` feeds an upload substream from a caller-supplied
/// source. Both block until the intercept terminates.
pub struct InterceptingTunnel {
    base: Arc<dyn Tunnel>,
    output_filter: Arc<OutputInterceptingFilter>,
    input_filter: Arc<InputInterceptingFilter>,
}

impl InterceptingTunnel {
    pub fn new(base: Arc<dyn Tunnel>) -> Self {
        Self {
            output_filter: Arc::new(OutputInterceptingFilter::new(base.clone())),
            input_filter: Arc::new(InputInterceptingFilter::new(base.clone())),
            base,
        }
    }

    /// Redirect output stream `index` (e.g. a file download) into `sink`,
    /// returning once the stream ends, fails, or is cancelled.
    pub async fn intercept_output(&self, index: u64, sink: ByteSink) -> Result<()> {
        debug!(
            "intercepting output stream {index} of tunnel {}",
            self.base.connection_id()
        );
        let signal = self.output_filter.intercept(index, sink).await;
        let outcome = await_signal(signal).await;
        debug!(
            "finished intercepting output stream {index} of tunnel {}",
            self.base.connection_id()
        );
        outcome
    }

    /// Inject bytes read from `source` as input stream `index` (e.g. a file
    /// upload), returning once the stream ends, fails, or is cancelled.
    pub async fn intercept_input(&self, index: u64, source: ByteSource) -> Result<()> {
        debug!(
            "intercepting input stream {index} of tunnel {}",
            self.base.connection_id()
        );
        let signal = self.input_filter.intercept(index, source).await;
        let outcome = await_signal(signal).await;
        debug!(
            "finished intercepting input stream {index} of tunnel {}",
            self.base.connection_id()
        );
        outcome
    }
}

async fn await_signal(signal: CompletionSignal) -> Result<()> {
    match signal.await {
        Ok(outcome) => outcome,
        // The sender only disappears without a verdict if the filter was
        // torn down; report that as a cancellation.
        Err(_) => Err(GuacError::Cancelled),
    }
}

#[async_trait]
impl Tunnel for InterceptingTunnel {
    /// The base reader decorated by the input filter (inner) then the
    /// output filter (outer). The two filters inspect disjoint opcodes, so
    /// the order affects only performance.
    async fn acquire_reader(&self) -> Box<dyn InstructionReader> {
        let reader = self.base.acquire_reader().await;
        let reader = FilteredReader::new(reader, self.input_filter.clone());
        let reader = FilteredReader::new(Box::new(reader), self.output_filter.clone());
        Box::new(reader)
    }

    async fn acquire_writer(&self) -> TunnelWriter {
        self.base.acquire_writer().await
    }

    fn uuid(&self) -> Uuid {
        self.base.uuid()
    }

    fn connection_id(&self) -> String {
        self.base.connection_id()
    }

    /// Cancels every pending intercept on both filters before closing the
    /// base tunnel.
    async fn close(&self) -> Result<()> {
        self.input_filter.close_all().await;
        self.output_filter.close_all().await;
        self.base.close().await
    }
}
