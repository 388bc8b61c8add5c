//! Interception of outbound (server to client) streams, e.g. file
//! downloads.
//!
//! While a stream index is intercepted, its `blob` frames are absorbed:
//! the payload is decoded and written to the caller's sink, and an `ack`
//! is synthesized on behalf of the client so guacd keeps sending. A
//! pending `sync` flips the filter into pass-one-empty-blob mode so the
//! real client still acks occasionally and lag measurement stays honest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::AsyncWriteExt;
use tokio::sync::{oneshot, Mutex};

use crate::error::{GuacError, Result};
use crate::protocol::{Instruction, Status};
use crate::tunnel::intercept::{ByteSink, CompletionSignal, InterceptedOutputStream};
use crate::tunnel::{InstructionFilter, Tunnel};

pub struct OutputInterceptingFilter {
    tunnel: Arc<dyn Tunnel>,
    streams: Mutex<HashMap<String, InterceptedOutputStream>>,
    /// Whether this filter should respond to received blobs with "ack"
    /// messages on behalf of the client. If false, the next blob is
    /// forwarded to the client emptied of payload, forcing the client to
    /// respond on its own. Instance state: concurrent tunnels must not
    /// reset each other's ack policy.
    acknowledge_blobs: AtomicBool,
}

impl OutputInterceptingFilter {
    pub fn new(tunnel: Arc<dyn Tunnel>) -> Self {
        Self {
            tunnel,
            streams: Mutex::new(HashMap::new()),
            acknowledge_blobs: AtomicBool::new(true),
        }
    }

    /// Register an intercept for `index` and immediately solicit the first
    /// blob from guacd. Re-registering a busy index cancels the prior
    /// intercept first.
    pub async fn intercept(&self, index: u64, sink: ByteSink) -> CompletionSignal {
        let index = index.to_string();
        let (done, signal) = oneshot::channel();
        {
            let mut streams = self.streams.lock().await;
            if let Some(mut prior) = streams.insert(
                index.clone(),
                InterceptedOutputStream::new(index.clone(), sink, done),
            ) {
                prior.complete(Err(GuacError::Cancelled));
            }
        }

        debug!("intercepting output stream {index}");
        if let Err(err) = self.send_ack(&index).await {
            error!("unable to send initial ack for output stream {index}: {err}");
            self.close_stream(&index, Err(err)).await;
        }
        signal
    }

    /// Cancel every pending intercept. Each completion signal receives
    /// `Cancelled` exactly once.
    pub async fn close_all(&self) {
        let mut streams = self.streams.lock().await;
        for (_, mut stream) in streams.drain() {
            debug!("cancelling intercepted output stream {}", stream.index);
            stream.complete(Err(GuacError::Cancelled));
        }
    }

    async fn send_instruction(&self, instruction: Instruction) -> Result<()> {
        let mut writer = self.tunnel.acquire_writer().await;
        writer.write_instruction(&instruction).await
    }

    async fn send_ack(&self, index: &str) -> Result<()> {
        self.send_instruction(Instruction::ack(index, "OK", Status::Success))
            .await
    }

    async fn close_stream(&self, index: &str, outcome: Result<()>) {
        let mut streams = self.streams.lock().await;
        if let Some(mut stream) = streams.remove(index) {
            stream.complete(outcome);
        }
    }

    async fn handle_blob(&self, instruction: Instruction) -> Result<Option<Instruction>> {
        if instruction.args.len() < 2 {
            return Ok(Some(instruction));
        }
        let index = instruction.args[0].clone();

        let mut streams = self.streams.lock().await;
        let Some(stream) = streams.get_mut(&index) else {
            return Ok(Some(instruction));
        };

        let payload = STANDARD.decode(instruction.args[1].as_bytes()).map_err(|err| {
            GuacError::Malformed(format!("invalid base64 in blob for stream {index}: {err}"))
        })?;

        if stream.sink.write_all(&payload).await.is_err() {
            // The receiver went away (e.g. the download was cancelled in
            // the browser). Stop tracking the stream without failing the
            // tunnel.
            if let Some(mut gone) = streams.remove(&index) {
                gone.complete(Ok(()));
            }
            info!("failed to write to intercepted output stream {index}: receiver has gone away");
            return Ok(None);
        }
        drop(streams);

        // A sync is pending: forward this blob emptied of payload so the
        // client replies with its own ack, then resume auto-acking.
        if !self.acknowledge_blobs.swap(true, Ordering::SeqCst) {
            return Ok(Some(Instruction::blob(&index, "")));
        }

        if let Err(err) = self.send_ack(&index).await {
            error!("unable to send ack for output stream {index}: {err}");
        }

        // The blob was handled purely internally.
        Ok(None)
    }

    async fn handle_end(&self, instruction: &Instruction) {
        if let Some(index) = instruction.first_arg() {
            self.close_stream(index, Ok(())).await;
        }
    }

    fn handle_sync(&self) {
        self.acknowledge_blobs.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl InstructionFilter for OutputInterceptingFilter {
    async fn filter(&self, instruction: Instruction) -> Result<Option<Instruction>> {
        match instruction.opcode.as_str() {
            "blob" => self.handle_blob(instruction).await,
            "end" => {
                self.handle_end(&instruction).await;
                Ok(Some(instruction))
            }
            "sync" => {
                self.handle_sync();
                Ok(Some(instruction))
            }
            _ => Ok(Some(instruction)),
        }
    }
}
