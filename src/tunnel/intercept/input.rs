//! Interception of inbound (client to server) streams, e.g. file uploads.
//!
//! Bytes from the caller's source are chunked, base64-encoded, and sent as
//! `blob` frames for the intercepted index. Exactly one blob is in flight
//! at a time: the next chunk is read only once guacd acknowledges the
//! previous one, which preserves the protocol's flow control.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::AsyncReadExt;
use tokio::sync::{oneshot, Mutex};

use crate::error::{GuacError, Result};
use crate::protocol::{Instruction, Status};
use crate::tunnel::intercept::{ByteSource, CompletionSignal, InterceptedInputStream};
use crate::tunnel::{InstructionFilter, Tunnel};

/// Largest chunk read from the caller's source per blob.
const BLOB_CHUNK: usize = 4096;

pub struct InputInterceptingFilter {
    tunnel: Arc<dyn Tunnel>,
    streams: Mutex<HashMap<String, InterceptedInputStream>>,
}

enum ReadOutcome {
    /// A base64-encoded chunk ready to be sent.
    Data(String),
    Eof,
    Failed(io::Error),
}

impl InputInterceptingFilter {
    pub fn new(tunnel: Arc<dyn Tunnel>) -> Self {
        Self {
            tunnel,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Register an intercept for `index` and immediately send the first
    /// blob. Re-registering a busy index cancels the prior intercept first.
    pub async fn intercept(&self, index: u64, source: ByteSource) -> CompletionSignal {
        let index = index.to_string();
        let (done, signal) = oneshot::channel();
        {
            let mut streams = self.streams.lock().await;
            if let Some(mut prior) = streams.insert(
                index.clone(),
                InterceptedInputStream::new(index.clone(), source, done),
            ) {
                prior.complete(Err(GuacError::Cancelled));
            }
        }

        debug!("intercepting input stream {index}");
        self.send_next_blob(&index).await;
        signal
    }

    /// Cancel every pending intercept. Each completion signal receives
    /// `Cancelled` exactly once.
    pub async fn close_all(&self) {
        let mut streams = self.streams.lock().await;
        for (_, mut stream) in streams.drain() {
            debug!("cancelling intercepted input stream {}", stream.index);
            stream.complete(Err(GuacError::Cancelled));
        }
    }

    async fn send_instruction(&self, instruction: Instruction) -> Result<()> {
        let mut writer = self.tunnel.acquire_writer().await;
        writer.write_instruction(&instruction).await
    }

    async fn send_end(&self, index: &str) {
        if let Err(err) = self.send_instruction(Instruction::end(index)).await {
            error!("failed to send end for input stream {index}: {err}");
        }
    }

    async fn close_stream(&self, index: &str, outcome: Result<()>) {
        let mut streams = self.streams.lock().await;
        if let Some(mut stream) = streams.remove(index) {
            stream.complete(outcome);
        }
    }

    /// Read the next chunk from the caller's source and put it on the
    /// wire, or finish the stream on EOF or a read failure.
    async fn send_next_blob(&self, index: &str) {
        let outcome = {
            let mut streams = self.streams.lock().await;
            let Some(stream) = streams.get_mut(index) else {
                return;
            };
            let mut chunk = [0u8; BLOB_CHUNK];
            match stream.source.read(&mut chunk).await {
                Ok(0) => ReadOutcome::Eof,
                Ok(read) => ReadOutcome::Data(STANDARD.encode(&chunk[..read])),
                Err(err) => ReadOutcome::Failed(err),
            }
        };

        match outcome {
            ReadOutcome::Data(encoded) => {
                if let Err(err) = self
                    .send_instruction(Instruction::blob(index, &encoded))
                    .await
                {
                    error!("failed to send blob for input stream {index}: {err}");
                    self.send_end(index).await;
                    self.close_stream(index, Err(err)).await;
                }
            }
            ReadOutcome::Eof => {
                self.send_end(index).await;
                self.close_stream(index, Ok(())).await;
            }
            ReadOutcome::Failed(err) => {
                error!("could not read from intercepted input stream {index}: {err}");
                self.send_end(index).await;
                self.close_stream(index, Err(GuacError::Io(err))).await;
            }
        }
    }

    async fn handle_ack(&self, instruction: &Instruction) {
        if instruction.args.len() < 3 {
            return;
        }
        let index = instruction.args[0].as_str();
        {
            let streams = self.streams.lock().await;
            if !streams.contains_key(index) {
                warn!("ack for unknown intercepted input stream {index}");
                return;
            }
        }

        let status = instruction.args[2].as_str();
        if status != "0" {
            let code = match status.parse::<u32>() {
                Ok(code) => code,
                Err(_) => {
                    error!("failed to parse ack status code '{status}' for stream {index}");
                    Status::ServerError.code()
                }
            };
            self.close_stream(
                index,
                Err(GuacError::Server {
                    status: Status::from_code(code),
                    message: instruction.args[1].clone(),
                }),
            )
            .await;
            return;
        }

        self.send_next_blob(index).await;
    }
}

#[async_trait]
impl InstructionFilter for InputInterceptingFilter {
    /// Observes `ack` frames to pace the blob loop; every instruction is
    /// passed through unchanged.
    async fn filter(&self, instruction: Instruction) -> Result<Option<Instruction>> {
        if instruction.is("ack") {
            self.handle_ack(&instruction).await;
        }
        Ok(Some(instruction))
    }
}
