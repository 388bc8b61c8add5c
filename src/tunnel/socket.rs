//! Buffered, timeout-bounded framed socket to guacd.
//!
//! `GuacdSocket` wraps a TCP connection split into owned halves, each behind
//! its own lock so a long-running read never starves writers. Reads
//! accumulate into an internal buffer until it ends on an instruction
//! terminator, so callers only ever see complete frames.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ConnectionConfig;
use crate::error::{GuacError, Result};
use crate::protocol::{Instruction, ParseError, Status};
use crate::tunnel::InstructionReader;

const INST_TERM: u8 = b';';
const INITIAL_BUFFER: usize = 8192;

/// A framed, timeout-bounded byte connection to guacd.
pub struct GuacdSocket {
    reader: Arc<Mutex<FrameReader>>,
    writer: Arc<Mutex<FrameWriter>>,
    closed: Arc<AtomicBool>,
}

impl GuacdSocket {
    /// Dial guacd and wrap the fresh connection.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| timeout_error())??;
        stream.set_nodelay(true)?;
        debug!("connected to guacd at {addr}");
        Ok(Self::new(stream, timeout))
    }

    /// Wrap an already-established connection. The timeout bounds every
    /// subsequent socket read and write.
    pub fn new(stream: TcpStream, timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        let closed = Arc::new(AtomicBool::new(false));
        Self {
            reader: Arc::new(Mutex::new(FrameReader {
                half: read_half,
                buf: BytesMut::with_capacity(INITIAL_BUFFER),
                timeout,
                closed: closed.clone(),
            })),
            writer: Arc::new(Mutex::new(FrameWriter {
                half: write_half,
                timeout,
                closed: closed.clone(),
            })),
            closed,
        }
    }

    /// Take the socket's reader capability. Serialized with respect to
    /// other reader acquisitions; released when the guard is dropped.
    pub async fn acquire_reader(&self) -> TunnelReader {
        TunnelReader {
            guard: self.reader.clone().lock_owned().await,
        }
    }

    /// Take exclusive write access; released when the guard is dropped.
    pub async fn acquire_writer(&self) -> TunnelWriter {
        TunnelWriter {
            guard: self.writer.clone().lock_owned().await,
        }
    }

    /// Close the connection; subsequent reads and writes fail.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.half.shutdown().await;
        Ok(())
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Perform the client-side guacd handshake on a fresh socket.
    ///
    /// Sends `select` (protocol name, or the configured connection id when
    /// joining), answers the advertised `args` with `size`/`audio`/`video`/
    /// `image` and a `connect` carrying parameter values in the requested
    /// order, then records the connection id from `ready`.
    pub async fn handshake(&self, config: &ConnectionConfig) -> Result<String> {
        let mut reader = self.reader.lock().await;
        let mut writer = self.writer.lock().await;

        let select_target = config
            .connection_id
            .as_deref()
            .unwrap_or(config.protocol.as_str());
        debug!("starting guacd handshake (select: {select_target})");
        writer
            .write_instruction(&Instruction::select(select_target))
            .await?;

        let args = expect_opcode(&mut reader, "args").await?;
        debug!("guacd accepts {} connection parameters", args.args.len());

        writer
            .write_instruction(&Instruction::size(
                config.optimal_screen_width,
                config.optimal_screen_height,
                config.optimal_resolution,
            ))
            .await?;
        writer
            .write_instruction(&Instruction::new("audio", config.audio_mimetypes.clone()))
            .await?;
        writer
            .write_instruction(&Instruction::new("video", config.video_mimetypes.clone()))
            .await?;
        writer
            .write_instruction(&Instruction::new("image", config.image_mimetypes.clone()))
            .await?;

        let values = args
            .args
            .iter()
            .map(|name| config.parameters.get(name).cloned().unwrap_or_default())
            .collect();
        writer.write_instruction(&Instruction::connect(values)).await?;

        let ready = expect_opcode(&mut reader, "ready").await?;
        let connection_id = ready
            .first_arg()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                GuacError::Handshake("ready instruction carried no connection id".to_string())
            })?;
        info!("guacd session ready (connection_id: {connection_id})");
        Ok(connection_id)
    }
}

/// Reader capability bound to a [`GuacdSocket`]. Holds the reader lock.
pub struct TunnelReader {
    guard: OwnedMutexGuard<FrameReader>,
}

impl TunnelReader {
    /// Read exactly one instruction, buffering any frames behind it.
    pub async fn read_one(&mut self) -> Result<Instruction> {
        self.guard.read_one().await
    }
}

#[async_trait]
impl InstructionReader for TunnelReader {
    async fn read_some(&mut self) -> Result<Bytes> {
        self.guard.read_some().await
    }
}

/// Writer capability bound to a [`GuacdSocket`]. Holds the writer lock.
pub struct TunnelWriter {
    guard: OwnedMutexGuard<FrameWriter>,
}

impl TunnelWriter {
    /// Write raw bytes to the connection.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.guard.write(data).await
    }

    /// Encode and write a single instruction.
    pub async fn write_instruction(&mut self, instruction: &Instruction) -> Result<()> {
        self.guard.write_instruction(instruction).await
    }
}

struct FrameReader {
    half: OwnedReadHalf,
    buf: BytesMut,
    timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl FrameReader {
    async fn fill(&mut self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error());
        }
        let read = tokio::time::timeout(self.timeout, self.half.read_buf(&mut self.buf))
            .await
            .map_err(|_| timeout_error())??;
        if read == 0 {
            return Err(GuacError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "guacd closed the connection",
            )));
        }
        trace!("read {read} bytes from guacd ({} buffered)", self.buf.len());
        Ok(())
    }

    async fn read_some(&mut self) -> Result<Bytes> {
        loop {
            // Only hand out the buffer once it ends on a terminator, so a
            // partial frame never leaks to callers.
            if self.buf.last() == Some(&INST_TERM) {
                return Ok(self.buf.split().freeze());
            }
            self.fill().await?;
        }
    }

    async fn read_one(&mut self) -> Result<Instruction> {
        loop {
            if let Some((instruction, consumed)) = parse_front(&self.buf)? {
                self.buf.advance(consumed);
                return Ok(instruction);
            }
            self.fill().await?;
        }
    }
}

fn parse_front(buf: &[u8]) -> Result<Option<(Instruction, usize)>> {
    let text = match std::str::from_utf8(buf) {
        Ok(text) => text,
        // A multibyte character may be split across socket reads; parse the
        // valid prefix and wait for the rest.
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&buf[..e.valid_up_to()])
            .map_err(|_| GuacError::Malformed("invalid UTF-8 on the wire".to_string()))?,
        Err(_) => {
            return Err(GuacError::Malformed("invalid UTF-8 on the wire".to_string()));
        }
    };
    match Instruction::parse(text) {
        Ok((instruction, consumed)) => Ok(Some((instruction, consumed))),
        Err(ParseError::Incomplete) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

struct FrameWriter {
    half: OwnedWriteHalf,
    timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl FrameWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error());
        }
        tokio::time::timeout(self.timeout, self.half.write_all(data))
            .await
            .map_err(|_| timeout_error())??;
        Ok(data.len())
    }

    async fn write_instruction(&mut self, instruction: &Instruction) -> Result<()> {
        self.write(&instruction.encode()).await.map(|_| ())
    }
}

async fn expect_opcode(reader: &mut FrameReader, expected: &str) -> Result<Instruction> {
    let instruction = reader.read_one().await?;
    if instruction.is("error") {
        let message = instruction
            .first_arg()
            .unwrap_or("unknown guacd error")
            .to_string();
        let code = instruction
            .arg(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| Status::ServerError.code());
        error!("guacd sent error during handshake (expected: {expected}, message: {message}, code: {code})");
        return Err(GuacError::Server {
            status: Status::from_code(code),
            message,
        });
    }
    if !instruction.is(expected) {
        return Err(GuacError::Handshake(format!(
            "expected '{expected}' from guacd, got '{}'",
            instruction.opcode
        )));
    }
    Ok(instruction)
}

fn timeout_error() -> GuacError {
    GuacError::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        "socket operation timed out",
    ))
}

fn closed_error() -> GuacError {
    GuacError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "socket is closed",
    ))
}
