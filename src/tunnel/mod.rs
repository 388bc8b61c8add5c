//! Tunnel core: framed guacd sockets, reader filtering, and in-band stream
//! interception.
//!
//! A [`Tunnel`] owns one connection to guacd and hands out serialized reader
//! and writer capabilities. [`InterceptingTunnel`] layers the two stream
//! interception filters on top, letting callers siphon downloads out of and
//! inject uploads into the relayed session.

mod filter;
mod guacd;
pub mod intercept;
mod intercepting;
mod socket;

pub use filter::{FilteredReader, InstructionFilter};
pub use guacd::GuacdTunnel;
pub use intercepting::InterceptingTunnel;
pub use socket::{GuacdSocket, TunnelReader, TunnelWriter};

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::Result;

/// A source of complete instruction frames.
#[async_trait]
pub trait InstructionReader: Send {
    /// Read one or more complete instruction frames, concatenated in a
    /// single buffer. Partial frames are never returned.
    async fn read_some(&mut self) -> Result<Bytes>;
}

/// One relayed guacd connection.
///
/// Reader and writer access are independently serialized: the capability
/// returned by an acquire call holds the corresponding lock until dropped.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Acquire the tunnel's reader. Blocks while another reader is live.
    async fn acquire_reader(&self) -> Box<dyn InstructionReader>;

    /// Acquire exclusive write access. Every instruction written to guacd,
    /// including frames synthesized by filters, goes through this path.
    async fn acquire_writer(&self) -> TunnelWriter;

    /// Locally generated identifier, used by session stores to key tunnels.
    fn uuid(&self) -> Uuid;

    /// The connection identifier assigned by guacd during the handshake.
    fn connection_id(&self) -> String;

    /// Close the tunnel; subsequent reads and writes fail.
    async fn close(&self) -> Result<()>;
}
