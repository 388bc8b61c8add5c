//! The socket-backed tunnel implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::tunnel::{GuacdSocket, InstructionReader, Tunnel, TunnelWriter};

/// A tunnel bound directly to one guacd connection.
pub struct GuacdTunnel {
    socket: Arc<GuacdSocket>,
    uuid: Uuid,
    connection_id: String,
}

impl GuacdTunnel {
    /// Dial guacd, perform the client handshake, and return the ready
    /// tunnel.
    pub async fn connect(
        addr: &str,
        config: &ConnectionConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let socket = GuacdSocket::connect(addr, timeout).await?;
        let connection_id = socket.handshake(config).await?;
        Ok(Self {
            socket: Arc::new(socket),
            uuid: Uuid::new_v4(),
            connection_id,
        })
    }

    /// Wrap an already-handshook socket. Useful when the handshake was
    /// driven elsewhere, or in tests that script guacd's side of the wire.
    pub fn new(socket: GuacdSocket, connection_id: impl Into<String>) -> Self {
        Self {
            socket: Arc::new(socket),
            uuid: Uuid::new_v4(),
            connection_id: connection_id.into(),
        }
    }
}

#[async_trait]
impl Tunnel for GuacdTunnel {
    async fn acquire_reader(&self) -> Box<dyn InstructionReader> {
        Box::new(self.socket.acquire_reader().await)
    }

    async fn acquire_writer(&self) -> TunnelWriter {
        self.socket.acquire_writer().await
    }

    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn connection_id(&self) -> String {
        self.connection_id.clone()
    }

    async fn close(&self) -> Result<()> {
        debug!("closing tunnel {} ({})", self.uuid, self.connection_id);
        self.socket.close().await
    }
}
