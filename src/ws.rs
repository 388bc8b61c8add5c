//! WebSocket transport: owns the client socket and forwards bytes between
//! it and a tunnel. No protocol logic lives here beyond framing text.

use std::io;
use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::config::{ConnectionConfig, GatewayConfig};
use crate::error::{GuacError, Result};
use crate::session::SessionRegistry;
use crate::tunnel::{GuacdTunnel, InterceptingTunnel, Tunnel};

/// Accept WebSocket clients until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    config: Arc<GatewayConfig>,
    registry: Arc<SessionRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("transport shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                let config = config.clone();
                let registry = registry.clone();
                tokio::spawn(async move {
                    debug!("websocket client connected from {peer}");
                    if let Err(err) = handle_connection(socket, config, registry).await {
                        warn!("session from {peer} ended with error: {err}");
                    }
                });
            }
        }
    }
}

/// Upgrade one TCP connection to a WebSocket, dial guacd for it, and pump
/// frames both ways until either side closes.
pub async fn handle_connection(
    socket: TcpStream,
    config: Arc<GatewayConfig>,
    registry: Arc<SessionRegistry>,
) -> Result<()> {
    socket.set_nodelay(true)?;

    let mut query = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(socket, |request: &Request, response: Response| {
        query = request.uri().query().unwrap_or("").to_string();
        Ok(response)
    })
    .await
    .map_err(ws_error)?;

    let mut connection = ConnectionConfig::from_query(&query)?;
    config.apply_presets(&mut connection);

    let tunnel =
        GuacdTunnel::connect(&config.guacd_address, &connection, config.socket_timeout()).await?;
    let tunnel = Arc::new(InterceptingTunnel::new(Arc::new(tunnel)));
    let uuid = tunnel.uuid();

    registry.add(tunnel.clone());
    let result = run_session(ws, tunnel.clone()).await;
    registry.remove(uuid);
    let _ = tunnel.close().await;
    result
}

/// Pump frames between an accepted WebSocket and a tunnel until either
/// side closes.
pub async fn run_session(
    ws: WebSocketStream<TcpStream>,
    tunnel: Arc<InterceptingTunnel>,
) -> Result<()> {
    let (sink, mut stream) = ws.split();

    let pump_tunnel = tunnel.clone();
    let mut to_client = tokio::spawn(pump_to_client(pump_tunnel, sink));

    let result = loop {
        tokio::select! {
            pump = &mut to_client => {
                break match pump {
                    // guacd hanging up is the normal end of a session.
                    Ok(Err(GuacError::Io(err))) if err.kind() == io::ErrorKind::UnexpectedEof => {
                        Ok(())
                    }
                    Ok(outcome) => outcome,
                    Err(_) => Err(GuacError::Cancelled),
                };
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let mut writer = tunnel.acquire_writer().await;
                        writer.write(text.as_bytes()).await?;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let mut writer = tunnel.acquire_writer().await;
                        writer.write(&data).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    // tungstenite answers pings itself.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Err(ws_error(err)),
                }
            }
        }
    };

    to_client.abort();
    result
}

async fn pump_to_client(
    tunnel: Arc<InterceptingTunnel>,
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
) -> Result<()> {
    let mut reader = tunnel.acquire_reader().await;
    loop {
        let frames = reader.read_some().await?;
        let text = String::from_utf8(frames.to_vec())
            .map_err(|_| GuacError::Malformed("invalid UTF-8 on the wire".to_string()))?;
        sink.send(Message::Text(text)).await.map_err(ws_error)?;
    }
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> GuacError {
    GuacError::Io(io::Error::new(io::ErrorKind::BrokenPipe, err.to_string()))
}
