//! Integration tests for the framed guacd socket and the client handshake.

mod common;

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use guac_gateway::{
    ConnectionConfig, GuacError, GuacdSocket, GuacdTunnel, InstructionReader, Status, Tunnel,
};

use common::{read_frames, tcp_pair, TEST_TIMEOUT};

#[tokio::test]
async fn read_some_returns_only_complete_frames() {
    let (client, mut server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, TEST_TIMEOUT);

    let writer = tokio::spawn(async move {
        server
            .write_all(b"6.select,2.hi,5.hello,4.asd")
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        server
            .write_all(b"f;6.teston,2.hi,5.hello,4.asdf;")
            .await
            .unwrap();
        server
    });

    let mut reader = socket.acquire_reader().await;
    let frames = reader.read_some().await.unwrap();
    assert_eq!(
        &frames[..],
        b"6.select,2.hi,5.hello,4.asdf;6.teston,2.hi,5.hello,4.asdf;"
    );

    writer.await.unwrap();
}

#[tokio::test]
async fn read_one_buffers_following_frames() {
    let (client, mut server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, TEST_TIMEOUT);

    server
        .write_all(b"6.select,3.vnc;5.ready,5.$test;")
        .await
        .unwrap();

    let mut reader = socket.acquire_reader().await;
    let first = reader.read_one().await.unwrap();
    assert_eq!(first.opcode, "select");
    assert_eq!(first.args, vec!["vnc"]);

    // The second instruction is already buffered; no further socket data
    // is needed.
    let second = reader.read_one().await.unwrap();
    assert_eq!(second.opcode, "ready");
    assert_eq!(second.args, vec!["$test"]);
}

#[tokio::test]
async fn read_times_out_on_a_silent_peer() {
    let (client, _server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, Duration::from_millis(200));

    let mut reader = socket.acquire_reader().await;
    match reader.read_some().await {
        Err(GuacError::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::TimedOut),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn closed_socket_rejects_reads_and_writes() {
    let (client, _server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, TEST_TIMEOUT);

    socket.close().await.unwrap();
    assert!(socket.is_closed());

    let mut writer = socket.acquire_writer().await;
    assert!(writer.write(b"4.sync,2.42;").await.is_err());

    let mut reader = socket.acquire_reader().await;
    assert!(reader.read_some().await.is_err());
}

#[tokio::test]
async fn handshake_negotiates_a_connection_id() {
    let (client, mut server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, TEST_TIMEOUT);

    let guacd = tokio::spawn(async move {
        let select = read_frames(&mut server, 1).await;
        assert_eq!(select, "6.select,3.vnc;");

        server
            .write_all(b"4.args,13.VERSION_1_5_0,8.hostname,4.port;")
            .await
            .unwrap();

        let capabilities = read_frames(&mut server, 5).await;
        assert!(capabilities.starts_with("4.size,4.1024,3.768,2.96;"));
        assert!(capabilities.contains("5.audio,9.audio/L16;"));
        // Parameter values follow the advertised argument order; names the
        // map lacks are sent empty.
        assert!(capabilities.ends_with("7.connect,0.,7.desktop,4.5901;"));

        server
            .write_all(b"5.ready,37.$260d01da-779b-4ee9-afc1-c16bae885cc7;")
            .await
            .unwrap();
    });

    let mut config = ConnectionConfig {
        protocol: "vnc".to_string(),
        ..ConnectionConfig::default()
    };
    config
        .parameters
        .insert("hostname".to_string(), "desktop".to_string());
    config.parameters.insert("port".to_string(), "5901".to_string());
    config.audio_mimetypes.push("audio/L16".to_string());

    let connection_id = socket.handshake(&config).await.unwrap();
    assert_eq!(connection_id, "$260d01da-779b-4ee9-afc1-c16bae885cc7");

    guacd.await.unwrap();
}

#[tokio::test]
async fn handshake_selects_connection_id_when_joining() {
    let (client, mut server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, TEST_TIMEOUT);

    let guacd = tokio::spawn(async move {
        let select = read_frames(&mut server, 1).await;
        assert_eq!(select, "6.select,5.$join;");
        server.write_all(b"4.args,13.VERSION_1_5_0;").await.unwrap();
        read_frames(&mut server, 5).await;
        server.write_all(b"5.ready,5.$join;").await.unwrap();
    });

    let config = ConnectionConfig {
        protocol: "vnc".to_string(),
        connection_id: Some("$join".to_string()),
        ..ConnectionConfig::default()
    };

    assert_eq!(socket.handshake(&config).await.unwrap(), "$join");
    guacd.await.unwrap();
}

#[tokio::test]
async fn handshake_surfaces_guacd_errors() {
    let (client, mut server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, TEST_TIMEOUT);

    let guacd = tokio::spawn(async move {
        read_frames(&mut server, 1).await;
        server
            .write_all(b"5.error,12.No such host,3.519;")
            .await
            .unwrap();
    });

    let config = ConnectionConfig {
        protocol: "vnc".to_string(),
        ..ConnectionConfig::default()
    };

    match socket.handshake(&config).await {
        Err(GuacError::Server { status, message }) => {
            assert_eq!(status, Status::UpstreamNotFound);
            assert_eq!(message, "No such host");
        }
        other => panic!("expected a server error, got {other:?}"),
    }
    guacd.await.unwrap();
}

#[tokio::test]
async fn handshake_rejects_unexpected_opcodes() {
    let (client, mut server) = tcp_pair().await;
    let socket = GuacdSocket::new(client, TEST_TIMEOUT);

    let guacd = tokio::spawn(async move {
        read_frames(&mut server, 1).await;
        server.write_all(b"5.ready,5.$test;").await.unwrap();
    });

    let config = ConnectionConfig {
        protocol: "vnc".to_string(),
        ..ConnectionConfig::default()
    };

    assert!(matches!(
        socket.handshake(&config).await,
        Err(GuacError::Handshake(_))
    ));
    guacd.await.unwrap();
}

#[tokio::test]
async fn tunnel_uuids_are_unique() {
    let (client_a, _server_a) = tcp_pair().await;
    let (client_b, _server_b) = tcp_pair().await;

    let tunnel_a = GuacdTunnel::new(GuacdSocket::new(client_a, TEST_TIMEOUT), "$a");
    let tunnel_b = GuacdTunnel::new(GuacdSocket::new(client_b, TEST_TIMEOUT), "$b");

    assert_ne!(tunnel_a.uuid(), tunnel_b.uuid());
    assert_eq!(tunnel_a.connection_id(), "$a");
}
