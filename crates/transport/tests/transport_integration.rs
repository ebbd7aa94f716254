use std::time::Duration;

use dep2p_identity::Identity;
use dep2p_transport::{Transport, TransportConfig, TransportError};
use dep2p_types::Multiaddr;

fn local_config() -> TransportConfig {
    let mut config = TransportConfig::default();
    config.migration.enable_auto_migration = false;
    config
}

fn any_addr() -> Multiaddr {
    "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap()
}

#[tokio::test]
async fn dial_accept_round_trip_exchanges_bytes() {
    let server_identity = std::sync::Arc::new(Identity::generate_ed25519());
    let server = Transport::new(server_identity, local_config()).expect("server transport constructs");
    let listener = server.listen(&any_addr()).expect("listener binds over shared endpoint");
    let server_addr = listener.local_multiaddr().expect("listener reports local addr");
    let server_peer_id = server.local_peer_id();

    let client_identity = std::sync::Arc::new(Identity::generate_ed25519());
    let client = Transport::new(client_identity, local_config()).expect("client transport constructs");

    let server_task = tokio::spawn(async move {
        let conn = listener.accept().await.expect("accepts inbound connection");
        let mut stream = conn.accept_stream().await.expect("accepts inbound stream");
        let mut buf = [0u8; 5];
        let n = stream.read(&mut buf).await.expect("reads payload").unwrap();
        assert_eq!(&buf[..n], b"hello");
        stream.write(b"world").await.expect("writes reply");
        stream.close_write().ok();
    });

    let conn = client
        .dial(&server_addr, Some(server_peer_id))
        .await
        .expect("dials server");
    assert_eq!(conn.remote_peer_id(), server_peer_id);
    assert_eq!(conn.local_peer_id(), client.local_peer_id());

    let mut stream = conn.open_stream().await.expect("opens outbound stream");
    stream.write(b"hello").await.expect("writes payload");

    let mut buf = [0u8; 5];
    let n = stream.read(&mut buf).await.expect("reads reply").unwrap();
    assert_eq!(&buf[..n], b"world");
    assert_eq!(stream.stat().bytes_written, 5);

    server_task.await.expect("server task completes");
    client.close();
    server.close();
}

#[tokio::test]
async fn dial_rejects_unexpected_peer_identity() {
    let server_identity = std::sync::Arc::new(Identity::generate_ed25519());
    let server = Transport::new(server_identity, local_config()).expect("server transport constructs");
    let listener = server.listen(&any_addr()).expect("listener binds");
    let server_addr = listener.local_multiaddr().expect("listener reports local addr");

    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let client_identity = std::sync::Arc::new(Identity::generate_ed25519());
    let client = Transport::new(client_identity, local_config()).expect("client transport constructs");

    let wrong_peer = Identity::generate_ed25519().peer_id();
    let result = client.dial(&server_addr, Some(wrong_peer)).await;
    assert!(matches!(result, Err(TransportError::PeerIdMismatch { .. })));

    client.close();
    server.close();
}

#[tokio::test]
async fn listener_and_dialer_share_one_endpoint_address() {
    let identity = std::sync::Arc::new(Identity::generate_ed25519());
    let transport = Transport::new(identity, local_config()).expect("transport constructs");

    let listener = transport.listen(&any_addr()).expect("listener binds");
    let listener_addr = listener.local_multiaddr().expect("listener reports local addr");
    let transport_addr = transport.local_multiaddr().expect("transport reports local addr");

    assert_eq!(listener_addr, transport_addr);
    transport.close();
}

#[tokio::test]
async fn rebind_keeps_previously_issued_listener_accepting() {
    let server_identity = std::sync::Arc::new(Identity::generate_ed25519());
    let server = Transport::new(server_identity, local_config()).expect("server transport constructs");
    let listener = server.listen(&any_addr()).expect("listener binds");
    let server_peer_id = server.local_peer_id();

    let accept_task = tokio::spawn(async move { listener.accept().await });

    // Give the spawned accept() a moment to start blocking on the
    // pre-rebind endpoint before we pull it out from under it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.rebind("127.0.0.1:0".parse().unwrap()).expect("rebinds to a fresh socket");
    let new_addr = server.local_multiaddr().expect("transport reports new local addr");

    let client_identity = std::sync::Arc::new(Identity::generate_ed25519());
    let client = Transport::new(client_identity, local_config()).expect("client transport constructs");
    let conn = client
        .dial(&new_addr, Some(server_peer_id))
        .await
        .expect("dials server on the rebound address");
    assert_eq!(conn.remote_peer_id(), server_peer_id);

    let accepted = accept_task
        .await
        .expect("accept task completes")
        .expect("previously issued listener keeps accepting after rebind");
    assert_eq!(accepted.remote_peer_id(), client.local_peer_id());

    client.close();
    server.close();
}

#[tokio::test]
async fn dial_unreachable_peer_times_out_or_fails() {
    let identity = std::sync::Arc::new(Identity::generate_ed25519());
    let mut config = local_config();
    config.dial_timeout = Duration::from_millis(200);
    let transport = Transport::new(identity, config).expect("transport constructs");

    let unreachable: Multiaddr = "/ip4/127.0.0.1/udp/1/quic-v1".parse().unwrap();
    let result = transport.dial(&unreachable, None).await;
    assert!(result.is_err());
    transport.close();
}
