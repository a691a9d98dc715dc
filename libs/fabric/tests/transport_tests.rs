use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use tether_fabric::channel::Channel;
use tether_fabric::codec::{BincodeCodec, JsonCodec};
use tether_fabric::dial::dial;
use tether_fabric::error::Error;
use tether_fabric::transport::{
    TcpTransport, TcpTransportListener, Transport, TransportListener, UnixTransport,
    UnixTransportListener,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestMessage {
    id: u32,
    data: String,
}

/// Helper to get a listener on a free port
async fn tcp_listener() -> (TcpTransportListener, std::net::SocketAddr) {
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn tcp_send_receive_single_message() {
    let (listener, addr) = tcp_listener().await;

    tokio::spawn(async move {
        let mut transport = listener.accept().await.unwrap();
        let received = transport.receive().await.unwrap();
        transport.send(&received).await.unwrap(); // Echo back
    });

    let mut client = TcpTransport::connect(addr).await.unwrap();
    client.send(b"hello world").await.unwrap();
    let response = client.receive().await.unwrap();

    assert_eq!(response, b"hello world");
}

#[tokio::test]
async fn tcp_multiple_messages_preserve_boundaries() {
    let (listener, addr) = tcp_listener().await;

    tokio::spawn(async move {
        let mut transport = listener.accept().await.unwrap();
        for _ in 0..3 {
            let msg = transport.receive().await.unwrap();
            transport.send(&msg).await.unwrap();
        }
    });

    let mut client = TcpTransport::connect(addr).await.unwrap();
    for msg in [b"first".to_vec(), b"second".to_vec(), b"third".to_vec()] {
        client.send(&msg).await.unwrap();
        let response = client.receive().await.unwrap();
        assert_eq!(response, msg);
    }
}

#[tokio::test]
async fn tcp_rejects_oversized_frame() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Peer claims a frame far over the 64 MiB limit, then stalls.
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_u32(512 * 1024 * 1024).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut client = TcpTransport::connect(addr).await.unwrap();
    match client.receive().await {
        Err(Error::FrameTooLarge(len)) => assert_eq!(len, 512 * 1024 * 1024),
        other => panic!("expected FrameTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn connection_closed_error() {
    let (listener, addr) = tcp_listener().await;

    tokio::spawn(async move {
        let mut transport = listener.accept().await.unwrap();
        transport.close().await.unwrap();
    });

    let mut client = TcpTransport::connect(addr).await.unwrap();
    match client.receive().await {
        Err(Error::ConnectionClosed) => {}
        other => panic!("expected ConnectionClosed, got {other:?}"),
    }
}

#[tokio::test]
async fn channel_json_roundtrip() {
    let (listener, addr) = tcp_listener().await;

    let expected = TestMessage {
        id: 42,
        data: "test data".to_string(),
    };
    let expected_clone = expected.clone();

    tokio::spawn(async move {
        let transport = listener.accept().await.unwrap();
        let mut channel = Channel::new(transport, JsonCodec);
        let msg: TestMessage = channel.receive().await.unwrap();
        channel.send(&msg).await.unwrap();
    });

    let transport = TcpTransport::connect(addr).await.unwrap();
    let mut channel = Channel::new(transport, JsonCodec);
    channel.send(&expected).await.unwrap();
    let response: TestMessage = channel.receive().await.unwrap();

    assert_eq!(response, expected_clone);
}

#[tokio::test]
async fn channel_bincode_roundtrip() {
    let (listener, addr) = tcp_listener().await;

    tokio::spawn(async move {
        let transport = listener.accept().await.unwrap();
        let mut channel = Channel::new(transport, BincodeCodec);
        let msg: TestMessage = channel.receive().await.unwrap();
        channel.send(&msg).await.unwrap();
    });

    let transport = TcpTransport::connect(addr).await.unwrap();
    let mut channel = Channel::new(transport, BincodeCodec);
    let expected = TestMessage {
        id: 7,
        data: "compact".to_string(),
    };
    channel.send(&expected).await.unwrap();
    let response: TestMessage = channel.receive().await.unwrap();

    assert_eq!(response, expected);
}

#[tokio::test]
async fn split_halves_work_from_separate_tasks() {
    let (listener, addr) = tcp_listener().await;

    tokio::spawn(async move {
        let mut transport = listener.accept().await.unwrap();
        for _ in 0..3 {
            let msg = transport.receive().await.unwrap();
            transport.send(&msg).await.unwrap();
        }
    });

    let transport = TcpTransport::connect(addr).await.unwrap();
    let (mut sink, mut source) = Box::new(transport).into_split();

    let writer = tokio::spawn(async move {
        for i in 0..3u8 {
            sink.send(&[i]).await.unwrap();
        }
        sink
    });
    let reader = tokio::spawn(async move {
        for i in 0..3u8 {
            assert_eq!(source.receive().await.unwrap(), vec![i]);
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();
}

#[tokio::test]
async fn unix_send_receive_single_message() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("fabric.sock");

    let listener = UnixTransportListener::bind(&socket_path).await.unwrap();

    tokio::spawn(async move {
        let mut transport = listener.accept().await.unwrap();
        let received = transport.receive().await.unwrap();
        transport.send(&received).await.unwrap();
    });

    let mut client = UnixTransport::connect(&socket_path).await.unwrap();
    client.send(b"hello unix").await.unwrap();
    let response = client.receive().await.unwrap();

    assert_eq!(response, b"hello unix");
}

#[tokio::test]
async fn unix_listener_cleans_up_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("cleanup.sock");

    let mut listener = UnixTransportListener::bind(&socket_path).await.unwrap();
    assert!(socket_path.exists());

    listener.close().await.unwrap();
    assert!(!socket_path.exists());
}

#[tokio::test]
async fn dial_tcp_url() {
    let (listener, addr) = tcp_listener().await;

    tokio::spawn(async move {
        let mut transport = listener.accept().await.unwrap();
        let msg = transport.receive().await.unwrap();
        transport.send(&msg).await.unwrap();
    });

    let (mut sink, mut source) = dial(&format!("tcp://{addr}")).await.unwrap();
    sink.send(b"dialed").await.unwrap();
    assert_eq!(source.receive().await.unwrap(), b"dialed");
}

#[tokio::test]
async fn dial_unix_url() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("dial.sock");

    let listener = UnixTransportListener::bind(&socket_path).await.unwrap();
    tokio::spawn(async move {
        let mut transport = listener.accept().await.unwrap();
        let msg = transport.receive().await.unwrap();
        transport.send(&msg).await.unwrap();
    });

    let url = format!("unix://{}", socket_path.display());
    let (mut sink, mut source) = dial(&url).await.unwrap();
    sink.send(b"dialed").await.unwrap();
    assert_eq!(source.receive().await.unwrap(), b"dialed");
}

#[tokio::test]
async fn dial_rejects_unknown_scheme_and_garbage() {
    match dial("ftp://127.0.0.1:21").await {
        Err(Error::InvalidUrl(msg)) => assert!(msg.contains("unsupported scheme")),
        other => panic!("expected InvalidUrl, got {other:?}"),
    }
    assert!(matches!(
        dial("not a url").await,
        Err(Error::InvalidUrl(_))
    ));
    assert!(matches!(dial("tcp://127.0.0.1").await, Err(Error::InvalidUrl(_))));
}
