//! End-to-end behavior over loopback sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use polyws::{CloseCode, Frame, Message, Opcode, ProtocolConfig};
use polyws_server::{
    ConnectionInfo, ConnectionManager, MessageHandler, Server, ServerConfig, ShutdownSignal,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const MASK: [u8; 4] = [0x0a, 0x1b, 0x2c, 0x3d];

const HYBI_REQUEST: &[u8] = b"GET /echo HTTP/1.1\r\n\
    Host: localhost\r\n\
    Upgrade: websocket\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Version: 13\r\n\
    \r\n";

const HIXIE_REQUEST: &[u8] = b"GET /demo HTTP/1.1\r\n\
    Host: example.com\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\
    Upgrade: WebSocket\r\n\
    Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
    Origin: http://example.com\r\n\
    \r\n\
    ^n:ds[4U";

const POLICY: &str = r#"<cross-domain-policy><allow-access-from domain="*" to-ports="*"/></cross-domain-policy>"#;

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
    manager: Arc<ConnectionManager>,
    handle: JoinHandle<polyws_server::ServerResult<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        Self::start_with(Server::new(config)).await
    }

    async fn start_with(server: Server) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let manager = server.manager();
        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(server.serve(listener, None, shutdown.clone()));
        Self {
            addr,
            shutdown,
            manager,
            handle,
        }
    }

    async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.trigger();
        timeout(WAIT, self.handle)
            .await
            .expect("server should stop")
            .expect("server task should not panic")
            .unwrap();
    }
}

fn quick_shutdown() -> polyws_server::ServerConfigBuilder {
    ServerConfig::builder().shutdown_timeout(Duration::from_secs(1))
}

/// Read until `buf` holds the end of an HTTP head; returns the head.
async fn read_head(stream: &mut TcpStream, buf: &mut BytesMut) -> String {
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = buf.split_to(pos + 4);
            return String::from_utf8(head.to_vec()).unwrap();
        }
        let n = timeout(WAIT, stream.read_buf(buf)).await.unwrap().unwrap();
        assert!(n > 0, "peer closed before the handshake response");
    }
}

async fn read_exact_into(stream: &mut TcpStream, buf: &mut BytesMut, len: usize) -> Vec<u8> {
    while buf.len() < len {
        let n = timeout(WAIT, stream.read_buf(buf)).await.unwrap().unwrap();
        assert!(n > 0, "peer closed early");
    }
    buf.split_to(len).to_vec()
}

async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Frame {
    loop {
        if let Some(frame) = Frame::decode(buf, usize::MAX).unwrap() {
            return frame;
        }
        let n = timeout(WAIT, stream.read_buf(buf)).await.unwrap().unwrap();
        assert!(n > 0, "peer closed before a full frame");
    }
}

async fn expect_eof(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .expect("peer should close")
        .unwrap();
    assert!(rest.is_empty(), "unexpected trailing bytes: {rest:?}");
}

async fn hybi_client(server: &TestServer) -> (TcpStream, BytesMut) {
    let mut stream = server.connect().await;
    stream.write_all(HYBI_REQUEST).await.unwrap();
    let mut buf = BytesMut::new();
    let head = read_head(&mut stream, &mut buf).await;
    assert!(head.starts_with("HTTP/1.1 101"));
    assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    (stream, buf)
}

#[tokio::test]
async fn hybi_echo_and_close() {
    let server = TestServer::start(quick_shutdown().build()).await;
    let (mut stream, mut buf) = hybi_client(&server).await;

    stream
        .write_all(&Frame::text("hello").encode_masked(MASK))
        .await
        .unwrap();
    let echoed = read_frame(&mut stream, &mut buf).await;
    assert_eq!(echoed.opcode(), Opcode::Text);
    assert_eq!(&echoed.payload()[..], b"hello");

    stream
        .write_all(&Frame::close(CloseCode::Normal, "bye").encode_masked(MASK))
        .await
        .unwrap();
    let reply = read_frame(&mut stream, &mut buf).await;
    assert_eq!(reply.opcode(), Opcode::Close);
    assert_eq!(reply.close_code(), Some(1000));
    expect_eof(&mut stream).await;

    server.stop().await;
}

#[tokio::test]
async fn hybi_fragmented_message_and_ping() {
    let server = TestServer::start(quick_shutdown().build()).await;
    let (mut stream, mut buf) = hybi_client(&server).await;

    let mut wire = Vec::new();
    wire.extend_from_slice(&Frame::new(Opcode::Text, false, "frag").encode_masked(MASK));
    wire.extend_from_slice(&Frame::ping("p").encode_masked(MASK));
    wire.extend_from_slice(&Frame::continuation(true, "mented").encode_masked(MASK));
    stream.write_all(&wire).await.unwrap();

    let pong = read_frame(&mut stream, &mut buf).await;
    assert_eq!(pong.opcode(), Opcode::Pong);
    assert_eq!(&pong.payload()[..], b"p");

    let echoed = read_frame(&mut stream, &mut buf).await;
    assert_eq!(echoed.opcode(), Opcode::Text);
    assert!(!echoed.fin());
    assert_eq!(&echoed.payload()[..], b"frag");
    let tail = read_frame(&mut stream, &mut buf).await;
    assert_eq!(tail.opcode(), Opcode::Continuation);
    assert!(tail.fin());
    assert_eq!(&tail.payload()[..], b"mented");

    server.stop().await;
}

#[tokio::test]
async fn hybi_frame_in_handshake_packet_is_processed() {
    let server = TestServer::start(quick_shutdown().build()).await;
    let mut stream = server.connect().await;

    let mut wire = HYBI_REQUEST.to_vec();
    wire.extend_from_slice(&Frame::binary(vec![1u8, 2, 3]).encode_masked(MASK));
    stream.write_all(&wire).await.unwrap();

    let mut buf = BytesMut::new();
    read_head(&mut stream, &mut buf).await;
    let echoed = read_frame(&mut stream, &mut buf).await;
    assert_eq!(echoed.opcode(), Opcode::Binary);
    assert_eq!(&echoed.payload()[..], &[1, 2, 3]);

    server.stop().await;
}

#[tokio::test]
async fn hybi_oversized_frame_closes_with_1009() {
    let config = quick_shutdown()
        .protocol(ProtocolConfig::new().max_frame_size(8).max_message_size(8))
        .build();
    let server = TestServer::start(config).await;
    let (mut stream, mut buf) = hybi_client(&server).await;

    stream
        .write_all(&Frame::text("far too long for the limit").encode_masked(MASK))
        .await
        .unwrap();
    let close = read_frame(&mut stream, &mut buf).await;
    assert_eq!(close.opcode(), Opcode::Close);
    assert_eq!(close.close_code(), Some(1009));
    expect_eof(&mut stream).await;

    server.stop().await;
}

#[tokio::test]
async fn hixie_echo_and_closing_handshake() {
    let server = TestServer::start(quick_shutdown().build()).await;
    let mut stream = server.connect().await;
    stream.write_all(HIXIE_REQUEST).await.unwrap();

    let mut buf = BytesMut::new();
    let head = read_head(&mut stream, &mut buf).await;
    assert!(head.starts_with("HTTP/1.1 101 WebSocket Protocol Handshake"));
    assert!(head.contains("Sec-WebSocket-Location: ws://example.com/demo"));
    let digest = read_exact_into(&mut stream, &mut buf, 16).await;
    assert_eq!(digest, b"8jKS'y:G*Co,Wxa-");

    stream.write_all(b"\x00hi there\xff").await.unwrap();
    let echoed = read_exact_into(&mut stream, &mut buf, 10).await;
    assert_eq!(echoed, b"\x00hi there\xff");

    stream.write_all(&[0xff, 0x00]).await.unwrap();
    let close = read_exact_into(&mut stream, &mut buf, 2).await;
    assert_eq!(close, [0xff, 0x00]);
    expect_eof(&mut stream).await;

    server.stop().await;
}

#[tokio::test]
async fn flash_policy_response() {
    let server = TestServer::start(quick_shutdown().build()).await;
    let mut stream = server.connect().await;
    stream.write_all(b"<policy-file-request/>\0").await.unwrap();

    let mut reply = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    let mut expected = POLICY.as_bytes().to_vec();
    expected.push(0);
    assert_eq!(reply, expected);

    server.stop().await;
}

#[tokio::test]
async fn flash_policy_disabled_closes_without_reply() {
    let server = TestServer::start(quick_shutdown().disable_flash_policy().build()).await;
    let mut stream = server.connect().await;
    stream.write_all(b"<policy-file-request/>\0").await.unwrap();
    expect_eof(&mut stream).await;

    server.stop().await;
}

#[tokio::test]
async fn dedicated_policy_listener() {
    let main = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let policy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let policy_addr = policy.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = Server::new(quick_shutdown().flash_policy("<p/>").build());
    let handle = tokio::spawn(server.serve(main, Some(policy), shutdown.clone()));

    let mut stream = TcpStream::connect(policy_addr).await.unwrap();
    stream.write_all(b"<policy-file-request/>").await.unwrap();
    let mut reply = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, b"<p/>\0");

    shutdown.trigger();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn connection_limit_rejects_extra_clients() {
    let server = TestServer::start(quick_shutdown().max_connections(1).build()).await;
    let (_first, _buf) = hybi_client(&server).await;

    let mut second = server.connect().await;
    second.write_all(HYBI_REQUEST).await.unwrap();
    expect_eof(&mut second).await;

    let stats = server.manager.stats();
    assert_eq!(stats.total_rejected, 1);
    assert_eq!(stats.hybi_connections, 1);

    server.stop().await;
}

#[tokio::test]
async fn oversized_handshake_is_dropped() {
    let config = quick_shutdown()
        .protocol(ProtocolConfig::new().max_handshake_size(64))
        .build();
    let server = TestServer::start(config).await;
    let mut stream = server.connect().await;

    stream.write_all(&[b'a'; 256]).await.unwrap();
    let mut rest = Vec::new();
    let result = timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .expect("peer should close");
    // A reset is also acceptable: the server may close with bytes unread.
    assert!(result.is_err() || rest.is_empty());
    assert!(server.manager.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn shutdown_sends_going_away() {
    let server = TestServer::start(quick_shutdown().build()).await;
    let (mut stream, mut buf) = hybi_client(&server).await;

    server.shutdown.trigger();
    let close = read_frame(&mut stream, &mut buf).await;
    assert_eq!(close.opcode(), Opcode::Close);
    assert_eq!(close.close_code(), Some(CloseCode::GoingAway.as_u16()));
    expect_eof(&mut stream).await;

    server.stop().await;
}

struct Upper;

impl MessageHandler for Upper {
    fn on_message(&self, _conn: &ConnectionInfo, message: Message) -> Option<Message> {
        let text = message.to_text().ok()?;
        Some(Message::text(text.to_uppercase()))
    }
}

#[tokio::test]
async fn custom_handler_replies_in_hixie_framing() {
    let server = TestServer::start_with(Server::with_handler(quick_shutdown().build(), Upper)).await;
    let mut stream = server.connect().await;
    stream.write_all(HIXIE_REQUEST).await.unwrap();

    let mut buf = BytesMut::new();
    read_head(&mut stream, &mut buf).await;
    read_exact_into(&mut stream, &mut buf, 16).await;

    stream.write_all(b"\x00shout\xff").await.unwrap();
    assert_eq!(read_exact_into(&mut stream, &mut buf, 7).await, b"\x00SHOUT\xff");

    server.stop().await;
}
