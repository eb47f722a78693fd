//! End-to-end tests of the relay over loopback sockets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use lan_chat::client::PeerSession;
use lan_chat::common::events::{self, ChatEvent, EventReceiver};
use lan_chat::common::frame::{encode, encode_pair};
use lan_chat::server::{Dispatcher, Roster, ServerConfig};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

async fn start_server(config: ServerConfig) -> (SocketAddr, EventReceiver) {
    let (events_tx, events_rx) = events::channel();
    let dispatcher = Dispatcher::bind(&config, events_tx).await.unwrap();
    let addr = dispatcher.local_addr().unwrap();
    tokio::spawn(dispatcher.run());
    (addr, events_rx)
}

async fn start_default_server() -> (SocketAddr, EventReceiver) {
    start_server(ServerConfig::with_address("127.0.0.1:0")).await
}

async fn next_event(rx: &mut EventReceiver) -> ChatEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn assert_quiet(rx: &mut EventReceiver) {
    if let Ok(event) = timeout(QUIET, rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

async fn raw_client(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&encode(name.as_bytes()).unwrap()).await.unwrap();
    stream
}

async fn read_bytes(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("timed out reading")
        .unwrap();
    buf
}

fn joined(identity: &str) -> ChatEvent {
    ChatEvent::Joined {
        identity: identity.to_string(),
    }
}

fn left(identity: &str) -> ChatEvent {
    ChatEvent::Left {
        identity: identity.to_string(),
    }
}

fn message(identity: &str, text: &str) -> ChatEvent {
    ChatEvent::Message {
        identity: identity.to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_message_reaches_other_client_once() {
    let (addr, mut server_rx) = start_default_server().await;

    let (bob_tx, mut bob_rx) = events::channel();
    let _bob = PeerSession::connect(&addr.to_string(), "bob", bob_tx).await.unwrap();
    assert_eq!(next_event(&mut server_rx).await, joined("bob"));

    let (alice_tx, mut alice_rx) = events::channel();
    let mut alice = PeerSession::connect(&addr.to_string(), "alice", alice_tx)
        .await
        .unwrap();
    assert_eq!(next_event(&mut server_rx).await, joined("alice"));
    assert_eq!(
        next_event(&mut bob_rx).await,
        message("SERVER", "alice has entered the room!")
    );

    alice.send("hi").await.unwrap();

    assert_eq!(next_event(&mut server_rx).await, message("alice", "hi"));
    assert_eq!(next_event(&mut bob_rx).await, message("alice", "hi"));
    assert_quiet(&mut bob_rx).await;
    // never echoed back to the sender
    assert_quiet(&mut alice_rx).await;
}

#[tokio::test]
async fn test_relay_is_byte_exact_and_skips_sender() {
    let (addr, mut server_rx) = start_default_server().await;

    let mut c1 = raw_client(addr, "c1").await;
    assert_eq!(next_event(&mut server_rx).await, joined("c1"));
    let mut c2 = raw_client(addr, "c2").await;
    assert_eq!(next_event(&mut server_rx).await, joined("c2"));
    let mut c3 = raw_client(addr, "c3").await;
    assert_eq!(next_event(&mut server_rx).await, joined("c3"));

    let c2_notice = encode_pair(b"SERVER", b"c2 has entered the room!").unwrap();
    let c3_notice = encode_pair(b"SERVER", b"c3 has entered the room!").unwrap();
    assert_eq!(read_bytes(&mut c1, c2_notice.len()).await, c2_notice);
    assert_eq!(read_bytes(&mut c1, c3_notice.len()).await, c3_notice);
    assert_eq!(read_bytes(&mut c2, c3_notice.len()).await, c3_notice);

    // dribble the pair out in small pieces
    let wire = encode_pair(b"c1", "héllo wörld".as_bytes()).unwrap();
    for chunk in wire.chunks(4) {
        c1.write_all(chunk).await.unwrap();
        c1.flush().await.unwrap();
        sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(next_event(&mut server_rx).await, message("c1", "héllo wörld"));
    assert_eq!(read_bytes(&mut c2, wire.len()).await, wire);
    assert_eq!(read_bytes(&mut c3, wire.len()).await, wire);

    let mut buf = [0u8; 1];
    assert!(timeout(QUIET, c1.read(&mut buf)).await.is_err());
}

#[tokio::test]
async fn test_handshake_and_first_message_in_one_write() {
    let (addr, mut server_rx) = start_default_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut wire = encode(b"dave").unwrap();
    wire.extend(encode_pair(b"dave", b"first!").unwrap());
    stream.write_all(&wire).await.unwrap();

    assert_eq!(next_event(&mut server_rx).await, joined("dave"));
    assert_eq!(next_event(&mut server_rx).await, message("dave", "first!"));
}

#[tokio::test]
async fn test_abrupt_disconnect_reports_one_leave() {
    let (addr, mut server_rx) = start_default_server().await;

    let (bob_tx, mut bob_rx) = events::channel();
    let _bob = PeerSession::connect(&addr.to_string(), "bob", bob_tx).await.unwrap();
    assert_eq!(next_event(&mut server_rx).await, joined("bob"));

    let alice = raw_client(addr, "alice").await;
    assert_eq!(next_event(&mut server_rx).await, joined("alice"));
    assert_eq!(
        next_event(&mut bob_rx).await,
        message("SERVER", "alice has entered the room!")
    );

    drop(alice);

    assert_eq!(next_event(&mut server_rx).await, left("alice"));
    assert_eq!(
        next_event(&mut bob_rx).await,
        message("SERVER", "alice has disconnected!")
    );
    assert_quiet(&mut server_rx).await;
    assert_quiet(&mut bob_rx).await;
}

#[tokio::test]
async fn test_disconnect_mid_frame_is_a_leave() {
    let (addr, mut server_rx) = start_default_server().await;

    let mut alice = raw_client(addr, "alice").await;
    assert_eq!(next_event(&mut server_rx).await, joined("alice"));

    let wire = encode_pair(b"alice", b"never finished").unwrap();
    alice.write_all(&wire[..wire.len() - 3]).await.unwrap();
    drop(alice);

    assert_eq!(next_event(&mut server_rx).await, left("alice"));
    assert_quiet(&mut server_rx).await;
}

#[tokio::test]
async fn test_empty_identity_is_accepted() {
    let (addr, mut server_rx) = start_default_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"0         ").await.unwrap();

    assert_eq!(next_event(&mut server_rx).await, joined(""));
}

#[tokio::test]
async fn test_failed_handshakes_do_not_disturb_server() {
    let (addr, mut server_rx) = start_default_server().await;

    // closes before sending anything
    drop(TcpStream::connect(addr).await.unwrap());

    // closes halfway through the identity frame
    let mut partial = TcpStream::connect(addr).await.unwrap();
    partial.write_all(b"5         al").await.unwrap();
    drop(partial);

    // sends a header that isn't a number
    let mut garbage = TcpStream::connect(addr).await.unwrap();
    garbage.write_all(b"hello, server").await.unwrap();

    let (carol_tx, _carol_rx) = events::channel();
    let _carol = PeerSession::connect(&addr.to_string(), "carol", carol_tx)
        .await
        .unwrap();

    assert_eq!(next_event(&mut server_rx).await, joined("carol"));
    assert_quiet(&mut server_rx).await;
}

#[tokio::test]
async fn test_slow_handshake_times_out() {
    let mut config = ServerConfig::with_address("127.0.0.1:0");
    config.server.handshake_timeout_ms = 100;
    let (addr, mut server_rx) = start_server(config).await;

    let mut silent = TcpStream::connect(addr).await.unwrap();

    let mut buf = [0u8; 16];
    let read = timeout(WAIT, silent.read(&mut buf))
        .await
        .expect("server never dropped the silent connection");
    assert!(matches!(read, Ok(0) | Err(_)));

    // the server keeps accepting
    let _erin = raw_client(addr, "erin").await;
    assert_eq!(next_event(&mut server_rx).await, joined("erin"));
}

#[tokio::test]
async fn test_duplicate_names_keep_roster_consistent() {
    let (addr, mut server_rx) = start_default_server().await;
    let mut roster = Roster::new();

    let (tx1, _rx1) = events::channel();
    let first = PeerSession::connect(&addr.to_string(), "alice", tx1).await.unwrap();
    let event = next_event(&mut server_rx).await;
    roster.apply(&event);

    let (tx2, _rx2) = events::channel();
    let _second = PeerSession::connect(&addr.to_string(), "alice", tx2).await.unwrap();
    let event = next_event(&mut server_rx).await;
    roster.apply(&event);
    assert_eq!(roster.identities(), ["alice", "alice"]);

    first.shutdown().await.unwrap();

    let event = next_event(&mut server_rx).await;
    assert_eq!(event, left("alice"));
    roster.apply(&event);
    assert_eq!(roster.len(), 1);
    assert_quiet(&mut server_rx).await;
}

#[tokio::test]
async fn test_relay_uses_identity_from_handshake() {
    let (addr, mut server_rx) = start_default_server().await;

    let mut bob = raw_client(addr, "bob").await;
    assert_eq!(next_event(&mut server_rx).await, joined("bob"));
    let mut alice = raw_client(addr, "alice").await;
    assert_eq!(next_event(&mut server_rx).await, joined("alice"));

    let notice = encode_pair(b"SERVER", b"alice has entered the room!").unwrap();
    assert_eq!(read_bytes(&mut bob, notice.len()).await, notice);

    alice
        .write_all(&encode_pair(b"mallory", b"hi").unwrap())
        .await
        .unwrap();

    assert_eq!(next_event(&mut server_rx).await, message("alice", "hi"));
    let expected = encode_pair(b"alice", b"hi").unwrap();
    assert_eq!(read_bytes(&mut bob, expected.len()).await, expected);
}

#[tokio::test]
async fn test_stalled_reader_is_dropped_once() {
    let mut config = ServerConfig::with_address("127.0.0.1:0");
    config.server.write_timeout_ms = 200;
    let (addr, mut server_rx) = start_server(config).await;
    let mut roster = Roster::new();

    // bob never reads anything
    let bob = raw_client(addr, "bob").await;
    let event = next_event(&mut server_rx).await;
    assert_eq!(event, joined("bob"));
    roster.apply(&event);

    let mut alice = raw_client(addr, "alice").await;
    let event = next_event(&mut server_rx).await;
    assert_eq!(event, joined("alice"));
    roster.apply(&event);

    // far more than the loopback socket buffers hold
    let text = "x".repeat(32 * 1024 * 1024);
    alice
        .write_all(&encode_pair(b"alice", text.as_bytes()).unwrap())
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut server_rx).await,
        ChatEvent::Message { .. }
    ));
    let event = next_event(&mut server_rx).await;
    assert_eq!(event, left("bob"));
    roster.apply(&event);
    assert_eq!(roster.identities(), ["alice".to_string()]);

    let notice = encode_pair(b"SERVER", b"bob has disconnected!").unwrap();
    assert_eq!(read_bytes(&mut alice, notice.len()).await, notice);

    // bob's own close must not tear him down a second time
    drop(bob);
    assert_quiet(&mut server_rx).await;
    assert_eq!(roster.len(), 1);
}

#[tokio::test]
async fn test_reset_peer_during_fan_out_leaves_once() {
    let (addr, mut server_rx) = start_default_server().await;

    let bob = raw_client(addr, "bob").await;
    assert_eq!(next_event(&mut server_rx).await, joined("bob"));
    let mut alice = raw_client(addr, "alice").await;
    assert_eq!(next_event(&mut server_rx).await, joined("alice"));

    // RST instead of FIN, so writes to bob fail as well as reads
    bob.set_linger(Some(Duration::ZERO)).unwrap();
    drop(bob);

    for n in 0..20 {
        let text = format!("message {}", n);
        alice
            .write_all(&encode_pair(b"alice", text.as_bytes()).unwrap())
            .await
            .unwrap();
    }

    let mut lefts = 0;
    let mut messages = 0;
    while let Ok(Some(event)) = timeout(QUIET * 2, server_rx.recv()).await {
        match event {
            ChatEvent::Left { identity } => {
                assert_eq!(identity, "bob");
                lefts += 1;
            }
            ChatEvent::Message { .. } => messages += 1,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    assert_eq!(lefts, 1);
    assert_eq!(messages, 20);
}
