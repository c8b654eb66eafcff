//! Chat mode between two real endpoints on loopback.
//!
//! Console input is an in-memory reader; output is collected into a
//! `Vec<u8>` and compared line by line.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};

use sham::{
    chat::{run_chat, ChatEnd, MAX_TEXT},
    config::Config,
    connection::Connection,
    event_log::EventLog,
    session::{Mode, Outcome, Progress, Role, Session},
    socket::Socket,
    state::ConnectionState,
};

const GUARD: Duration = Duration::from_secs(5);

async fn ephemeral() -> Socket {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind loopback socket")
}

async fn connect_pair() -> (Connection, Connection) {
    let server_socket = ephemeral().await;
    let server_addr = server_socket.local_addr;
    let server_task = tokio::spawn(async move {
        Connection::accept(server_socket, &Config::default(), EventLog::disabled()).await
    });
    let client = Connection::connect(
        ephemeral().await,
        server_addr,
        &Config::default(),
        EventLog::disabled(),
    )
    .await
    .unwrap();
    let server = server_task.await.unwrap().unwrap();
    (client, server)
}

/// The client types two lines; the server prints both and stops on `/quit`.
#[tokio::test]
async fn client_quit_ends_both_sides() {
    let (mut client, mut server) = connect_pair().await;

    // Server console stays open: its write half lives until the end.
    let (_server_keyboard, server_stdin) = tokio::io::duplex(64);
    let server_task = tokio::spawn(async move {
        let mut screen = Vec::new();
        let end = run_chat(&mut server, BufReader::new(server_stdin), &mut screen, "Client")
            .await
            .unwrap();
        (end, screen, server.state)
    });

    let mut client_screen = Vec::new();
    let end = tokio::time::timeout(
        GUARD,
        run_chat(&mut client, &b"hello\n/quit\n"[..], &mut client_screen, "Server"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(end, ChatEnd::Local);
    assert_eq!(client.state, ConnectionState::Closed);
    assert!(client_screen.is_empty());

    let (end, screen, state) = tokio::time::timeout(GUARD, server_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(end, ChatEnd::Peer);
    assert_eq!(state, ConnectionState::Closed);
    assert_eq!(String::from_utf8(screen).unwrap(), "Client: hello\nClient: /quit\n");
}

/// End of local input behaves like typing `/quit`.
#[tokio::test]
async fn end_of_input_sends_quit() {
    let (mut client, mut server) = connect_pair().await;

    let (_client_keyboard, client_stdin) = tokio::io::duplex(64);
    let client_task = tokio::spawn(async move {
        let mut screen = Vec::new();
        let end = run_chat(&mut client, BufReader::new(client_stdin), &mut screen, "Server")
            .await
            .unwrap();
        (end, screen)
    });

    let mut server_screen = Vec::new();
    let end = tokio::time::timeout(
        GUARD,
        run_chat(&mut server, &b"hi there\r\n"[..], &mut server_screen, "Client"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(end, ChatEnd::Local);

    let (end, screen) = tokio::time::timeout(GUARD, client_task).await.unwrap().unwrap();
    assert_eq!(end, ChatEnd::Peer);
    assert_eq!(
        String::from_utf8(screen).unwrap(),
        "Server: hi there\nServer: /quit\n"
    );
}

/// Messages flow both ways while each side waits on its console.
#[tokio::test]
async fn messages_flow_both_ways() {
    let (mut client, mut server) = connect_pair().await;

    let (mut server_keyboard, server_stdin) = tokio::io::duplex(256);
    let server_task = tokio::spawn(async move {
        let mut screen = Vec::new();
        let end = run_chat(&mut server, BufReader::new(server_stdin), &mut screen, "Client")
            .await
            .unwrap();
        (end, screen)
    });

    let (mut client_keyboard, client_stdin) = tokio::io::duplex(256);
    let (screen_tx, mut screen_rx) = tokio::io::duplex(256);
    let client_task = tokio::spawn(async move {
        let mut screen = screen_tx;
        run_chat(&mut client, BufReader::new(client_stdin), &mut screen, "Server")
            .await
            .unwrap()
    });

    server_keyboard.write_all(b"welcome\n").await.unwrap();
    let mut line = vec![0u8; "Server: welcome\n".len()];
    tokio::time::timeout(GUARD, tokio::io::AsyncReadExt::read_exact(&mut screen_rx, &mut line))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, b"Server: welcome\n");

    client_keyboard.write_all(b"thanks\n/quit\n").await.unwrap();
    let client_end = tokio::time::timeout(GUARD, client_task).await.unwrap().unwrap();
    assert_eq!(client_end, ChatEnd::Local);

    let (server_end, screen) = tokio::time::timeout(GUARD, server_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(server_end, ChatEnd::Peer);
    assert_eq!(
        String::from_utf8(screen).unwrap(),
        "Client: thanks\nClient: /quit\n"
    );
}

/// A line longer than one datagram arrives as several displayed pieces.
#[tokio::test]
async fn long_line_is_split_across_datagrams() {
    let (mut client, mut server) = connect_pair().await;

    let (_server_keyboard, server_stdin) = tokio::io::duplex(64);
    let server_task = tokio::spawn(async move {
        let mut screen = Vec::new();
        run_chat(&mut server, BufReader::new(server_stdin), &mut screen, "Client")
            .await
            .unwrap();
        screen
    });

    let long = "x".repeat(MAX_TEXT + 10);
    let input = format!("{long}\n/quit\n");
    run_chat(&mut client, input.as_bytes(), &mut Vec::new(), "Server")
        .await
        .unwrap();

    let screen = tokio::time::timeout(GUARD, server_task).await.unwrap().unwrap();
    let expected = format!(
        "Client: {}\nClient: {}\nClient: /quit\n",
        "x".repeat(MAX_TEXT),
        "x".repeat(10)
    );
    assert_eq!(String::from_utf8(screen).unwrap(), expected);
}

/// Chat through [`Session`], with the peer label chosen by role.
#[tokio::test]
async fn session_chat_uses_role_labels() {
    let (client, server) = connect_pair().await;
    let client = Session::from_connection(Role::Initiator, client);
    let server = Session::from_connection(Role::Responder, server);

    let server_task = tokio::spawn(async move {
        let mut screen = Vec::new();
        let mut started = false;
        let outcome = server
            .run(Mode::Chat, &b"pong\n"[..], &mut screen, |p| {
                started |= p == Progress::ChatStarted;
            })
            .await
            .unwrap();
        (outcome, screen, started)
    });

    let (_keyboard, stdin) = tokio::io::duplex(64);
    let mut screen = Vec::new();
    let outcome = tokio::time::timeout(
        GUARD,
        client.run(Mode::Chat, BufReader::new(stdin), &mut screen, |_| {}),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome, Outcome::Chat(ChatEnd::Peer));
    assert_eq!(String::from_utf8(screen).unwrap(), "Server: pong\nServer: /quit\n");

    let (outcome, _, started) = tokio::time::timeout(GUARD, server_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Outcome::Chat(ChatEnd::Local));
    assert!(started);
}
