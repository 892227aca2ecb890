//! Integration tests for the IMAP client against an in-process server.
//!
//! The server speaks plaintext until STARTTLS and then continues the same
//! dialogue over rustls, using the self-signed `localhost` certificate from
//! the transport crate's test data.

#![allow(clippy::unwrap_used)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use mailwatch_imap::{
    Client, Config, Error, IDLE_TIMEOUT, IdleEvent, IdleOutcome, Mailbox, SessionState,
};
use mailwatch_net::{AbortSignal, Domain, Timeouts, Transport, VerifyLevel};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

const CERT: &[u8] = include_bytes!("../../mailwatch-net/tests/data/localhost.cert.der");
const KEY: &[u8] = include_bytes!("../../mailwatch-net/tests/data/localhost.key.der");

const HEADER: &str = "Subject: Hello\r\nFrom: Alice <alice@example.com>\r\n\r\n";

fn server_config() -> Arc<rustls::ServerConfig> {
    let cert = CertificateDer::from(CERT.to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(KEY.to_vec()));
    Arc::new(
        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert], key)
            .unwrap(),
    )
}

fn read_line<R: Read>(reader: &mut R) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while reader.read(&mut byte).unwrap_or(0) == 1 {
        line.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    String::from_utf8(line).unwrap()
}

/// Answers commands until the client leaves. Returns true if the client
/// asked for STARTTLS.
fn serve<S: Read + Write>(stream: &mut S, secure: bool) -> bool {
    loop {
        let line = read_line(stream);
        let Some((tag, command)) = line.trim_end().split_once(' ') else {
            return false;
        };
        let verb = command.split(' ').next().unwrap_or_default();
        let reply = match verb {
            "CAPABILITY" if secure => format!("* CAPABILITY IMAP4rev1 IDLE\r\n{tag} OK done\r\n"),
            "CAPABILITY" => format!(
                "* CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED\r\n{tag} OK done\r\n"
            ),
            "STARTTLS" => {
                stream
                    .write_all(format!("{tag} OK begin TLS\r\n").as_bytes())
                    .unwrap();
                return true;
            }
            "LOGIN" => {
                assert!(secure, "LOGIN sent in the clear");
                assert_eq!(command, "LOGIN alice \"open sesame\"");
                format!("{tag} OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n")
            }
            "EXAMINE" => format!(
                "* 3 EXISTS\r\n* 1 RECENT\r\n* OK [UIDVALIDITY 77] ok\r\n{tag} OK [READ-ONLY] done\r\n"
            ),
            "UID" if command.starts_with("UID SEARCH") => {
                format!("* SEARCH 7 9\r\n{tag} OK done\r\n")
            }
            "UID" if command.starts_with("UID FETCH 7 ") => format!(
                "* 2 FETCH (FLAGS (\\Recent))\r\n* 1 FETCH (UID 7 BODY[HEADER.FIELDS (SUBJECT FROM DATE)] {{{}}}\r\n{HEADER})\r\n{tag} OK done\r\n",
                HEADER.len()
            ),
            "UID" => format!("{tag} OK nothing\r\n"),
            "IDLE" => {
                stream.write_all(b"+ idling\r\n* 4 EXISTS\r\n").unwrap();
                stream.flush().unwrap();
                assert_eq!(read_line(stream), "DONE\r\n");
                format!("{tag} OK IDLE terminated\r\n")
            }
            "LOGOUT" => {
                stream
                    .write_all(format!("* BYE see you\r\n{tag} OK done\r\n").as_bytes())
                    .unwrap();
                stream.flush().unwrap();
                return false;
            }
            _ => format!("{tag} BAD unknown\r\n"),
        };
        stream.write_all(reply.as_bytes()).unwrap();
        stream.flush().unwrap();
    }
}

fn spawn_server() -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut tcp, _) = listener.accept().unwrap();
        tcp.write_all(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] test server ready\r\n")
            .unwrap();
        if !serve(&mut tcp, false) {
            return;
        }
        let conn = rustls::ServerConnection::new(server_config()).unwrap();
        let mut tls = rustls::StreamOwned::new(conn, tcp);
        serve(&mut tls, true);
        let mut rest = Vec::new();
        let _ = tls.read_to_end(&mut rest);
    });
    (port, handle)
}

async fn connect(port: u16, config: Config) -> Client {
    let transport = Transport::connect(
        "127.0.0.1",
        port,
        Domain::V4,
        Timeouts::default(),
        AbortSignal::never(),
    )
    .await
    .unwrap();
    Client::from_transport(transport, config).await.unwrap()
}

async fn join(server: thread::JoinHandle<()>) {
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_starttls_session() {
    let (port, server) = spawn_server();
    let config = Config::builder("localhost")
        .verify(VerifyLevel::MAX)
        .build();

    let client = connect(port, config).await;
    assert_eq!(client.state(), SessionState::NotAuthenticated);
    assert!(!client.is_secure());

    let mut client = client.login("alice", "open sesame").await.unwrap();
    assert!(client.is_secure());
    assert!(client.supports_idle());
    assert_eq!(client.state(), SessionState::Authenticated);

    let status = client.examine(&Mailbox::inbox()).await.unwrap();
    assert_eq!(status.exists, 3);
    assert_eq!(status.recent, 1);
    assert_eq!(status.uid_validity, Some(77));
    assert!(status.read_only);

    assert_eq!(client.search_unseen().await.unwrap(), vec![7, 9]);
    let header = client.fetch_headers(7).await.unwrap().unwrap();
    assert_eq!(header, HEADER.as_bytes());
    assert_eq!(client.fetch_headers(9).await.unwrap(), None);

    let outcome = client.idle(IDLE_TIMEOUT).await.unwrap();
    assert_eq!(outcome, IdleOutcome::Event(IdleEvent::Exists(4)));

    client.logout().await.unwrap();
    join(server).await;
}

#[tokio::test]
async fn test_strict_verification_rejects_self_signed() {
    let (port, server) = spawn_server();
    let client = connect(port, Config::new("localhost")).await;

    let result = client.login("alice", "open sesame").await;
    assert!(
        matches!(
            &result,
            Err(Error::Net(mailwatch_net::Error::Certificate(_)))
        ),
        "{result:?}"
    );
    join(server).await;
}

#[tokio::test]
async fn test_plaintext_login_refused() {
    let (port, server) = spawn_server();
    let config = Config::builder("localhost").starttls(false).build();
    let client = connect(port, config).await;

    let result = client.login("alice", "open sesame").await;
    assert!(matches!(result, Err(Error::LoginDisabled)), "{result:?}");
    join(server).await;
}
