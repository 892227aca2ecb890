//! POP3 session against an in-process server that upgrades with STLS.

#![allow(clippy::unwrap_used)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use mailwatch_net::{AbortSignal, Domain, Timeouts, Transport, VerifyLevel};
use mailwatch_pop3::{Client, Config, Error, UidEntry};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

const CERT: &[u8] = include_bytes!("../../mailwatch-net/tests/data/localhost.cert.der");
const KEY: &[u8] = include_bytes!("../../mailwatch-net/tests/data/localhost.key.der");

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mailwatch_pop3=trace")
        .with_test_writer()
        .try_init();
}

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
/// asked for STLS.
fn serve<S: Read + Write>(stream: &mut S, secure: bool) -> bool {
    loop {
        let line = read_line(stream);
        let reply: &[u8] = match line.trim_end() {
            "" => return false,
            "CAPA" if secure => b"+OK\r\nTOP\r\nUSER\r\nUIDL\r\n.\r\n",
            "CAPA" => b"+OK\r\nTOP\r\nUSER\r\nUIDL\r\nSTLS\r\n.\r\n",
            "STLS" => {
                stream.write_all(b"+OK begin TLS\r\n").unwrap();
                return true;
            }
            "USER alice" => b"+OK\r\n",
            "PASS open sesame" => {
                assert!(secure, "password sent in the clear");
                b"+OK 2 messages\r\n"
            }
            "UIDL" => b"+OK\r\n1 uid-one\r\n2 uid-two\r\n.\r\n",
            "TOP 2 0" => b"+OK\r\nSubject: Second\r\nFrom: bob@example.com\r\n\r\n.\r\n",
            "QUIT" => {
                stream.write_all(b"+OK bye\r\n").unwrap();
                stream.flush().unwrap();
                return false;
            }
            _ => b"-ERR unknown command\r\n",
        };
        stream.write_all(reply).unwrap();
        stream.flush().unwrap();
    }
}

fn spawn_server() -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut tcp, _) = listener.accept().unwrap();
        tcp.write_all(b"+OK POP3 test server ready\r\n").unwrap();
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

async fn connect(port: u16, config: Config) -> Client<mailwatch_pop3::Authorization> {
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
async fn test_stls_session() {
    init_tracing();
    let (port, server) = spawn_server();
    let config = Config::builder("localhost").verify(VerifyLevel::MAX).build();

    let mut session = connect(port, config)
        .await
        .login("alice", "open sesame")
        .await
        .unwrap();
    assert!(session.is_secure());
    assert!(!session.capabilities().unwrap().supports_stls());

    let entries = session.uidl().await.unwrap();
    assert_eq!(
        entries,
        vec![
            UidEntry {
                number: 1,
                uid: "uid-one".to_string()
            },
            UidEntry {
                number: 2,
                uid: "uid-two".to_string()
            },
        ]
    );
    assert_eq!(
        session.top(2, 0).await.unwrap(),
        b"Subject: Second\r\nFrom: bob@example.com\r\n\r\n"
    );
    assert!(matches!(session.top(1, 0).await, Err(Error::Negative(_))));

    session.quit().await.unwrap();
    join(server).await;
}

#[tokio::test]
async fn test_strict_verification_rejects_self_signed() {
    init_tracing();
    let (port, server) = spawn_server();

    let result = connect(port, Config::new("localhost"))
        .await
        .login("alice", "open sesame")
        .await;
    assert!(matches!(
        result,
        Err(Error::Net(mailwatch_net::Error::Certificate(_)))
    ));
    join(server).await;
}
