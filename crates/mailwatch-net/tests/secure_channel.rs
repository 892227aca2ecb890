//! Secure channel tests against an in-process rustls server.
//!
//! The server certificate is self-signed for `localhost`, so the strict level
//! must reject it (unknown issuer) while level 2 accepts it, and no level
//! accepts it for a different host name.

#![allow(clippy::unwrap_used)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mailwatch_net::{AbortSignal, Domain, Error, Timeouts, Transport, VerifyLevel};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

const CERT: &[u8] = include_bytes!("data/localhost.cert.der");
const KEY: &[u8] = include_bytes!("data/localhost.key.der");

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

/// Plaintext greeting, an `STLS` upgrade, then a TLS exchange. Returns the
/// port and the server thread.
fn spawn_stls_server(payload_len: usize) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut tcp, _) = listener.accept().unwrap();
        tcp.write_all(b"+OK ready\r\n").unwrap();
        assert_eq!(read_line(&mut tcp), "STLS\r\n");
        tcp.write_all(b"+OK begin TLS\r\n").unwrap();

        let conn = rustls::ServerConnection::new(server_config()).unwrap();
        let mut tls = rustls::StreamOwned::new(conn, tcp);
        if read_line(&mut tls) != "PING\r\n" {
            // handshake rejected by the client
            return;
        }
        let mut response = vec![b'x'; payload_len];
        response.extend_from_slice(b"\r\nBYE\r\n");
        tls.write_all(&response).unwrap();
        tls.flush().unwrap();

        // wait for the client's close_notify
        let mut rest = Vec::new();
        let _ = tls.read_to_end(&mut rest);
    });
    (port, handle)
}

async fn plain_then_stls(port: u16) -> Transport {
    let mut transport = Transport::connect(
        "127.0.0.1",
        port,
        Domain::V4,
        Timeouts::default(),
        AbortSignal::never(),
    )
    .await
    .unwrap();
    assert_eq!(transport.read_line(1024).await.unwrap(), b"+OK ready");
    transport.write_all(b"STLS\r\n").await.unwrap();
    assert_eq!(transport.read_line(1024).await.unwrap(), b"+OK begin TLS");
    transport
}

#[tokio::test]
async fn test_upgrade_and_exchange_large_payload() {
    let payload_len = 40_000;
    let (port, server) = spawn_stls_server(payload_len);

    let transport = plain_then_stls(port).await;
    let mut transport = transport
        .upgrade("localhost", VerifyLevel::MAX)
        .await
        .unwrap();
    assert!(transport.is_secure());

    transport.write_all(b"PING\r\n").await.unwrap();
    let line = transport.read_line(64 * 1024).await.unwrap();
    assert_eq!(line.len(), payload_len);
    assert!(line.iter().all(|&b| b == b'x'));
    assert_eq!(transport.read_line(1024).await.unwrap(), b"BYE");

    transport.shutdown().await;
    transport.shutdown().await;
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_strict_level_rejects_unknown_issuer() {
    let (port, server) = spawn_stls_server(16);

    let transport = plain_then_stls(port).await;
    let result = transport.upgrade("localhost", VerifyLevel::STRICT).await;
    assert!(
        matches!(result, Err(Error::Certificate(ref msg)) if msg.contains("UnknownIssuer")),
        "{result:?}"
    );
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_level_one_still_rejects_unknown_issuer() {
    let (port, server) = spawn_stls_server(16);

    let transport = plain_then_stls(port).await;
    let result = transport
        .upgrade("localhost", VerifyLevel::new(1).unwrap())
        .await;
    assert!(matches!(result, Err(Error::Certificate(_))), "{result:?}");
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_name_mismatch_rejected_at_every_level() {
    let (port, server) = spawn_stls_server(16);

    let transport = plain_then_stls(port).await;
    let result = transport.upgrade("mail.example.com", VerifyLevel::MAX).await;
    assert!(
        matches!(result, Err(Error::Certificate(ref msg)) if msg.contains("NotValidForName")),
        "{result:?}"
    );
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_implicit_tls_over_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let conn = rustls::ServerConnection::new(server_config()).unwrap();
        let mut tls = rustls::StreamOwned::new(conn, tcp);
        tls.write_all(b"* OK secure greeting\r\n").unwrap();
        tls.flush().unwrap();
        let mut rest = Vec::new();
        let _ = tls.read_to_end(&mut rest);
    });

    let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    let transport = Transport::from_socket(stream, Timeouts::default(), AbortSignal::never());
    let mut transport = transport
        .upgrade("localhost", VerifyLevel::MAX)
        .await
        .unwrap();
    assert_eq!(
        transport.read_line(1024).await.unwrap(),
        b"* OK secure greeting"
    );
    transport.shutdown().await;
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}


#[tokio::test]
async fn test_key_update_keeps_queued_plaintext() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let conn = rustls::ServerConnection::new(server_config()).unwrap();
        let mut tls = rustls::StreamOwned::new(conn, tcp);
        assert_eq!(read_line(&mut tls), "HELLO\r\n");

        // two records around a KeyUpdate, written in one burst
        tls.conn.writer().write_all(b"FIRST\r\n").unwrap();
        tls.conn.refresh_traffic_keys().unwrap();
        tls.conn.writer().write_all(b"SECOND\r\n").unwrap();
        tls.flush().unwrap();

        // readable only if the client moved to its new keys too
        assert_eq!(read_line(&mut tls), "ACK\r\n");
        let mut rest = Vec::new();
        let _ = tls.read_to_end(&mut rest);
    });

    let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    let transport = Transport::from_socket(stream, Timeouts::default(), AbortSignal::never());
    let mut transport = transport
        .upgrade("localhost", VerifyLevel::MAX)
        .await
        .unwrap();
    transport.write_all(b"HELLO\r\n").await.unwrap();
    assert_eq!(transport.read_line(1024).await.unwrap(), b"FIRST");
    assert_eq!(transport.read_line(1024).await.unwrap(), b"SECOND");
    transport.write_all(b"ACK\r\n").await.unwrap();

    transport.shutdown().await;
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_gives_up_on_stalled_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (release, released) = std::sync::mpsc::channel::<()>();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let conn = rustls::ServerConnection::new(server_config()).unwrap();
        let mut tls = rustls::StreamOwned::new(conn, tcp);
        tls.write_all(b"* OK\r\n").unwrap();
        tls.flush().unwrap();
        // stop reading until the client is done
        let _ = released.recv();
    });

    let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    let timeouts = Timeouts::default().io_timeout(Duration::from_millis(500));
    let transport = Transport::from_socket(stream, timeouts, AbortSignal::never());
    let mut transport = transport
        .upgrade("localhost", VerifyLevel::MAX)
        .await
        .unwrap();
    assert_eq!(transport.read_line(1024).await.unwrap(), b"* OK");

    // fill the socket buffers so nothing more can be written
    let filler = vec![b'x'; 32 * 1024 * 1024];
    assert!(transport.write_all(&filler).await.is_err());

    tokio::time::timeout(Duration::from_secs(10), transport.shutdown())
        .await
        .unwrap();
    release.send(()).unwrap();
    tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
}
