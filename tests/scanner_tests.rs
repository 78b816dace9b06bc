use std::time::Duration;

use tcp_probe_rs::scanner::{probe, Scanner};
use tcp_probe_rs::telnet::{DO, DONT, IAC, WILL, WONT};
use tcp_probe_rs::types::{ScanRequest, ScanStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{self, Instant};

fn request(port: u16, timeout_ms: u64) -> ScanRequest {
    ScanRequest::new("127.0.0.1", port)
        .unwrap()
        .with_timeout(Duration::from_millis(timeout_ms))
        .unwrap()
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn closed_port_is_refused() {
    let (l, port) = listener().await;
    drop(l);

    let r = probe(request(port, 500)).await;
    assert_eq!(r.status, ScanStatus::ConnectionRefused);
    assert!(!r.open);
    assert_eq!(r.banner, "");
    assert!(r.raw.is_empty());
    assert_eq!(r.port, port);
}

#[tokio::test]
async fn silent_service_times_out_as_response() {
    let (l, port) = listener().await;
    tokio::spawn(async move {
        let (_sock, _) = l.accept().await.unwrap();
        time::sleep(Duration::from_secs(3)).await;
    });

    let start = Instant::now();
    let r = probe(request(port, 300)).await;
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(r.status, ScanStatus::Response);
    assert!(r.open);
    assert!(r.raw.is_empty());
    assert_eq!(r.banner, "");
    assert!(r.latency_ms.is_some());
}

#[tokio::test]
async fn ssh_banner_captured_while_peer_stays_open() {
    let (l, port) = listener().await;
    tokio::spawn(async move {
        let (mut sock, _) = l.accept().await.unwrap();
        sock.write_all(b"SSH-2.0-OpenSSH_8.9\r\n").await.unwrap();
        time::sleep(Duration::from_secs(3)).await;
    });

    let r = probe(request(port, 400)).await;
    assert!(r.open);
    assert_eq!(r.status, ScanStatus::Response);
    assert_eq!(r.raw, b"SSH-2.0-OpenSSH_8.9\r\n");
    assert_eq!(r.raw.len(), 21);
    assert_eq!(r.banner, "SSH-2.0-OpenSSH_8.9\\r\\n");
}

#[tokio::test]
async fn banner_then_close_is_trimmed_and_escaped() {
    let (l, port) = listener().await;
    tokio::spawn(async move {
        let (mut sock, _) = l.accept().await.unwrap();
        sock.write_all(b"  220 ftp ready\r\n").await.unwrap();
    });

    let r = probe(request(port, 2000)).await;
    assert!(r.open);
    assert_eq!(r.status, ScanStatus::Response);
    assert_eq!(r.raw, b"  220 ftp ready\r\n");
    assert_eq!(r.banner, "220 ftp ready\\r\\n");
}

#[tokio::test]
async fn immediate_close_is_silence() {
    let (l, port) = listener().await;
    tokio::spawn(async move {
        let (sock, _) = l.accept().await.unwrap();
        drop(sock);
    });

    let r = probe(request(port, 2000)).await;
    assert!(!r.open);
    assert_eq!(r.status, ScanStatus::Silence);
    assert_eq!(r.banner, "");
}

#[tokio::test]
async fn telnet_negotiation_is_refused_and_stripped() {
    let (l, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = l.accept().await.unwrap();
        let mut hello = vec![IAC, DO, 24, IAC, WILL, 1];
        hello.extend_from_slice(b"login: ");
        sock.write_all(&hello).await.unwrap();

        let mut replies = [0u8; 6];
        time::timeout(Duration::from_secs(2), sock.read_exact(&mut replies))
            .await
            .expect("replies in time")
            .unwrap();
        replies
    });

    let r = probe(request(port, 3000)).await;
    let replies = server.await.unwrap();
    assert_eq!(replies, [IAC, WONT, 24, IAC, DONT, 1]);
    assert!(r.open);
    assert_eq!(r.status, ScanStatus::Response);
    assert_eq!(r.raw.len(), 13);
    assert_eq!(r.banner, "login:");
}

#[tokio::test]
async fn banner_cap_hangs_up_before_peer() {
    let (l, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = l.accept().await.unwrap();
        sock.write_all(&[b'A'; 64]).await.unwrap();
        let mut buf = [0u8; 16];
        // Ok(0) or a reset both mean the prober closed first.
        match time::timeout(Duration::from_secs(2), sock.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => true,
            _ => false,
        }
    });

    let req = request(port, 5000).with_banner_cap(16).unwrap();
    let start = Instant::now();
    let r = Scanner::new(req).analyze().await;
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(server.await.unwrap(), "prober did not close the connection");
    assert!(r.open);
    assert_eq!(r.status, ScanStatus::Response);
    assert_eq!(r.banner, "A".repeat(16));
    assert!(r.banner.chars().count() <= 16);
}

#[tokio::test]
async fn unresolvable_host_never_escapes_as_error() {
    let req = ScanRequest::new("no-such-host.invalid", 80)
        .unwrap()
        .with_timeout(Duration::from_millis(1500))
        .unwrap();
    let r = probe(req).await;
    assert!(!r.open);
    assert!(matches!(r.status, ScanStatus::Failure(_) | ScanStatus::Timeout));
}

#[tokio::test]
#[ignore]
async fn unroutable_address_times_out() {
    let req = ScanRequest::new("10.255.255.1", 9)
        .unwrap()
        .with_timeout(Duration::from_millis(300))
        .unwrap();
    let start = Instant::now();
    let r = probe(req).await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(r.status, ScanStatus::Timeout);
    assert!(!r.open);
}
