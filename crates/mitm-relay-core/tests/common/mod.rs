//! Test harness for relay integration tests.
//!
//! Provides stub upstream servers, a recording observation sink and helpers
//! to start a relay on an ephemeral loopback port.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mitm_relay_core::config::TlsSubjectConfig;
use mitm_relay_core::tls::{insecure_connector, TlsIdentity};
use mitm_relay_core::{BufferSnapshot, Config, Direction, ObservationSink, RelayContext, RelayServer};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Sink that keeps every snapshot in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<BufferSnapshot>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<BufferSnapshot> {
        self.records.lock().unwrap().clone()
    }

    pub fn seen_from(&self, direction: Direction) -> Vec<BufferSnapshot> {
        self.records()
            .into_iter()
            .filter(|r| r.direction == direction)
            .collect()
    }
}

impl ObservationSink for RecordingSink {
    fn record_buffer(&self, direction: Direction, session_id: u64, data: &[u8]) {
        self.records
            .lock()
            .unwrap()
            .push(BufferSnapshot::new(direction, session_id, data));
    }

    fn log_buffer(&self, _direction: Direction, _session_id: u64, _data: &[u8]) {}
}

async fn echo<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S) {
    let mut buf = vec![0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Plain TCP upstream that echoes every connection.
pub async fn spawn_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(echo(stream));
        }
    });
    addr
}

/// TLS upstream that echoes every connection.
pub async fn spawn_tls_echo_upstream() -> SocketAddr {
    let subject = TlsSubjectConfig {
        common_name: "localhost".into(),
        ..Default::default()
    };
    let acceptor = TlsIdentity::self_signed(&subject).unwrap().acceptor().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(tls) = acceptor.accept(stream).await {
                    echo(tls).await;
                }
            });
        }
    });
    addr
}

/// Upstream that accepts one connection, collects everything until EOF and
/// reports it.
pub async fn spawn_collecting_upstream() -> (SocketAddr, oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut collected = Vec::new();
        let _ = stream.read_to_end(&mut collected).await;
        let _ = tx.send(collected);
    });
    (addr, rx)
}

/// Upstream that accepts one connection, writes `payload` in `chunk`-sized
/// writes and closes.
pub async fn spawn_sending_upstream(payload: Vec<u8>, chunk: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        for part in payload.chunks(chunk) {
            stream.write_all(part).await.unwrap();
        }
        stream.shutdown().await.unwrap();
    });
    addr
}

/// Upstream that writes one byte per `interval`, `count` times, then
/// stays open without sending anything more.
pub async fn spawn_trickling_upstream(count: u8, interval: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        for i in 0..count {
            tokio::time::sleep(interval).await;
            if stream.write_all(&[i]).await.is_err() {
                return;
            }
        }
        let mut buf = [0u8; 64];
        while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn relay_config(remote: SocketAddr, tls: bool) -> Config {
    let mut config = Config::default();
    config.relay.local_host = "127.0.0.1".into();
    config.relay.local_port = 0;
    config.relay.remote_host = remote.to_string();
    config.relay.tls = tls;
    config.tls.common_name = "localhost".into();
    config
}

pub struct RunningRelay {
    pub addr: SocketAddr,
    pub ctx: RelayContext,
    pub handle: JoinHandle<mitm_relay_core::Result<()>>,
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start_relay(config: Config, sink: Arc<dyn ObservationSink>) -> RunningRelay {
    let ctx = RelayContext::new(config, sink);
    let server = RelayServer::bind(ctx.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.run());
    RunningRelay { addr, ctx, handle }
}

pub async fn connect_tls(
    addr: SocketAddr,
) -> io::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let connector = insecure_connector().map_err(io::Error::other)?;
    let stream = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost").map_err(io::Error::other)?;
    connector.connect(name, stream).await
}

/// Read until `n` bytes arrived or `WAIT` elapsed.
pub async fn read_n<S: AsyncRead + Unpin>(stream: &mut S, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for relayed bytes")
        .expect("read failed");
    buf
}

/// True if the peer closes (EOF or error) within `WAIT`.
pub async fn closes_soon<S: AsyncRead + Unpin>(stream: &mut S) -> bool {
    let mut buf = [0u8; 64];
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        match tokio::time::timeout_at(deadline, stream.read(&mut buf)).await {
            Err(_) => return false,
            Ok(Ok(0)) | Ok(Err(_)) => return true,
            Ok(Ok(_)) => continue,
        }
    }
}
