//! Bidirectional relay between a client and its upstream server.
//!
//! A session runs two pumps, client to server and server to client. The
//! first pump to stop, for any reason, cancels the other; each pump then
//! shuts down the write half it owns, and dropping the halves closes both
//! sockets exactly once.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::observe::{Direction, ObservationSink};
use crate::proxy::BoxedStream;

/// Size of each read on either leg.
pub const BUFFER_SIZE: usize = 2048;

/// Upper bound on flushing a write half during teardown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a pump stopped.
#[derive(Debug)]
pub enum PumpEnd {
    /// The source closed cleanly.
    Eof,
    /// Reading from the source failed.
    ReadFailed(io::Error),
    /// Writing to the destination failed.
    WriteFailed(io::Error),
    /// Neither direction carried data within the idle timeout.
    IdleTimeout,
    /// The paired pump stopped first.
    Cancelled,
}

/// What one pump did before it stopped.
#[derive(Debug)]
pub struct PumpReport {
    pub bytes: u64,
    pub end: PumpEnd,
}

/// Result of a finished session.
#[derive(Debug)]
pub struct SessionOutcome {
    pub bytes_from_client: u64,
    pub bytes_from_server: u64,
    pub client_end: PumpEnd,
    pub server_end: PumpEnd,
}

/// One client connection paired with one upstream connection.
pub struct RelaySession {
    id: u64,
    client: BoxedStream,
    server: BoxedStream,
    sink: Arc<dyn ObservationSink>,
    idle_timeout: Option<Duration>,
}

impl RelaySession {
    pub fn new(
        id: u64,
        client: BoxedStream,
        server: BoxedStream,
        sink: Arc<dyn ObservationSink>,
    ) -> Self {
        Self {
            id,
            client,
            server,
            sink,
            idle_timeout: None,
        }
    }

    /// End the session once neither direction has carried data for
    /// `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Relay until either direction stops, then close both legs.
    pub async fn run(self) -> SessionOutcome {
        let (client_read, client_write) = tokio::io::split(self.client);
        let (server_read, server_write) = tokio::io::split(self.server);
        let cancel = CancellationToken::new();
        let activity = Arc::new(Activity::new());

        let from_server = Pump {
            direction: Direction::Server,
            session_id: self.id,
            sink: Arc::clone(&self.sink),
            idle_timeout: self.idle_timeout,
            activity: Arc::clone(&activity),
            cancel: cancel.clone(),
        };
        let server_task = tokio::spawn(from_server.run(server_read, client_write));

        let from_client = Pump {
            direction: Direction::Client,
            session_id: self.id,
            sink: self.sink,
            idle_timeout: self.idle_timeout,
            activity,
            cancel: cancel.clone(),
        };
        let client_report = from_client.run(client_read, server_write).await;

        let server_report = match server_task.await {
            Ok(report) => report,
            Err(e) => {
                warn!("[{}] server pump failed: {}", self.id, e);
                PumpReport {
                    bytes: 0,
                    end: PumpEnd::ReadFailed(io::Error::other(e.to_string())),
                }
            }
        };

        SessionOutcome {
            bytes_from_client: client_report.bytes,
            bytes_from_server: server_report.bytes,
            client_end: client_report.end,
            server_end: server_report.end,
        }
    }
}

/// Last time either pump read data, shared by both pumps of a session.
struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }
}

/// Copies one direction of a session.
struct Pump {
    direction: Direction,
    session_id: u64,
    sink: Arc<dyn ObservationSink>,
    idle_timeout: Option<Duration>,
    activity: Arc<Activity>,
    cancel: CancellationToken,
}

impl Pump {
    async fn run<R, W>(self, mut reader: ReadHalf<R>, mut writer: WriteHalf<W>) -> PumpReport
    where
        R: AsyncRead,
        W: AsyncWrite,
    {
        let mut buf = vec![0u8; BUFFER_SIZE];
        let mut total: u64 = 0;

        let end = loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break PumpEnd::Cancelled,
                r = read_chunk(&mut reader, &mut buf, self.idle_timeout, &self.activity) => r,
            };

            let n = match read {
                Ok(0) => break PumpEnd::Eof,
                Ok(n) => {
                    self.activity.touch();
                    n
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break PumpEnd::IdleTimeout,
                Err(e) => break PumpEnd::ReadFailed(e),
            };

            let data = &buf[..n];
            self.sink.log_buffer(self.direction, self.session_id, data);
            self.sink.record_buffer(self.direction, self.session_id, data);

            let written = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break PumpEnd::Cancelled,
                r = writer.write_all(data) => r,
            };
            if let Err(e) = written {
                break PumpEnd::WriteFailed(e);
            }
            total += n as u64;
        };

        debug!(
            "[{}] {} pump stopped after {} bytes: {:?}",
            self.session_id, self.direction, total, end
        );

        self.cancel.cancel();
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, writer.shutdown()).await;

        PumpReport { bytes: total, end }
    }
}

/// Read once. With an idle timeout, a quiet read only times out when the
/// other direction has been quiet for as long.
async fn read_chunk<R: AsyncRead>(
    reader: &mut ReadHalf<R>,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
    activity: &Activity,
) -> io::Result<usize> {
    let Some(limit) = idle_timeout else {
        return reader.read(buf).await;
    };

    loop {
        let deadline = activity.last() + limit;
        match tokio::time::timeout_at(deadline, reader.read(buf)).await {
            Ok(read) => return read,
            Err(_) if activity.last() + limit <= Instant::now() => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "idle timeout"));
            }
            // The other direction moved; wait out the new window.
            Err(_) => continue,
        }
    }
}
