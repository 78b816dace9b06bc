use crate::banner::format_banner;
use crate::telnet::{negotiate_on, ReplySink};
use crate::types::{ScanRequest, ScanResult, ScanStatus};
use ::time::{format_description::well_known, OffsetDateTime};
use std::io;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Bytes requested per read while the connection is open.
const READ_CHUNK: usize = 4096;

/// Probe a single endpoint.
///
/// - One absolute deadline (`timeout`) covers both connect and inactivity; it is never reset.
/// - Inbound chunks go through the Telnet negotiator before reaching the banner buffer.
/// - The engine hangs up on its own once `banner_cap` bytes have been collected.
/// - Every network outcome is reported through [`ScanResult::status`]; nothing is retried.
#[derive(Debug, Clone)]
pub struct Scanner {
    request: ScanRequest,
}

impl Scanner {
    pub fn new(request: ScanRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &ScanRequest {
        &self.request
    }

    /// Run the scan to completion. Resolves exactly once with a finalized result.
    pub async fn analyze(&self) -> ScanResult {
        let req = &self.request;
        let deadline = Instant::now() + req.timeout();
        let mut session: Session<TcpStream> = Session::new(req);

        session.begin();
        debug!(
            host = req.host(),
            port = req.port(),
            timeout_ms = req.timeout().as_millis() as u64,
            "connecting"
        );
        let event = tokio::select! {
            res = TcpStream::connect((req.host(), req.port())) => match res {
                Ok(stream) => Event::Connect(stream),
                Err(e) => Event::Error(e),
            },
            _ = time::sleep_until(deadline) => Event::Timeout,
        };
        let mut flow = session.dispatch(event);

        let mut buf = vec![0u8; READ_CHUNK];
        while flow == Flow::Continue {
            let stream = session
                .conn
                .as_mut()
                .expect("a running session owns its connection");
            let read = tokio::select! {
                res = stream.read(&mut buf) => Some(res),
                _ = time::sleep_until(deadline) => None,
            };
            let event = match read {
                Some(Ok(0)) => Event::RemoteClose,
                Some(Ok(n)) => Event::Data(buf[..n].to_vec()),
                Some(Err(e)) => Event::Error(e),
                None => Event::Timeout,
            };
            flow = session.dispatch(event);
        }

        session.into_result()
    }
}

/// Convenience wrapper around [`Scanner::analyze`].
pub async fn probe(request: ScanRequest) -> ScanResult {
    Scanner::new(request).analyze().await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    Failed,
    Closed,
}

#[derive(Debug)]
enum Event<C> {
    Connect(C),
    Data(Vec<u8>),
    RemoteClose,
    Timeout,
    Error(io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
}

/// Connection lifecycle for one scan. Owns the connection and the result
/// accumulator; both are only touched through `dispatch`.
struct Session<C> {
    phase: Phase,
    conn: Option<C>,
    banner_cap: usize,
    banner_raw: Vec<u8>,
    started: Instant,
    result: ScanResult,
    finalized: bool,
}

impl<C: ReplySink> Session<C> {
    fn new(req: &ScanRequest) -> Self {
        Self {
            phase: Phase::Idle,
            conn: None,
            banner_cap: req.banner_cap(),
            banner_raw: Vec::new(),
            started: Instant::now(),
            result: ScanResult {
                host: req.host().to_string(),
                port: req.port(),
                open: false,
                status: ScanStatus::Unset,
                raw: Vec::new(),
                banner: String::new(),
                latency_ms: None,
                timestamp: now_iso_like(),
            },
            finalized: false,
        }
    }

    fn begin(&mut self) {
        debug_assert_eq!(self.phase, Phase::Idle);
        self.started = Instant::now();
        self.phase = Phase::Connecting;
    }

    fn dispatch(&mut self, event: Event<C>) -> Flow {
        if self.finalized {
            trace!(phase = ?self.phase, "event after finalization ignored");
            return Flow::Done;
        }

        match event {
            Event::Connect(conn) => {
                let latency_ms = self.started.elapsed().as_millis() as u64;
                debug!(latency_ms, "connected");
                self.phase = Phase::Connected;
                self.conn = Some(conn);
                self.result.open = true;
                self.result.latency_ms = Some(latency_ms);
                self.result.status = ScanStatus::Open;
                Flow::Continue
            }
            Event::Data(chunk) => {
                let conn = self
                    .conn
                    .as_mut()
                    .expect("data event without a live connection");
                self.result.raw.extend_from_slice(&chunk);
                let cleaned = negotiate_on(conn, &chunk);
                trace!(received = chunk.len(), kept = cleaned.len(), "chunk");

                if self.banner_raw.len() >= self.banner_cap {
                    debug!(cap = self.banner_cap, "banner cap already reached, closing");
                    self.finalize();
                    return Flow::Done;
                }
                self.banner_raw.extend_from_slice(&cleaned);
                if self.banner_raw.len() >= self.banner_cap {
                    debug!(cap = self.banner_cap, "banner cap reached, closing");
                    self.finalize();
                    return Flow::Done;
                }
                Flow::Continue
            }
            Event::RemoteClose => {
                debug!("remote closed");
                if self.banner_raw.is_empty() {
                    self.result.open = false;
                }
                self.finalize();
                Flow::Done
            }
            Event::Timeout => {
                debug!(open = self.result.open, "deadline elapsed");
                self.result.status = if self.result.open {
                    ScanStatus::Response
                } else {
                    ScanStatus::Timeout
                };
                self.finalize();
                Flow::Done
            }
            Event::Error(e) => {
                debug!(error = %e, kind = ?e.kind(), "socket error");
                self.phase = Phase::Failed;
                self.result.status = classify(&e);
                self.finalize();
                Flow::Done
            }
        }
    }

    /// Idempotent: only the first call has any effect.
    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if self.result.status.is_undecided() {
            self.result.status = if self.result.open {
                ScanStatus::Response
            } else {
                ScanStatus::Silence
            };
        }
        self.result.banner = format_banner(&self.banner_raw, self.banner_cap);
        // Dropping the stream closes the socket.
        self.conn = None;
        self.phase = Phase::Closed;
        debug!(
            status = %self.result.status,
            open = self.result.open,
            raw = self.result.raw.len(),
            "scan finished"
        );
    }

    fn into_result(mut self) -> ScanResult {
        self.finalize();
        self.result
    }
}

fn classify(err: &io::Error) -> ScanStatus {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ScanStatus::ConnectionRefused,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ScanStatus::HostUnreachable
        }
        _ => ScanStatus::Failure(err.to_string()),
    }
}

fn now_iso_like() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
