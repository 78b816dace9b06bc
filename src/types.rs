use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Default number of banner bytes kept before the engine stops reading.
pub const DEFAULT_BANNER_CAP: usize = 512;
/// Default deadline covering connect and inactivity.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Rejected scan request. Raised at construction, never during a scan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("no host provided")]
    MissingHost,
    #[error("no port provided")]
    MissingPort,
    #[error("port out of range: {0}")]
    InvalidPort(u64),
    #[error("banner cap must be greater than zero")]
    ZeroBannerCap,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// A validated request to probe one `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    host: String,
    port: u16,
    banner_cap: usize,
    timeout: Duration,
}

impl ScanRequest {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, RequestError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(RequestError::MissingHost);
        }
        if port == 0 {
            return Err(RequestError::MissingPort);
        }
        Ok(Self {
            host,
            port,
            banner_cap: DEFAULT_BANNER_CAP,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_banner_cap(mut self, banner_cap: usize) -> Result<Self, RequestError> {
        if banner_cap == 0 {
            return Err(RequestError::ZeroBannerCap);
        }
        self.banner_cap = banner_cap;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, RequestError> {
        if timeout.is_zero() {
            return Err(RequestError::ZeroTimeout);
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn banner_cap(&self) -> usize {
        self.banner_cap
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Loosely-typed request input (CLI flags, JSON). Every field is optional here;
/// validation happens in the conversion to [`ScanRequest`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanOptions {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u64>,
    #[serde(default)]
    pub banner_cap: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TryFrom<ScanOptions> for ScanRequest {
    type Error = RequestError;

    fn try_from(opts: ScanOptions) -> Result<Self, Self::Error> {
        let host = opts.host.ok_or(RequestError::MissingHost)?;
        let port = match opts.port {
            None => return Err(RequestError::MissingPort),
            Some(p) if p == 0 || p > u64::from(u16::MAX) => {
                return Err(RequestError::InvalidPort(p))
            }
            Some(p) => p as u16,
        };
        let mut req = ScanRequest::new(host, port)?;
        if let Some(cap) = opts.banner_cap {
            req = req.with_banner_cap(cap)?;
        }
        if let Some(ms) = opts.timeout_ms {
            req = req.with_timeout(Duration::from_millis(ms))?;
        }
        Ok(req)
    }
}

/// Classification of a probe. `Unset` and `Open` only exist while a scan is
/// running; a finalized result always carries one of the other variants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanStatus {
    #[default]
    Unset,
    Open,
    Response,
    Silence,
    Timeout,
    ConnectionRefused,
    HostUnreachable,
    Failure(String),
}

impl ScanStatus {
    /// True until a terminal classification has been assigned.
    pub fn is_undecided(&self) -> bool {
        matches!(self, ScanStatus::Unset | ScanStatus::Open)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Unset => f.write_str("UNSET"),
            ScanStatus::Open => f.write_str("OPEN"),
            ScanStatus::Response => f.write_str("RESPONSE"),
            ScanStatus::Silence => f.write_str("SILENCE"),
            ScanStatus::Timeout => f.write_str("TIMEOUT"),
            ScanStatus::ConnectionRefused => f.write_str("CONNECTION_REFUSED"),
            ScanStatus::HostUnreachable => f.write_str("HOST_UNREACHABLE"),
            ScanStatus::Failure(detail) => write!(f, "FAILURE: {detail}"),
        }
    }
}

impl Serialize for ScanStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of probing one endpoint.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub host: String,
    pub port: u16,
    pub open: bool,
    pub status: ScanStatus,
    /// Every inbound byte in arrival order, before Telnet stripping.
    pub raw: Vec<u8>,
    pub banner: String,
    /// Connect latency, present once a connection was established.
    pub latency_ms: Option<u64>,
    pub timestamp: String,
}
