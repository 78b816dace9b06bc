//! Telnet option negotiation for banner capture.
//!
//! The prober is not a terminal, so every option is refused:
//! - `IAC DO <opt>`   => `IAC WONT <opt>`
//! - `IAC WILL <opt>` => `IAC DONT <opt>`
//! - `IAC DONT`/`IAC WONT` need no answer and are dropped.
//!
//! Subnegotiation blocks (`IAC SB ... IAC SE`) and two-byte commands are
//! stripped. Work is bounded by the chunk in hand: a sequence that does not
//! terminate inside the chunk is passed through as ordinary bytes and is not
//! reassembled with the next read.

use std::io;

use tokio::net::TcpStream;
use tracing::{trace, warn};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const GA: u8 = 249;
pub const SE: u8 = 240;

/// Stripped payload plus the replies owed to the peer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub data: Vec<u8>,
    pub replies: Vec<u8>,
}

/// Somewhere to push negotiation replies without suspending.
pub trait ReplySink {
    fn send_reply(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl ReplySink for TcpStream {
    fn send_reply(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut sent = 0;
        while sent < bytes.len() {
            match self.try_write(&bytes[sent..])? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => sent += n,
            }
        }
        Ok(())
    }
}

impl ReplySink for Vec<u8> {
    fn send_reply(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Parse one inbound chunk, separating payload bytes from control sequences.
pub fn negotiate(chunk: &[u8]) -> Negotiation {
    let mut out = Negotiation {
        data: Vec::with_capacity(chunk.len()),
        replies: Vec::new(),
    };

    let mut i = 0;
    while i < chunk.len() {
        if chunk[i] != IAC {
            out.data.push(chunk[i]);
            i += 1;
            continue;
        }

        let Some(&cmd) = chunk.get(i + 1) else {
            // Lone IAC closing the chunk.
            out.data.push(IAC);
            break;
        };

        match cmd {
            IAC => {
                out.data.push(IAC);
                i += 2;
            }
            DO | DONT | WILL | WONT => {
                let Some(&opt) = chunk.get(i + 2) else {
                    out.data.extend_from_slice(&chunk[i..]);
                    break;
                };
                match cmd {
                    DO => {
                        trace!(option = opt, "refusing DO");
                        out.replies.extend_from_slice(&[IAC, WONT, opt]);
                    }
                    WILL => {
                        trace!(option = opt, "refusing WILL");
                        out.replies.extend_from_slice(&[IAC, DONT, opt]);
                    }
                    _ => {}
                }
                i += 3;
            }
            SB => match subnegotiation_end(&chunk[i + 2..]) {
                Some(body_len) => i += 2 + body_len + 2,
                None => {
                    out.data.extend_from_slice(&chunk[i..]);
                    break;
                }
            },
            SE..=GA => i += 2,
            _ => {
                // Not a command byte: leave both bytes to the payload.
                out.data.push(IAC);
                i += 1;
            }
        }
    }

    out
}

/// Strip control sequences from `chunk` and answer them on `sink`.
///
/// A reply that cannot be written right away is dropped; the peer will
/// either carry on or the scan deadline ends the session.
pub fn negotiate_on<S: ReplySink + ?Sized>(sink: &mut S, chunk: &[u8]) -> Vec<u8> {
    let Negotiation { data, replies } = negotiate(chunk);
    if !replies.is_empty() {
        if let Err(e) = sink.send_reply(&replies) {
            warn!(error = %e, len = replies.len(), "failed to send telnet replies");
        }
    }
    data
}

/// Length of a subnegotiation body up to (not including) its `IAC SE`.
fn subnegotiation_end(body: &[u8]) -> Option<usize> {
    let mut j = 0;
    while j < body.len() {
        if body[j] == IAC {
            match body.get(j + 1) {
                Some(&SE) => return Some(j),
                Some(_) => j += 2,
                None => return None,
            }
        } else {
            j += 1;
        }
    }
    None
}
