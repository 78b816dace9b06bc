//! Library crate for tcp-probe-rs: single-endpoint TCP probing with Telnet-aware banner capture.
pub mod banner;
pub mod scanner;
pub mod telnet;
pub mod types;
