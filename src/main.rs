use std::fs::File;
use std::path::{Path, PathBuf};

use tcp_probe_rs::scanner::Scanner;
use tcp_probe_rs::types::{ScanOptions, ScanRequest, ScanResult, DEFAULT_BANNER_CAP};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// tcp-probe-rs — probe one TCP endpoint and capture its banner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tcp-probe-rs",
    version,
    about = "Probe one TCP endpoint, classify it and capture its banner (Telnet negotiation is answered and stripped).",
    long_about = None
)]
struct Cli {
    /// Host name or IP address to probe.
    #[arg(long)]
    host: Option<String>,

    /// TCP port (1-65535).
    #[arg(long)]
    port: Option<u64>,

    /// Maximum banner bytes to collect before hanging up.
    #[arg(long = "banner-len", default_value_t = DEFAULT_BANNER_CAP)]
    banner_len: usize,

    /// Deadline for connect plus inactivity, in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 2000)]
    timeout_ms: u64,

    /// Print the result as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Write the result as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let request = ScanRequest::try_from(ScanOptions {
        host: cli.host,
        port: cli.port,
        banner_cap: Some(cli.banner_len),
        timeout_ms: Some(cli.timeout_ms),
    })
    .context("invalid scan request")?;

    let result = Scanner::new(request).analyze().await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if let Some(path) = cli.output.as_deref() {
        write_result_json(path, &result)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        eprintln!("Wrote JSON result to {}", path.display());
    }

    Ok(())
}

fn print_result(result: &ScanResult) {
    println!("target     : {}:{}", result.host, result.port);
    println!("open       : {}", result.open);
    println!("status     : {}", result.status);
    println!(
        "latency_ms : {}",
        result
            .latency_ms
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("raw bytes  : {}", result.raw.len());
    println!("banner     : {}", result.banner);
}

fn write_result_json(path: &Path, result: &ScanResult) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, result)?;
    Ok(())
}
