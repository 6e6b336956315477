use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use apdurun_core::{RootKey, RootKeyOrigin};
use apdurun_transport::config::{DEFAULT_PROXY_ADDRESS, DEFAULT_PROXY_PORT, DEFAULT_TARGET_ID};
use apdurun_transport::{
    run_script, DeployedSecret, ProxyTransport, SecureSession, TransportConfig,
};

/// Read a sequence of command APDUs from a file and send them to the device.
/// The file must be formatted as hex, with one command APDU per line.
#[derive(Debug, Parser)]
#[command(name = "apdurun", version)]
struct Cli {
    /// The APDU script to load (standard input when absent)
    #[arg(long = "fileName")]
    file_name: Option<PathBuf>,

    /// Display APDU log
    #[arg(long)]
    apdu: bool,

    /// Open a secure channel to exchange APDUs
    #[arg(long)]
    scp: bool,

    /// The device's target ID (default is Ledger Nano S)
    #[arg(long = "targetId", value_parser = parse_auto_int, default_value_t = DEFAULT_TARGET_ID)]
    target_id: u32,

    /// The signer private key used to establish the secure channel
    /// (otherwise a random one is generated)
    #[arg(long = "rootPrivateKey")]
    root_private_key: Option<String>,

    /// Device proxy host
    #[arg(long = "proxyAddress", env = "LEDGER_PROXY_ADDRESS", default_value = DEFAULT_PROXY_ADDRESS)]
    proxy_address: String,

    /// Device proxy port
    #[arg(long = "proxyPort", env = "LEDGER_PROXY_PORT", default_value_t = DEFAULT_PROXY_PORT)]
    proxy_port: u16,
}

impl Cli {
    fn transport_config(&self) -> TransportConfig {
        TransportConfig::proxy(self.proxy_address.clone(), self.proxy_port)
            .with_target_id(self.target_id)
            .with_apdu_log(self.apdu)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.apdu);

    let config = cli.transport_config();

    // Opened before the loop, closed when it ends.
    let input: Box<dyn BufRead> = match &cli.file_name {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening script {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let transport = ProxyTransport::connect(&config)
        .with_context(|| format!("connecting to device proxy at {}", config.proxy_endpoint()))?;

    let mut session = if cli.scp {
        let root = RootKey::resolve(cli.root_private_key.as_deref())
            .context("reading --rootPrivateKey")?;
        announce_root_key(&root, &mut io::stdout().lock())?;
        SecureSession::establish(transport, &mut DeployedSecret::new(), &root, config.target_id)
            .context("opening secure channel")?
    } else {
        SecureSession::plain(transport)
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = run_script(&mut session, input, &mut out, config.apdu_log)
        .context("running APDU script")?;
    out.flush()?;

    tracing::info!(sent = summary.sent, skipped = summary.skipped, "done");
    Ok(())
}

/// Print the public half of a generated root key so it can be recorded.
fn announce_root_key<W: Write>(root: &RootKey, out: &mut W) -> io::Result<()> {
    if root.origin() == RootKeyOrigin::Generated {
        writeln!(out, "Generated random root public key : {}", root.public_key_hex())?;
    }
    Ok(())
}

fn init_tracing(apdu_log: bool) {
    let default = if apdu_log {
        "warn,apdurun_transport=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Integer with an optional `0x`, `0o` or `0b` radix prefix.
fn parse_auto_int(value: &str) -> Result<u32, String> {
    let value = value.trim().replace('_', "");
    let lower = value.to_ascii_lowercase();
    let (digits, radix) = match lower.get(..2) {
        Some("0x") => (&lower[2..], 16),
        Some("0o") => (&lower[2..], 8),
        Some("0b") => (&lower[2..], 2),
        _ => (lower.as_str(), 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| format!("invalid integer {:?}: {}", value, e))
}
