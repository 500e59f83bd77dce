//! rcrdp: entry point.
//!
//! ```text
//! rcrdp -h <host>                 Connect and serve on 0.0.0.0:8080
//! rcrdp -h <host> -p 9000         Serve on another port
//! rcrdp -h <host> -u user -P pw   Supply credentials
//! rcrdp --config <path>           Load a custom config TOML
//! rcrdp --gen-config              Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{ArgAction, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rcrdp::bridge::Bridge;
use rcrdp::config::{BridgeConfig, LoggingConfig};
use rcrdp_core::SyntheticEngine;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "rcrdp",
    about = "Remote desktop session bridged to a local HTTP control server",
    disable_help_flag = true
)]
struct Cli {
    /// RDP server hostname.
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// RDP server port.
    #[arg(short = 'r', long)]
    rdp_port: Option<u16>,

    /// HTTP server port.
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// RDP username.
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// RDP password.
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// RDP domain.
    #[arg(short = 'd', long)]
    domain: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rcrdp.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// Command-line values win over the file.
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(host) = self.host {
            config.rdp.hostname = host;
        }
        if let Some(port) = self.rdp_port {
            config.rdp.port = port;
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(username) = self.username {
            config.rdp.username = username;
        }
        if let Some(password) = self.password {
            config.rdp.password = password;
        }
        if let Some(domain) = self.domain {
            config.rdp.domain = domain;
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = BridgeConfig::load(&cli.config);
    cli.apply(&mut config);
    init_tracing(&config.logging)?;

    let Some(target) = config.to_target() else {
        return Err("no RDP hostname given (use -h/--host or [rdp].hostname)".into());
    };

    info!("rcrdp v{}", env!("CARGO_PKG_VERSION"));
    info!("RDP target: {}:{}", target.hostname, target.port);
    info!("HTTP control: {}:{}", config.http.bind_address, config.http.port);

    let bridge = match Bridge::start(&config, SyntheticEngine::default(), target).await {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            error!("failed to start bridge: {e}");
            return Err(e.into());
        }
    };

    let status = bridge.session().status();
    info!(username = %status.username, "session up: {}:{}", status.hostname, status.port);
    if let Ok(addr) = bridge.local_addr() {
        info!("control server bound to {addr}");
    }

    // Ctrl-C handler.
    tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, shutting down");
            let _ = tokio::task::spawn_blocking(move || bridge.shutdown()).await;
        }
    });

    bridge.run().await?;
    info!("bye");
    Ok(())
}
