//! `grimoireplot serve`: run the dashboard server in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use grimoire_server::{start_blocking, ServerConfig};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind host (default: GRIMOIRE_HOST, else the host of GRIMOIRE_SERVER).
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (default: GRIMOIRE_PORT, else the port of GRIMOIRE_SERVER).
    #[arg(long)]
    pub port: Option<u16>,

    /// Shared push secret (default: GRIMOIRE_SECRET).
    #[arg(long)]
    pub secret: Option<String>,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let mut config = ServerConfig::from_env().context("failed to read configuration")?;
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secret) = self.secret {
            config.secret = secret;
        }
        start_blocking(config).context("server exited with an error")
    }
}
