//! `grimoireplot show`: print one plot's current snapshot.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use grimoire_core::PlotPath;

use crate::client::Client;
use crate::commands::ServerArg;

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub grimoire: String,
    pub chapter: String,
    pub plot: String,

    /// Print only the figure JSON.
    #[arg(long)]
    pub figure: bool,

    #[command(flatten)]
    pub server: ServerArg,
}

impl ShowArgs {
    pub fn run(self) -> Result<()> {
        let path = PlotPath::new(self.grimoire, self.chapter, self.plot);
        let snapshot = Client::new(&self.server.server)?
            .snapshot(&path)
            .with_context(|| format!("could not fetch {path}"))?;
        let figure =
            serde_json::to_string_pretty(&snapshot.figure).context("failed to encode figure")?;

        if self.figure {
            println!("{figure}");
            return Ok(());
        }
        println!("{} {}", "plot".bold(), path);
        println!("  version      {}", snapshot.version);
        println!("  mode         {}", snapshot.mode);
        println!("  created      {}", snapshot.created_at.to_rfc3339());
        println!("  last updated {}", snapshot.last_updated.to_rfc3339());
        println!("{figure}");
        Ok(())
    }
}
