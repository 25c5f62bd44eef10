//! `grimoireplot tree`: list everything the server holds.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use grimoire_core::Tree;

use crate::client::Client;
use crate::commands::ServerArg;

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub server: ServerArg,
}

#[derive(Tabled)]
struct TreeRow {
    #[tabled(rename = "grimoire")]
    grimoire: String,
    #[tabled(rename = "chapter")]
    chapter: String,
    #[tabled(rename = "plot")]
    plot: String,
    #[tabled(rename = "version")]
    version: u64,
    #[tabled(rename = "mode")]
    mode: String,
    #[tabled(rename = "last updated")]
    last_updated: String,
}

impl TreeArgs {
    pub fn run(self) -> Result<()> {
        let tree = Client::new(&self.server.server)?.tree()?;
        if self.json {
            let text = serde_json::to_string_pretty(&tree).context("failed to encode tree")?;
            println!("{text}");
            return Ok(());
        }
        if tree.grimoires.is_empty() {
            println!("{}", "no plots yet".dimmed());
            return Ok(());
        }
        let mut table = Table::new(rows(&tree));
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn rows(tree: &Tree) -> Vec<TreeRow> {
    let mut rows = Vec::with_capacity(tree.plot_count());
    for grimoire in &tree.grimoires {
        for chapter in &grimoire.chapters {
            for plot in &chapter.plots {
                rows.push(TreeRow {
                    grimoire: grimoire.name.to_string(),
                    chapter: chapter.name.to_string(),
                    plot: plot.name.to_string(),
                    version: plot.version,
                    mode: plot.mode.to_string(),
                    last_updated: plot.last_updated.format("%Y-%m-%d %H:%M:%S").to_string(),
                });
            }
        }
    }
    rows
}
