//! `grimoireplot watch`: print change events as they happen.

use anyhow::Result;
use chrono::Local;
use clap::Args;
use colored::Colorize;

use grimoire_server::protocol::PrefixQuery;

use crate::client::{Client, SseEvent};
use crate::commands::ServerArg;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Only plots in this grimoire.
    #[arg(long)]
    pub grimoire: Option<String>,

    /// Only plots in this chapter (requires --grimoire).
    #[arg(long, requires = "grimoire")]
    pub chapter: Option<String>,

    /// Only this plot (requires --chapter).
    #[arg(long, requires = "chapter")]
    pub plot: Option<String>,

    #[command(flatten)]
    pub server: ServerArg,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let client = Client::new(&self.server.server)?;
        let prefix = PrefixQuery {
            grimoire: self.grimoire,
            chapter: self.chapter,
            plot: self.plot,
        };
        client.follow(&prefix, |event| {
            let now = Local::now().format("%H:%M:%S");
            match event {
                SseEvent::Change(change) => println!(
                    "{} {} {}/{}/{} v{}",
                    now.to_string().dimmed(),
                    "change".cyan(),
                    change.grimoire,
                    change.chapter,
                    change.plot,
                    change.version
                ),
                SseEvent::Resync => println!(
                    "{} {} fell behind, refetch with `grimoireplot tree`",
                    now.to_string().dimmed(),
                    "resync".yellow()
                ),
            }
        })?;
        println!("{}", "stream closed by server".dimmed());
        Ok(())
    }
}
