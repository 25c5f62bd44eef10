//! `grimoireplot delete`: remove a grimoire, a chapter or one plot.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use grimoire_server::config::DEFAULT_SECRET;

use crate::client::Client;
use crate::commands::ServerArg;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub grimoire: String,

    /// Only this chapter.
    pub chapter: Option<String>,

    /// Only this plot (requires a chapter).
    #[arg(requires = "chapter")]
    pub plot: Option<String>,

    #[arg(long, env = "GRIMOIRE_SECRET", default_value = DEFAULT_SECRET, hide_env_values = true)]
    pub secret: String,

    #[command(flatten)]
    pub server: ServerArg,
}

impl DeleteArgs {
    pub fn run(self) -> Result<()> {
        let mut segments = vec!["grimoire", self.grimoire.as_str()];
        if let Some(chapter) = &self.chapter {
            segments.extend(["chapter", chapter.as_str()]);
        }
        if let Some(plot) = &self.plot {
            segments.extend(["plot", plot.as_str()]);
        }
        let target = [Some(&self.grimoire), self.chapter.as_ref(), self.plot.as_ref()]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("/");

        let client = Client::new(&self.server.server)?;
        let response = client
            .delete(&self.secret, &segments)
            .with_context(|| format!("delete of {target} failed"))?;

        println!(
            "{} {} ({} plot{})",
            "deleted".red().bold(),
            target,
            response.plots,
            if response.plots == 1 { "" } else { "s" }
        );
        Ok(())
    }
}
