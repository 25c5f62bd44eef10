//! `grimoireplot push`: send a figure to a plot.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use grimoire_core::PlotMode;
use grimoire_server::config::DEFAULT_SECRET;
use grimoire_server::protocol::PushRequest;

use crate::client::Client;
use crate::commands::ServerArg;

#[derive(Args, Debug)]
pub struct PushArgs {
    pub grimoire: String,
    pub chapter: String,
    pub plot: String,

    /// Figure JSON file; `-` or omitted reads stdin.
    pub file: Option<PathBuf>,

    /// `replace` (default) or `append`. Fixed by the plot's first push.
    #[arg(long, default_value_t = PlotMode::Replace)]
    pub mode: PlotMode,

    #[arg(long, env = "GRIMOIRE_SECRET", default_value = DEFAULT_SECRET, hide_env_values = true)]
    pub secret: String,

    #[command(flatten)]
    pub server: ServerArg,
}

impl PushArgs {
    pub fn run(self) -> Result<()> {
        let text = read_figure(self.file.as_ref())?;
        let figure: Value = serde_json::from_str(&text).context("figure is not valid JSON")?;

        let client = Client::new(&self.server.server)?;
        let request = PushRequest {
            grimoire_name: self.grimoire,
            chapter_name: self.chapter,
            plot_name: self.plot,
            mode: self.mode,
            figure: Some(figure),
            json_data: None,
        };
        let path = request.path();
        let response = client
            .push(&self.secret, &request)
            .with_context(|| format!("push to {path} failed"))?;

        println!(
            "{} {} v{} ({})",
            "pushed".green().bold(),
            path,
            response.version,
            response.mode
        );
        Ok(())
    }
}

fn read_figure(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) if path.to_str() != Some("-") => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read figure from stdin")?;
            Ok(text)
        }
    }
}
