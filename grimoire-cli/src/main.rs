//! GrimoirePlot: live chart dashboard server and client.
//!
//! # Usage
//!
//! ```text
//! grimoireplot serve [--host <host>] [--port <port>] [--secret <secret>]
//! grimoireplot push <grimoire> <chapter> <plot> [FILE|-] [--mode replace|append]
//! grimoireplot tree [--json]
//! grimoireplot show <grimoire> <chapter> <plot> [--figure]
//! grimoireplot watch [--grimoire <g> [--chapter <c> [--plot <p>]]]
//! grimoireplot delete <grimoire> [chapter [plot]]
//! ```
//!
//! Client commands talk to `--server` (default `GRIMOIRE_SERVER`); `push`
//! and `delete` authenticate with `--secret` (default `GRIMOIRE_SECRET`).

mod client;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    delete::DeleteArgs, push::PushArgs, serve::ServeArgs, show::ShowArgs, tree::TreeArgs,
    watch::WatchArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "grimoireplot",
    version,
    about = "Live-updating chart dashboard: run the server or push plots to it",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dashboard server.
    Serve(ServeArgs),

    /// Push a figure to a plot, creating it on first push.
    Push(PushArgs),

    /// List grimoires, chapters and plots.
    Tree(TreeArgs),

    /// Print the current state of one plot.
    Show(ShowArgs),

    /// Follow live change events.
    Watch(WatchArgs),

    /// Remove a grimoire, a chapter or a single plot.
    Delete(DeleteArgs),
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Push(args) => args.run(),
        Commands::Tree(args) => args.run(),
        Commands::Show(args) => args.run(),
        Commands::Watch(args) => args.run(),
        Commands::Delete(args) => args.run(),
    }
}
