pub mod delete;
pub mod push;
pub mod serve;
pub mod show;
pub mod tree;
pub mod watch;

use clap::Args;

use grimoire_server::config::DEFAULT_SERVER;

/// Where client commands connect.
#[derive(Args, Debug, Clone)]
pub struct ServerArg {
    /// Server base URL.
    #[arg(long, env = "GRIMOIRE_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,
}
