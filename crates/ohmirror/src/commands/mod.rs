//! Command handlers, one module per top-level subcommand.

pub mod config_cmd;
pub mod items;
pub mod send;
pub mod sitemaps;
pub mod watch;

use ohmirror_core::Server;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Connect and run a command that talks to the server.
pub async fn dispatch(
    cmd: Command,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(resolved, args, global).await,
        cmd => {
            let server = Server::connect(resolved.server).await?;
            let result = match cmd {
                Command::Sitemaps => sitemaps::handle(&server, global).await,
                Command::Items(args) => items::handle(&server, &args, global).await,
                Command::Send(args) => send::send(&server, &args, global).await,
                Command::SetState(args) => send::set_state(&server, &args, global).await,
                // Watch, Config and Completions are handled before connecting
                Command::Watch(_) | Command::Config(_) | Command::Completions(_) => unreachable!(),
            };
            server.close().await;
            result
        }
    }
}
