//! Item command and state-update handlers.

use ohmirror_core::{ItemCommand, Server};

use crate::cli::{GlobalOpts, SendArgs, SetStateArgs};
use crate::error::CliError;
use crate::output;

/// `send <item> <command>`: the text is read for the item's type, so
/// `ON` goes to a switch as a keyword and `42` to a dimmer as a value.
pub async fn send(server: &Server, args: &SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let item = server.fetch_item(&args.item).await?;
    let command = ItemCommand::parse(item.kind(), &args.command)?;
    tracing::debug!(item = %item.name(), command = command.name(), "sending command");

    item.execute(command).await?;
    report(global, item.name(), &item.encoded_state())
}

/// `set-state <item> <value>`: overwrite the state without a command.
pub async fn set_state(
    server: &Server,
    args: &SetStateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let item = server.fetch_item(&args.item).await?;
    let value = item.kind().parse_state(&args.value)?;

    item.set_state(value).await?;
    report(global, item.name(), &item.encoded_state())
}

fn report(global: &GlobalOpts, name: &str, state: &str) -> Result<(), CliError> {
    #[derive(serde::Serialize)]
    struct Outcome<'a> {
        item: &'a str,
        state: &'a str,
    }

    let out = output::render_single(
        &global.output,
        &Outcome { item: name, state },
        |o| format!("{} = {}", o.item, o.state),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
