//! Clap derive structures for the `ohmirror` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ohmirror -- browse and drive an openHAB server from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "ohmirror",
    version,
    about = "Mirror openHAB sitemaps and command items from the command line",
    long_about = "Mirrors the sitemap pages, widgets and items of an openHAB server.\n\n\
        `watch` keeps the mirror live with long-polling and prints every\n\
        attribute change; `send` and `set-state` drive items directly.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "OHMIRROR_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server base URL (overrides profile)
    #[arg(long, short = 'u', env = "OHMIRROR_URL", global = true)]
    pub url: Option<String>,

    /// Username for basic auth (password from OHMIRROR_PASSWORD or keyring)
    #[arg(long, env = "OHMIRROR_USERNAME", global = true)]
    pub username: Option<String>,

    /// Proxy policy: `system`, `none`, or a proxy URL
    #[arg(long, env = "OHMIRROR_PROXY", global = true)]
    pub proxy: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "OHMIRROR_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "OHMIRROR_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the sitemaps the server offers
    #[command(alias = "sm")]
    Sitemaps,

    /// List items and their current state
    #[command(alias = "i")]
    Items(ItemsArgs),

    /// Mirror a sitemap and print attribute changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send a command to an item (ON, OFF, TOGGLE, 42, 120,100,50, ...)
    Send(SendArgs),

    /// Overwrite an item's state without issuing a command
    SetState(SetStateArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Item Commands ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ItemsArgs {
    /// Only show items of this type (Switch, Number, ...)
    #[arg(long = "type", short = 't')]
    pub kind: Option<String>,

    /// Only show items whose name contains this text
    #[arg(long, short = 'f')]
    pub filter: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Sitemap to mirror (defaults to the profile's sitemap)
    pub sitemap: Option<String>,

    /// Also long-poll every item referenced by the sitemap
    #[arg(long)]
    pub items: bool,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Item name
    pub item: String,

    /// Command text, interpreted for the item's type
    pub command: String,
}

#[derive(Debug, Args)]
pub struct SetStateArgs {
    /// Item name
    pub item: String,

    /// New state, interpreted for the item's type
    pub value: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the current configuration (secrets masked)
    Show,

    /// Store a profile's password in the system keyring
    SetPassword {
        /// Profile to store the password for (defaults to the active one)
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
