//! Clap derive structures for the `nextlink` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nextlink -- command-line client for Nextcloud servers
#[derive(Debug, Parser)]
#[command(
    name = "nextlink",
    version,
    about = "Browse Nextcloud files and OCS endpoints from the command line",
    long_about = "A small client for Nextcloud servers.\n\n\
        Talks WebDAV for files and the OCS API for users, notifications\n\
        and capabilities, using accounts from the nextlink config file.",
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
    /// Account id to use (defaults to `default_account`, then the first ready account)
    #[arg(long, short = 'a', env = "NEXTLINK_ACCOUNT", global = true)]
    pub account: Option<u32>,

    /// Service requested from accounts (overrides `defaults.service`)
    #[arg(long, env = "NEXTLINK_SERVICE", global = true)]
    pub service: Option<String>,

    /// Config file path (overrides the platform default)
    #[arg(long, env = "NEXTLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NEXTLINK_OUTPUT",
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

    /// Log raw request and reply bodies at trace level
    #[arg(long, global = true)]
    pub dump: bool,
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
    /// List configured accounts and their sign-in state
    #[command(alias = "acc")]
    Accounts(AccountsArgs),

    /// List a remote directory
    Ls(LsArgs),

    /// Create a remote directory
    Mkdir(MkdirArgs),

    /// Upload a local file
    Put(PutArgs),

    /// Download a remote file
    Get(GetArgs),

    /// Show one capability group published by the server
    #[command(alias = "caps")]
    Capabilities(CapabilitiesArgs),

    /// List notifications for the signed-in user
    Notifications,

    /// Show the signed-in user, or another user by id
    Whoami(WhoamiArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Accounts ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AccountsArgs {
    /// Enumerate accounts without signing in
    #[arg(long)]
    pub passive: bool,
}

// ── Files ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LsArgs {
    /// Remote directory, relative to the WebDAV root
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug, Args)]
pub struct MkdirArgs {
    /// Remote directory to create
    pub path: String,
}

#[derive(Debug, Args)]
pub struct PutArgs {
    /// Local file to upload
    pub local: PathBuf,

    /// Remote destination (defaults to the local file name at the root)
    pub remote: Option<String>,

    /// Content type sent with the upload
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Remote file to download
    pub remote: String,

    /// Local destination (defaults to the remote file name; `-` for stdout)
    pub local: Option<PathBuf>,
}

// ── OCS ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CapabilitiesArgs {
    /// Capability group, e.g. "notifications" or "files"
    pub name: String,
}

#[derive(Debug, Args)]
pub struct WhoamiArgs {
    /// Look up this user id instead of the signed-in user
    #[arg(long)]
    pub user: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the loaded configuration (secrets redacted)
    Show,

    /// Store an account secret in the system keyring, read from stdin
    SetSecret {
        /// Account id
        id: u32,

        /// Store an access token instead of a password
        #[arg(long)]
        token: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
