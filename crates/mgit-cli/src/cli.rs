use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mgit",
    about = "MGit: content-addressed version control with Nostr-signed commits",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Repository directory (defaults to searching upward from the cwd)
    #[arg(short = 'C', long = "repo", global = true)]
    pub repo: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new repository
    Init(InitArgs),
    /// Generate a signing key
    Keygen(KeygenArgs),
    /// Stage files or directories
    Add(AddArgs),
    /// Delete tracked files and stage the deletion
    Rm(RmArgs),
    /// Show working directory status
    Status(StatusArgs),
    /// Record the index as a signed commit
    Commit(CommitArgs),
    /// Show commit history
    Log(LogArgs),
    /// Verify every signature reachable from HEAD
    Verify(VerifyArgs),
    /// Switch to a branch or commit
    Checkout(CheckoutArgs),
    /// Manage remote repositories
    Remote(RemoteArgs),
    /// Push the current branch
    Push(SyncArgs),
    /// Fetch and fast-forward the current branch
    Pull(SyncArgs),
    /// Run an MGit server
    Serve(ServeArgs),
}

/// Where the signing key comes from.
#[derive(Args, Clone, Debug, Default)]
pub struct KeyArgs {
    /// File holding the hex secret key (overrides MGIT_NSEC)
    #[arg(long)]
    pub key_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
    /// Require commits to be signed by this public key
    #[arg(long)]
    pub pubkey: Option<String>,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Write the secret key here instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Also compare with this remote's tracking ref
    #[arg(long)]
    pub remote: Option<String>,
}

#[derive(Args)]
pub struct CommitArgs {
    #[arg(short, long)]
    pub message: String,
    #[command(flatten)]
    pub key: KeyArgs,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[derive(Args)]
pub struct CheckoutArgs {
    /// Branch name, commit id, or commit id prefix
    pub rev: String,
    /// Discard uncommitted changes
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub action: Option<RemoteAction>,
}

#[derive(Subcommand)]
pub enum RemoteAction {
    Add { name: String, url: String },
    Remove { name: String },
    List,
}

#[derive(Args)]
pub struct SyncArgs {
    #[arg(default_value = "origin")]
    pub remote: String,
    /// Bearer token for the remote
    #[arg(long, env = "MGIT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Server configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Directory holding hosted repositories
    #[arg(long)]
    pub root: Option<PathBuf>,
}
