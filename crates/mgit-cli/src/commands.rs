use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use mgit_sdk::{
    FileStatus, LocalIdentity, MergeStatus, NostrPubkey, RefError, Repository, SdkError,
    SigningKey, SyncState, WorkdirStatus,
};
use mgit_server::{MgitServer, ServerConfig};
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

const NSEC_ENV: &str = "MGIT_NSEC";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let ctx = Session {
        repo: cli.repo,
        json: matches!(cli.format, OutputFormat::Json),
    };
    match cli.command {
        Command::Init(args) => cmd_init(&ctx, args),
        Command::Keygen(args) => cmd_keygen(&ctx, args),
        Command::Add(args) => cmd_add(&ctx, args),
        Command::Rm(args) => cmd_rm(&ctx, args),
        Command::Status(args) => cmd_status(&ctx, args),
        Command::Commit(args) => cmd_commit(&ctx, args),
        Command::Log(args) => cmd_log(&ctx, args),
        Command::Verify(_) => cmd_verify(&ctx),
        Command::Checkout(args) => cmd_checkout(&ctx, args),
        Command::Remote(args) => cmd_remote(&ctx, args),
        Command::Push(args) => cmd_push(&ctx, args).await,
        Command::Pull(args) => cmd_pull(&ctx, args).await,
        Command::Serve(args) => cmd_serve(args).await,
    }
}

struct Session {
    repo: Option<PathBuf>,
    json: bool,
}

impl Session {
    fn open(&self) -> anyhow::Result<Repository> {
        let start = match &self.repo {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        let repo = Repository::discover(&start)?;
        debug!(start = %start.display(), root = ?repo.root(), "opened repository");
        Ok(repo)
    }

    fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Paths on the command line are relative to the cwd, not the repository.
fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    Ok(std::env::current_dir()?.join(path))
}

fn load_key(args: &KeyArgs) -> anyhow::Result<SigningKey> {
    let hex = match &args.key_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?,
        None => std::env::var(NSEC_ENV)
            .with_context(|| format!("no signing key: set {NSEC_ENV} or pass --key-file"))?,
    };
    SigningKey::from_hex(hex.trim()).context("invalid signing key")
}

fn cmd_init(ctx: &Session, args: InitArgs) -> anyhow::Result<()> {
    let path = match args.path.or_else(|| ctx.repo.clone()) {
        Some(p) => p,
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&path)?;
    let repo = Repository::init(&path)?;
    if let Some(pubkey) = &args.pubkey {
        let pubkey = NostrPubkey::from_hex(pubkey).context("invalid public key")?;
        repo.set_user(Some(pubkey))?;
    }
    println!(
        "{} Initialized MGit repository in {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    println!("  Branch: {}", repo.current_branch()?.yellow());
    Ok(())
}

#[derive(Serialize)]
struct KeygenOutput {
    pubkey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
}

fn cmd_keygen(ctx: &Session, args: KeygenArgs) -> anyhow::Result<()> {
    let key = SigningKey::generate();
    let secret = hex::encode(key.to_bytes());
    let pubkey = key.public_key().to_hex();
    let secret = match &args.output {
        Some(path) => {
            if path.exists() {
                bail!("refusing to overwrite {}", path.display());
            }
            std::fs::write(path, format!("{secret}\n"))?;
            None
        }
        None => Some(secret),
    };
    if ctx.json {
        return ctx.print_json(&KeygenOutput { pubkey, secret });
    }
    println!("Public key: {}", pubkey.cyan());
    match (&secret, &args.output) {
        (Some(secret), _) => println!("Secret key: {secret}\n  export {NSEC_ENV}={secret}"),
        (None, Some(path)) => println!("Secret key written to {}", path.display()),
        (None, None) => {}
    }
    Ok(())
}

fn cmd_add(ctx: &Session, args: AddArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    for path in &args.paths {
        for staged in repo.stage(absolute(path)?)? {
            println!("  {} {}", "staged:".green(), staged);
        }
    }
    Ok(())
}

fn cmd_rm(ctx: &Session, args: RmArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    for path in &args.paths {
        for removed in repo.remove(absolute(path)?)? {
            println!("  {} {}", "removed:".red(), removed);
        }
    }
    Ok(())
}

fn cmd_status(ctx: &Session, args: StatusArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    let status = repo.status()?;
    let sync = args
        .remote
        .as_deref()
        .map(|remote| repo.sync_state(remote))
        .transpose()?;
    if ctx.json {
        #[derive(Serialize)]
        struct Out<'a> {
            branch: Option<String>,
            head: Option<String>,
            #[serde(flatten)]
            status: &'a WorkdirStatus,
            sync: Option<SyncState>,
        }
        return ctx.print_json(&Out {
            branch: repo.current_branch().ok(),
            head: repo.head_commit()?.map(|id| id.to_hex()),
            status: &status,
            sync,
        });
    }

    match repo.current_branch() {
        Ok(branch) => println!("On branch {}", branch.yellow().bold()),
        Err(SdkError::Refs(RefError::DetachedHead)) => {
            let head = repo.head_commit()?.map(|id| id.short_hex()).unwrap_or_default();
            println!("HEAD detached at {}", head.yellow().bold());
        }
        Err(e) => return Err(e.into()),
    }
    if let (Some(state), Some(remote)) = (sync, &args.remote) {
        let text = match state {
            SyncState::Synced => "up to date".green(),
            SyncState::Ahead => "ahead, push to publish".yellow(),
            SyncState::Behind => "behind, pull to update".yellow(),
            SyncState::Diverged => "diverged".red(),
            SyncState::Unpublished => "not yet pushed".dimmed(),
        };
        println!("Remote {}: {}", remote.bold(), text);
    }
    if status.is_clean() {
        println!("\nNothing to commit, working directory clean.");
        return Ok(());
    }
    if status.has_staged_changes() {
        println!("\nChanges to be committed:");
        for entry in &status.staged {
            let label = match entry.status {
                FileStatus::New => "new file:",
                FileStatus::Modified => "modified:",
                FileStatus::Deleted => "deleted:",
            };
            println!("  {} {}", label.green(), entry.path);
        }
    }
    if !status.modified.is_empty() || !status.deleted.is_empty() {
        println!("\nChanges not staged:");
        for path in &status.modified {
            println!("  {} {}", "modified:".red(), path);
        }
        for path in &status.deleted {
            println!("  {} {}", "deleted:".red(), path);
        }
    }
    if !status.untracked.is_empty() {
        println!("\nUntracked files:");
        for path in &status.untracked {
            println!("  {}", path.red());
        }
    }
    Ok(())
}

fn cmd_commit(ctx: &Session, args: CommitArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    let identity = LocalIdentity::new(load_key(&args.key)?);
    let result = repo.commit(&identity, &args.message)?;
    if ctx.json {
        return ctx.print_json(&result);
    }
    println!(
        "{} [{} {}] {}",
        "✓".green().bold(),
        result.branch.yellow(),
        result.id.short_hex().dimmed(),
        args.message.lines().next().unwrap_or_default()
    );
    Ok(())
}

fn cmd_log(ctx: &Session, args: LogArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    let log = repo.log(Some(args.limit))?;
    if ctx.json {
        return ctx.print_json(&log);
    }
    if log.is_empty() {
        println!("No commits yet.");
    }
    for commit in &log {
        let mark = if commit.is_verified() { "✓".green() } else { "✗".red() };
        if args.oneline {
            println!("{} {} {}", commit.id.short_hex().yellow(), mark, commit.subject());
            continue;
        }
        println!("{} {}", "commit".yellow(), commit.id.to_hex().yellow());
        println!("Author: {}  {}", commit.author.short_id().cyan(), mark);
        let date = chrono::DateTime::from_timestamp(commit.timestamp, 0)
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| commit.timestamp.to_string());
        println!("Date:   {date}\n");
        for line in commit.message.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

fn cmd_verify(ctx: &Session) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    let report = repo.verify_chain()?;
    if ctx.json {
        ctx.print_json(&report)?;
    } else if report.valid {
        println!(
            "{} {} commits verified",
            "✓".green().bold(),
            report.checked.to_string().bold()
        );
    } else {
        let bad = report.first_invalid.map(|id| id.to_hex()).unwrap_or_default();
        println!("{} signature check failed at {}", "✗".red().bold(), bad.yellow());
        if let Some(failure) = report.failure {
            println!("  status: {failure:?}");
        }
    }
    if !report.valid {
        bail!("history is not validly signed");
    }
    Ok(())
}

fn cmd_checkout(ctx: &Session, args: CheckoutArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    let commit = repo.checkout(&args.rev, args.force)?;
    match repo.current_branch() {
        Ok(branch) => println!("Switched to {}", branch.yellow().bold()),
        Err(_) => println!("HEAD is now at {} (detached)", commit.short_hex().yellow()),
    }
    Ok(())
}

fn cmd_remote(ctx: &Session, args: RemoteArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    match args.action {
        Some(RemoteAction::Add { name, url }) => {
            repo.add_remote(&name, &url)?;
            println!("Added remote {} → {}", name.bold(), url.blue());
        }
        Some(RemoteAction::Remove { name }) => {
            repo.remove_remote(&name)?;
            println!("Removed remote {}", name.bold());
        }
        Some(RemoteAction::List) | None => {
            let remotes = repo.remotes();
            if ctx.json {
                return ctx.print_json(&remotes);
            }
            if remotes.is_empty() {
                println!("No remotes configured.");
            }
            for (name, url) in remotes {
                println!("{}\t{}", name.bold(), url.blue());
            }
        }
    }
    Ok(())
}

async fn cmd_push(ctx: &Session, args: SyncArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    let branch = repo.current_branch()?;
    let result = repo.push(&args.remote, args.token).await?;
    if ctx.json {
        return ctx.print_json(&result);
    }
    println!(
        "{} Pushed {}/{} → {} ({} objects)",
        "✓".green().bold(),
        args.remote.bold(),
        branch.yellow(),
        result.new_remote_ref.short_hex().dimmed(),
        result.pushed_objects
    );
    Ok(())
}

async fn cmd_pull(ctx: &Session, args: SyncArgs) -> anyhow::Result<()> {
    let repo = ctx.open()?;
    let branch = repo.current_branch()?;
    let result = repo.pull(&args.remote, args.token).await?;
    if ctx.json {
        return ctx.print_json(&result);
    }
    let outcome = match &result.merge_status {
        MergeStatus::UpToDate => "up to date".green().to_string(),
        MergeStatus::FastForward { from, to } => format!(
            "fast-forward {}..{}",
            from.map(|f| f.short_hex()).unwrap_or_else(|| "(none)".into()),
            to.short_hex()
        ),
    };
    println!(
        "Pulled {}/{}: {} ({} new objects)",
        args.remote.bold(),
        branch.yellow(),
        outcome,
        result.new_objects
    );
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = args.root {
        config.repos_root = Some(root);
    }
    if config.tokens.is_empty() && !config.allow_anonymous_read {
        eprintln!(
            "{} no tokens configured; every request will be refused",
            "warning:".yellow().bold()
        );
    }
    MgitServer::new(config)?.serve().await?;
    Ok(())
}
