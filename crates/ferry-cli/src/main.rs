//! Ferry CLI
//!
//! Secure peer-to-peer file transfer over a trusted overlay network.

mod progress;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ferry_core::{ConnectionString, ReceiverConfig, Sender, SenderConfig};
use ferry_files::lock::LOCK_FILE;
use ferry_overlay::PeerDirectory;

use progress::CliProgress;

/// Ferry - secure file transfer between overlay peers
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send files or directories to a peer
    Send {
        /// Files and directories to send
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Exclude entries matching this glob (repeatable)
        #[arg(long = "exclude", value_name = "GLOB")]
        excludes: Vec<String>,

        /// Compress file data on the wire
        #[arg(long)]
        compress: bool,

        /// Pod mode: bind loopback only, skip overlay verification
        #[arg(long)]
        pod: bool,
    },

    /// Receive files from a peer
    Receive {
        /// Connection string announced by the sender (`ip:word-word`)
        target: String,

        /// Replace existing files instead of writing `name_1.ext`
        #[arg(long)]
        overwrite: bool,

        /// Resume an interrupted transfer without asking
        #[arg(short, long)]
        yes: bool,

        /// Pod mode: connect to loopback only, skip overlay verification
        #[arg(long)]
        pod: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "warn" })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Send {
            paths,
            excludes,
            compress,
            pod,
        } => send(paths, excludes, compress, pod).await,
        Commands::Receive {
            target,
            overwrite,
            yes,
            pod,
        } => receive(target, overwrite, yes, pod).await,
    }
}

async fn send(
    paths: Vec<PathBuf>,
    excludes: Vec<String>,
    compress: bool,
    pod: bool,
) -> anyhow::Result<()> {
    let mut config = SenderConfig::new(paths);
    config.excludes = excludes;
    config.compress = compress;
    config.pod_mode = pod;
    config.working_dir = std::env::current_dir().context("cannot resolve working directory")?;

    let sender = Sender::bind(config).await?;
    let directory = PeerDirectory::new();
    let mut progress = CliProgress::new();

    sender.run(&directory, &mut progress).await?;
    progress.finish("Transfer complete");
    Ok(())
}

async fn receive(target: String, overwrite: bool, yes: bool, pod: bool) -> anyhow::Result<()> {
    let target: ConnectionString = target
        .parse()
        .context("expected a connection string like 100.64.1.123:ocean-tiger")?;

    let mut config = ReceiverConfig::new(target);
    config.overwrite = overwrite;
    config.pod_mode = pod;
    config.dest_dir = std::env::current_dir().context("cannot resolve working directory")?;
    config.resume = yes || confirm_resume(&config.dest_dir);

    let directory = PeerDirectory::new();
    let mut progress = CliProgress::new();

    ferry_core::run_receiver(config, &directory, &mut progress).await?;
    progress.finish("Transfer complete");
    Ok(())
}

/// Ask whether to continue an interrupted transfer. Defaults to yes,
/// and never blocks when there is no lock document or no terminal.
fn confirm_resume(dest_dir: &std::path::Path) -> bool {
    if !dest_dir.join(LOCK_FILE).exists() {
        return true;
    }

    let term = console::Term::stderr();
    if !term.is_term() {
        return true;
    }

    eprint!("Found an interrupted transfer. Resume it? [Y/n] ");
    match term.read_line() {
        Ok(line) => !matches!(line.trim(), "n" | "N" | "no"),
        Err(_) => true,
    }
}
