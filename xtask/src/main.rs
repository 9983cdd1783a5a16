//! Build automation for the ora-driver workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

const CRATES: &[&str] = &[
    "ora-protocol",
    "ora-auth",
    "ora-client",
    "ora-driver-pool",
    "ora-testing",
];

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for ora-driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run format check, clippy and tests
    Ci,
    /// Run cargo fmt --check
    Fmt,
    /// Run clippy on every target
    Clippy,
    /// Run tests, optionally for a single crate
    Test {
        /// Workspace crate to test
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Run the pool and connection integration tests repeatedly
    Soak {
        /// Number of rounds
        #[arg(short, long, default_value_t = 20)]
        rounds: u32,
    },
    /// Generate documentation
    Doc,
    /// Clean build artifacts
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh)?;
            clippy(&sh)?;
            test(&sh, None)?;
            println!("All CI checks passed!");
        }
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test { package } => test(&sh, package.as_deref())?,
        Command::Soak { rounds } => soak(&sh, rounds)?,
        Command::Doc => doc(&sh)?,
        Command::Clean => clean(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout).context("invalid UTF-8 in cargo output")?;
    Ok(PathBuf::from(path.trim())
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell) -> Result<()> {
    println!("Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("Running clippy...");
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>) -> Result<()> {
    match package {
        Some(name) => {
            if !CRATES.contains(&name) {
                bail!("unknown crate {name}, expected one of: {}", CRATES.join(", "));
            }
            println!("Running tests for {name}...");
            cmd!(sh, "cargo test -p {name}").run()?;
        }
        None => {
            println!("Running tests...");
            cmd!(sh, "cargo test --workspace").run()?;
        }
    }
    println!("All tests passed.");
    Ok(())
}

/// The pool tests lean on background tasks and timers; repeating them
/// surfaces ordering bugs a single run misses.
fn soak(sh: &Shell, rounds: u32) -> Result<()> {
    for round in 1..=rounds {
        println!("Soak round {round}/{rounds}");
        cmd!(sh, "cargo test -q -p ora-driver-pool --test pool").run()?;
        cmd!(sh, "cargo test -q -p ora-testing --test connection").run()?;
    }
    println!("Soak passed.");
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    println!("Generating documentation...");
    cmd!(sh, "cargo doc --workspace --no-deps").run()?;
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    Ok(())
}
