pub mod apply;

use anyhow::Result;
use clap::Subcommand;

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Apply a patch to files and/or to the index
    Apply(apply::ApplyArgs),
}

impl Commands {
    /// Get the command name as used in config keys (e.g., "apply").
    pub fn command_name(&self) -> &str {
        match self {
            Commands::Apply(_) => "apply",
        }
    }
}

/// Open a repository, respecting --git-dir override.
pub fn open_repo(cli: &Cli) -> Result<git_repository::Repository> {
    let repo = if let Some(ref git_dir) = cli.git_dir {
        git_repository::Repository::open(git_dir)?
    } else {
        git_repository::Repository::discover(".")?
    };
    Ok(repo)
}

pub fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Apply(args) => apply::run(args, &cli),
    }
}
