use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Workspace tasks for the badge tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every workspace member
    Build,
    /// Run the library and CLI tests
    Test,
    /// Run the badge CLI, forwarding the remaining arguments
    Badge {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn cargo(args: &[&str]) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        bail!("cargo {} failed", args.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building workspace...");
            cargo(&["build", "--workspace"])
        }
        Commands::Test => {
            println!("Testing badge-core and badge-cli...");
            cargo(&["test", "-p", "badge-core", "-p", "badge-cli"])
        }
        Commands::Badge { args } => {
            let mut full = vec!["run", "-p", "badge-cli", "--"];
            full.extend(args.iter().map(String::as_str));
            cargo(&full)
        }
    }
}
