use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the test suite (no hardware needed)
    Test,
    /// Run the CLI, passing the remaining arguments through
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    println!("{}...", what);
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => cargo(&["build", "--workspace"], "Building project"),
        Commands::Test => cargo(&["test", "--workspace"], "Testing project"),
        Commands::Run { args } => {
            let mut cmd = vec!["run", "-p", "ccgx-cli", "--"];
            cmd.extend(args.iter().map(String::as_str));
            cargo(&cmd, "Running CLI")
        }
    }
}
