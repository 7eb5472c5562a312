use clap::{Parser, Subcommand};

use bastion_cli::commands;

/// Bastion -- infrastructure template audit engine.
#[derive(Parser)]
#[command(name = "bastion", about = "Bastion -- infrastructure template audit engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a template file or a directory of templates.
    Scan(commands::scan::ScanArgs),
    /// List the loaded audit rules.
    Rules(commands::rules::RulesArgs),
    /// Show or validate Bastion configuration.
    Config(commands::config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan(args) => commands::scan::execute(args),
        Commands::Rules(args) => commands::rules::execute(args),
        Commands::Config(args) => commands::config::execute(args),
    };

    match result {
        Ok(code) => bastion_cli::terminate(code),
        Err(err) => {
            eprintln!("bastion: error: {err:#}");
            bastion_cli::terminate(bastion_cli::ExitCode::EngineError)
        }
    }
}
