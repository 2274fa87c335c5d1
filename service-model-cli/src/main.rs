use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

/// smodel - inspect service-model configurations and relation directives
#[derive(Parser)]
#[command(name = "smodel")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured models
    Models {
        /// Config file (defaults to the standard search path)
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Resolve a directive file into the query state it produces
    Explain {
        /// Model name from the [models] section
        #[arg(short, long, value_name = "NAME")]
        model: String,

        /// JSON object of directives, e.g. {"pushWhere": ["status", "active"]}
        #[arg(short, long, value_name = "FILE")]
        directives: PathBuf,

        /// Config file (defaults to the standard search path)
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Models { config } => commands::models::execute(config.as_deref()).await,
        Commands::Explain {
            model,
            directives,
            config,
        } => commands::explain::execute(&model, &directives, config.as_deref()).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            if let Some(source) = e.source() {
                eprintln!("\n{} {}", "Caused by:".yellow(), source);
            }

            std::process::exit(1);
        }
    }
}
