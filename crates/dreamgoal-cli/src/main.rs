use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

#[derive(Parser)]
#[command(name = "dreamgoal", version, about = "Dreamgoal CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dream management
    Dream {
        #[command(subcommand)]
        action: commands::dream::DreamAction,
    },
    /// Goal lifecycle and progress
    Goal {
        #[command(subcommand)]
        action: commands::goal::GoalAction,
    },
    /// Current-week instances
    Week {
        #[command(subcommand)]
        action: commands::week::WeekAction,
    },
    /// Scoring totals and entries
    Score {
        #[command(subcommand)]
        action: commands::score::ScoreAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Dream { action } => commands::dream::run(action).await,
        Commands::Goal { action } => commands::goal::run(action).await,
        Commands::Week { action } => commands::week::run(action).await,
        Commands::Score { action } => commands::score::run(action).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
