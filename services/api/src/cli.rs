use crate::commands::{run_evaluate, run_recalculate, EvaluateArgs, RecalculateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use fuel_rewards::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Fuel Rewards Commission Service",
    about = "Serve, evaluate, and recalculate fuel loyalty commissions from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Evaluate commission and cashback for a single sale
    Evaluate(EvaluateArgs),
    /// Recompute commission for historical sales exported as CSV
    Recalculate(RecalculateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Evaluate(args) => run_evaluate(args),
        Command::Recalculate(args) => run_recalculate(args).await,
    }
}
