use crate::demo::{run_demo, run_extract, run_rules, DemoArgs, ExtractArgs, RulesArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use timesheet_pipeline::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Timesheet Pipeline",
    about = "Run and demonstrate county-scoped timesheet extraction with field masking",
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
    /// Run one synchronous extraction as a given role and print the result
    Extract(ExtractArgs),
    /// Show the baseline access pattern and effective masking rules for a role
    Rules(RulesArgs),
    /// Queue report jobs for several roles and walk them through the worker
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Timesheet CSV export to serve instead of synthetic data
    #[arg(long)]
    pub(crate) seed_csv: Option<PathBuf>,
    /// Override the configured number of report workers
    #[arg(long)]
    pub(crate) workers: Option<usize>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Extract(args) => run_extract(args).await,
        Command::Rules(args) => run_rules(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
