use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use registry::types::{ElectionId, ElectionStatus, PositionId};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// SQLite database, defaults to `DATABASE_PATH` or `portal.db`
    #[arg(long, env = "DATABASE_PATH", default_value = server::config::DEFAULT_DATABASE_PATH)]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import elections, positions, candidates and the roll from a JSON file
    Seed { registry: String },

    /// Open or close an election
    Status {
        election: ElectionId,
        status: Status,
    },

    /// Delete every vote of an election cycle and zero its counters
    Purge { election: ElectionId },

    /// Print the candidates of a position, most votes first
    Tally { position: PositionId },

    /// List candidates whose counter differs from their vote records
    Audit,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Status {
    Open,
    Closed,
}

impl From<Status> for ElectionStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Open => ElectionStatus::Open,
            Status::Closed => ElectionStatus::Closed,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let result = match args.command {
        Command::Seed { registry } => process::seed(&args.database, &registry),
        Command::Status { election, status } => {
            process::set_status(&args.database, election, status.into())
        }
        Command::Purge { election } => process::purge(&args.database, election).await,
        Command::Tally { position } => process::tally(&args.database, position),
        Command::Audit => process::audit(&args.database),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
