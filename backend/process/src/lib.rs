//! # Election Administration
//!
//! Offline tasks against the portal database.
//!
//! ## Seeding
//! 1. Read the registry JSON (elections, departments, positions, candidates,
//!    roll) and validate its references.
//!
//! 2. Upsert everything in one transaction. Candidates keep their counters, so
//!    re-seeding during an election only renames or adds.
//!
//! 3. Roll keys are normalized the same way the server normalizes
//!    `X-Voter-Id`; entries with nothing left are skipped and counted.
//!
//! ## Purging
//! - Removes the records and submission markers of every position in the
//!   election, zeroes the counters, then drops the cached tallies in Redis
//! - Without Redis the cached tallies simply expire (`CACHE_TTL_SECS`)
//!
//! ## Auditing
//! - Every candidate counter must equal the number of its vote records
use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use registry::{
    get_registry,
    types::{ElectionId, ElectionStatus, PositionId},
};
use server::{config::Config, database::Store, state::redis_ledger};

pub mod utils;

use utils::{format_mismatches, format_tally};

fn open_store(database: &str) -> anyhow::Result<Store> {
    Store::open(database).with_context(|| format!("failed to open {database}"))
}

pub fn seed(database: &str, registry_path: &str) -> anyhow::Result<()> {
    let registry = get_registry(registry_path)?;
    let store = open_store(database)?;

    println!("Loaded Elections: {}", registry.elections.len());
    println!("Loaded Positions: {}", registry.positions.len());
    println!("Loaded Candidates: {}\n", registry.candidates.len());

    let pb = ProgressBar::new(registry.voters.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );
    pb.set_message("Importing roll");

    let summary = store.import_registry(&registry, || pb.inc(1))?;

    pb.finish_with_message("Done");

    println!("\nVoters: {}", summary.voters);
    if summary.skipped_voters > 0 {
        println!("Skipped Voters (empty key): {}", summary.skipped_voters);
    }

    Ok(())
}

pub fn set_status(
    database: &str,
    election: ElectionId,
    status: ElectionStatus,
) -> anyhow::Result<()> {
    let store = open_store(database)?;

    if !store.set_election_status(election, status)? {
        bail!("election {election} not found");
    }

    println!("Election {election} is now {status}");
    Ok(())
}

pub async fn purge(database: &str, election: ElectionId) -> anyhow::Result<()> {
    let config = Config {
        database_path: database.to_string(),
        ..Config::load()?
    };

    let purge = match redis_ledger(&config).await {
        Ok(ledger) => ledger.purge_election(election).await?,
        Err(e) => {
            println!("Redis unavailable ({e:#}), cached tallies will expire on their own");
            open_store(database)?.purge_election(election)?
        }
    };

    println!(
        "Purged {} vote record(s) across {} candidate(s)",
        purge.records,
        purge.candidates.len()
    );
    Ok(())
}

pub fn tally(database: &str, position: PositionId) -> anyhow::Result<()> {
    let store = open_store(database)?;

    let Some(record) = store.position(position)? else {
        bail!("position {position} not found");
    };

    println!(
        "{} ({}, election {}, {})\n",
        record.position.title,
        record.position.department,
        record.position.election_id,
        record.election_status
    );
    print!("{}", format_tally(&store.list_candidates(position)?));

    Ok(())
}

pub fn audit(database: &str) -> anyhow::Result<()> {
    let mismatches = open_store(database)?.audit()?;

    if mismatches.is_empty() {
        println!("All counters match their vote records.");
        return Ok(());
    }

    print!("{}", format_mismatches(&mismatches));
    bail!("{} candidate counter(s) out of sync", mismatches.len())
}
