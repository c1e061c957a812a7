//! # SQLite + Redis
//!
//! SQLite is the durable store: elections, positions, candidates with their
//! vote counters, the eligibility roll and every vote record.
//!
//! Redis is the shared RAM side: candidate locks, the fast tally cache and the
//! `vote.casted` channel. Nothing in Redis is authoritative.
//!
//! ## Requirements
//!
//! - One vote submission per voter per position, enforced by a primary key
//!   on `ballot_submissions`, not only by the pre-check
//! - Counter and records change together or not at all
//! - Decently small dataset: a few thousand students, tens of positions
//!
//! ## Implementation
//!
//! - One generic schema; departments are a column, not a table family
//! - `candidates.votes` is the denormalized counter read by the tally page
//! - `vote_records` keeps one row per picked candidate, unique per
//!   `(voter_key, candidate_id)`
//! - A single connection behind a mutex, callers use the blocking pool
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::Utc;
use redis::{
    Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use registry::{
    normalize_voter_key,
    types::{
        Candidate, CandidateId, ElectionId, ElectionStatus, Position, PositionId, Registry,
        SelectionRule,
    },
};
use rusqlite::{Connection, OptionalExtension, Transaction, ffi, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::VoteError;

pub async fn init_redis(redis_url: &str) -> redis::RedisResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    client.get_connection_manager_with_config(config).await
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS elections (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed'))
    );

    CREATE TABLE IF NOT EXISTS departments (
        code TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS positions (
        id INTEGER PRIMARY KEY,
        election_id INTEGER NOT NULL REFERENCES elections(id),
        department TEXT NOT NULL REFERENCES departments(code),
        title TEXT NOT NULL,
        max_selections INTEGER NOT NULL CHECK (max_selections >= 1)
    );

    CREATE TABLE IF NOT EXISTS candidates (
        id INTEGER PRIMARY KEY,
        position_id INTEGER NOT NULL REFERENCES positions(id),
        name TEXT NOT NULL,
        votes INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_candidates_position ON candidates(position_id, votes);

    CREATE TABLE IF NOT EXISTS voters (
        key TEXT PRIMARY KEY,
        department TEXT NOT NULL REFERENCES departments(code)
    );

    CREATE TABLE IF NOT EXISTS ballot_submissions (
        voter_key TEXT NOT NULL,
        position_id INTEGER NOT NULL REFERENCES positions(id),
        cast_at TEXT NOT NULL,
        PRIMARY KEY (voter_key, position_id)
    );

    CREATE TABLE IF NOT EXISTS vote_records (
        id INTEGER PRIMARY KEY,
        voter_key TEXT NOT NULL,
        candidate_id INTEGER NOT NULL REFERENCES candidates(id),
        position_id INTEGER NOT NULL REFERENCES positions(id),
        cast_at TEXT NOT NULL,
        UNIQUE (voter_key, candidate_id)
    );

    CREATE INDEX IF NOT EXISTS idx_vote_records_voter_position
        ON vote_records(voter_key, position_id);
    CREATE INDEX IF NOT EXISTS idx_vote_records_candidate ON vote_records(candidate_id);
";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tally {
    pub candidate_id: CandidateId,
    pub name: String,
    pub votes: i64,
}

/// A candidate whose counter disagrees with its vote records.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TallyMismatch {
    pub candidate_id: CandidateId,
    pub votes: i64,
    pub records: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub elections: usize,
    pub departments: usize,
    pub positions: usize,
    pub candidates: usize,
    pub voters: usize,
    pub skipped_voters: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Purge {
    pub records: usize,
    pub candidates: Vec<CandidateId>,
}

/// Position plus the status of the election it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub position: Position,
    pub election_status: ElectionStatus,
}

#[derive(Clone, Debug)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VoteError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, VoteError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, VoteError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(SCHEMA)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, VoteError> {
        self.conn
            .lock()
            .map_err(|_| VoteError::PersistenceFailure("connection mutex poisoned".into()))
    }

    pub fn position(&self, position_id: PositionId) -> Result<Option<PositionRecord>, VoteError> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT p.id, p.election_id, p.department, p.title, p.max_selections, e.status
                 FROM positions p JOIN elections e ON e.id = p.election_id
                 WHERE p.id = ?1",
                params![position_id],
                |row| {
                    let status: String = row.get(5)?;

                    Ok(PositionRecord {
                        position: Position {
                            id: row.get(0)?,
                            election_id: row.get(1)?,
                            department: row.get(2)?,
                            title: row.get(3)?,
                            rule: SelectionRule::from_max_selections(row.get(4)?),
                        },
                        election_status: ElectionStatus::parse(&status)
                            .unwrap_or(ElectionStatus::Closed),
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    pub fn is_eligible(&self, voter: &str, department: &str) -> Result<bool, VoteError> {
        let conn = self.conn()?;

        let found = conn
            .query_row(
                "SELECT 1 FROM voters WHERE key = ?1 AND department = ?2",
                params![voter, department],
                |_| Ok(()),
            )
            .optional()?;

        Ok(found.is_some())
    }

    /// Fast-path check only; [`Store::record_ballot`] is what actually rejects
    /// a second submission.
    pub fn has_voted(&self, voter: &str, position_id: PositionId) -> Result<bool, VoteError> {
        let conn = self.conn()?;

        let found = conn
            .query_row(
                "SELECT 1 FROM ballot_submissions WHERE voter_key = ?1 AND position_id = ?2",
                params![voter, position_id],
                |_| Ok(()),
            )
            .optional()?;

        Ok(found.is_some())
    }

    pub fn candidates_for(&self, position_id: PositionId) -> Result<Vec<Candidate>, VoteError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, position_id, name FROM candidates WHERE position_id = ?1 ORDER BY id",
        )?;
        let candidates = stmt
            .query_map(params![position_id], |row| {
                Ok(Candidate {
                    id: row.get(0)?,
                    position_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(candidates)
    }

    /// Writes one submission: the per-position marker, one counter increment
    /// and one record per candidate, all in a single transaction.
    ///
    /// Returns the updated counter of every candidate, in input order.
    pub fn record_ballot(
        &self,
        voter: &str,
        position_id: PositionId,
        candidates: &[CandidateId],
    ) -> Result<Vec<(CandidateId, i64)>, VoteError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let cast_at = Utc::now().to_rfc3339();

        let already_voted = || VoteError::AlreadyVoted {
            voter: voter.to_string(),
            position: position_id,
        };

        // Re-read under the transaction: the election may have closed since
        // the ledger's pre-check.
        let (election_id, max_selections, status) = tx
            .query_row(
                "SELECT p.election_id, p.max_selections, e.status
                 FROM positions p JOIN elections e ON e.id = p.election_id
                 WHERE p.id = ?1",
                params![position_id],
                |row| {
                    Ok((
                        row.get::<_, ElectionId>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or(VoteError::PositionNotFound(position_id))?;

        if ElectionStatus::parse(&status) != Some(ElectionStatus::Open) {
            return Err(VoteError::ElectionClosed(election_id));
        }

        if candidates.len() as i64 > max_selections {
            return Err(VoteError::Validation(format!(
                "position {position_id} allows at most {max_selections} selection(s), got {}",
                candidates.len()
            )));
        }

        tx.execute(
            "INSERT INTO ballot_submissions (voter_key, position_id, cast_at) VALUES (?1, ?2, ?3)",
            params![voter, position_id, cast_at],
        )
        .map_err(|e| if is_unique_violation(&e) { already_voted() } else { e.into() })?;

        let mut counts = Vec::with_capacity(candidates.len());

        for &candidate in candidates {
            let votes = increment_candidate(&tx, candidate, position_id)?.ok_or(
                VoteError::CandidateNotFound {
                    candidate,
                    position: position_id,
                },
            )?;

            tx.execute(
                "INSERT INTO vote_records (voter_key, candidate_id, position_id, cast_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![voter, candidate, position_id, cast_at],
            )
            .map_err(|e| if is_unique_violation(&e) { already_voted() } else { e.into() })?;

            counts.push((candidate, votes));
        }

        tx.commit()?;

        debug!("Recorded {} vote(s) for {voter} on position {position_id}", counts.len());
        Ok(counts)
    }

    /// Candidates of a position, most votes first.
    pub fn list_candidates(&self, position_id: PositionId) -> Result<Vec<Tally>, VoteError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, name, votes FROM candidates WHERE position_id = ?1
             ORDER BY votes DESC, id ASC",
        )?;
        let tallies = stmt
            .query_map(params![position_id], |row| {
                Ok(Tally {
                    candidate_id: row.get(0)?,
                    name: row.get(1)?,
                    votes: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tallies)
    }

    pub fn candidate_votes(&self, candidate: CandidateId) -> Result<Option<i64>, VoteError> {
        let conn = self.conn()?;

        let votes = conn
            .query_row(
                "SELECT votes FROM candidates WHERE id = ?1",
                params![candidate],
                |row| row.get(0),
            )
            .optional()?;

        Ok(votes)
    }

    pub fn vote_record_count(&self, candidate: CandidateId) -> Result<i64, VoteError> {
        let conn = self.conn()?;

        let count = conn.query_row(
            "SELECT COUNT(*) FROM vote_records WHERE candidate_id = ?1",
            params![candidate],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    pub fn records_for(&self, voter: &str, position_id: PositionId) -> Result<i64, VoteError> {
        let conn = self.conn()?;

        let count = conn.query_row(
            "SELECT COUNT(*) FROM vote_records WHERE voter_key = ?1 AND position_id = ?2",
            params![voter, position_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// Every candidate whose counter differs from its number of vote records.
    pub fn audit(&self) -> Result<Vec<TallyMismatch>, VoteError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT c.id, c.votes, COUNT(r.id) AS records
             FROM candidates c LEFT JOIN vote_records r ON r.candidate_id = c.id
             GROUP BY c.id, c.votes
             HAVING c.votes != records
             ORDER BY c.id",
        )?;
        let mismatches = stmt
            .query_map([], |row| {
                Ok(TallyMismatch {
                    candidate_id: row.get(0)?,
                    votes: row.get(1)?,
                    records: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(mismatches)
    }

    /// Upserts the registry. Counters of existing candidates are left alone.
    pub fn import_registry(
        &self,
        registry: &Registry,
        mut on_voter: impl FnMut(),
    ) -> Result<ImportSummary, VoteError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut summary = ImportSummary::default();

        for election in &registry.elections {
            tx.execute(
                "INSERT INTO elections (id, name, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, status = excluded.status",
                params![election.id, election.name, election.status.as_str()],
            )?;
            summary.elections += 1;
        }

        for department in &registry.departments {
            tx.execute(
                "INSERT INTO departments (code, name) VALUES (?1, ?2)
                 ON CONFLICT(code) DO UPDATE SET name = excluded.name",
                params![department.code, department.name],
            )?;
            summary.departments += 1;
        }

        for position in &registry.positions {
            tx.execute(
                "INSERT INTO positions (id, election_id, department, title, max_selections)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET election_id = excluded.election_id,
                     department = excluded.department, title = excluded.title,
                     max_selections = excluded.max_selections",
                params![
                    position.id,
                    position.election_id,
                    position.department,
                    position.title,
                    position.rule.max_selections() as i64,
                ],
            )?;
            summary.positions += 1;
        }

        for candidate in &registry.candidates {
            tx.execute(
                "INSERT INTO candidates (id, position_id, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET position_id = excluded.position_id,
                     name = excluded.name",
                params![candidate.id, candidate.position_id, candidate.name],
            )?;
            summary.candidates += 1;
        }

        for voter in &registry.voters {
            let key = normalize_voter_key(&voter.key);

            if key.is_empty() {
                summary.skipped_voters += 1;
            } else {
                tx.execute(
                    "INSERT INTO voters (key, department) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET department = excluded.department",
                    params![key, voter.department],
                )?;
                summary.voters += 1;
            }

            on_voter();
        }

        tx.commit()?;

        info!("Imported registry: {summary:?}");
        Ok(summary)
    }

    /// Returns `false` when the election does not exist.
    pub fn set_election_status(
        &self,
        election_id: ElectionId,
        status: ElectionStatus,
    ) -> Result<bool, VoteError> {
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE elections SET status = ?1 WHERE id = ?2",
            params![status.as_str(), election_id],
        )?;

        Ok(updated > 0)
    }

    /// Drops every vote of an election cycle and zeroes its counters.
    pub fn purge_election(&self, election_id: ElectionId) -> Result<Purge, VoteError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let candidates = {
            let mut stmt = tx.prepare(
                "SELECT c.id FROM candidates c JOIN positions p ON p.id = c.position_id
                 WHERE p.election_id = ?1 ORDER BY c.id",
            )?;
            stmt.query_map(params![election_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<CandidateId>>>()?
        };

        let records = tx.execute(
            "DELETE FROM vote_records
             WHERE position_id IN (SELECT id FROM positions WHERE election_id = ?1)",
            params![election_id],
        )?;
        tx.execute(
            "DELETE FROM ballot_submissions
             WHERE position_id IN (SELECT id FROM positions WHERE election_id = ?1)",
            params![election_id],
        )?;
        tx.execute(
            "UPDATE candidates SET votes = 0
             WHERE position_id IN (SELECT id FROM positions WHERE election_id = ?1)",
            params![election_id],
        )?;

        tx.commit()?;

        info!("Purged {records} vote record(s) from election {election_id}");
        Ok(Purge {
            records,
            candidates,
        })
    }
}

fn increment_candidate(
    tx: &Transaction<'_>,
    candidate: CandidateId,
    position_id: PositionId,
) -> rusqlite::Result<Option<i64>> {
    tx.query_row(
        "UPDATE candidates SET votes = votes + 1 WHERE id = ?1 AND position_id = ?2
         RETURNING votes",
        params![candidate, position_id],
        |row| row.get(0),
    )
    .optional()
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use registry::types::{Department, Election, RollEntry};

    use super::*;

    pub(crate) const GOVERNOR: PositionId = 10;
    pub(crate) const BOARD: PositionId = 11;

    /// One open election, BSCS and BSA departments, a single-select governor
    /// race (candidates 100, 101) and a pick-two board race (200..=202).
    pub(crate) fn seed_registry() -> Registry {
        let department = |code: &str| Department {
            code: code.into(),
            name: code.into(),
        };
        let candidate = |id, position_id| Candidate {
            id,
            position_id,
            name: format!("Candidate {id}"),
        };

        Registry {
            elections: vec![Election {
                id: 1,
                name: "Student Council".into(),
                status: ElectionStatus::Open,
            }],
            departments: vec![department("BSCS"), department("BSA")],
            positions: vec![
                Position {
                    id: GOVERNOR,
                    election_id: 1,
                    department: "BSCS".into(),
                    title: "Governor".into(),
                    rule: SelectionRule::Single,
                },
                Position {
                    id: BOARD,
                    election_id: 1,
                    department: "BSCS".into(),
                    title: "Board Member".into(),
                    rule: SelectionRule::Multi { max: 2 },
                },
            ],
            candidates: vec![
                candidate(100, GOVERNOR),
                candidate(101, GOVERNOR),
                candidate(200, BOARD),
                candidate(201, BOARD),
                candidate(202, BOARD),
            ],
            voters: (0..60)
                .map(|i| RollEntry {
                    key: format!("cs-{i}"),
                    department: "BSCS".into(),
                })
                .chain([RollEntry {
                    key: "ba-1".into(),
                    department: "BSA".into(),
                }])
                .collect(),
        }
    }

    pub(crate) fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.import_registry(&seed_registry(), || {}).unwrap();
        store
    }

    #[test]
    fn import_normalizes_voter_keys() {
        let store = Store::open_in_memory().unwrap();
        let mut seen = 0;

        let summary = store.import_registry(&seed_registry(), || seen += 1).unwrap();

        assert_eq!(summary.voters, 61);
        assert_eq!(seen, 61);
        assert!(store.is_eligible("CS-7", "BSCS").unwrap());
        assert!(!store.is_eligible("cs-7", "BSCS").unwrap());
        assert!(!store.is_eligible("CS-7", "BSA").unwrap());
    }

    #[test]
    fn position_reads_rule_and_status() {
        let store = seeded_store();

        let board = store.position(BOARD).unwrap().unwrap();
        assert_eq!(board.position.rule, SelectionRule::Multi { max: 2 });
        assert_eq!(board.election_status, ElectionStatus::Open);

        assert!(store.set_election_status(1, ElectionStatus::Closed).unwrap());
        let board = store.position(BOARD).unwrap().unwrap();
        assert_eq!(board.election_status, ElectionStatus::Closed);

        assert!(!store.set_election_status(9, ElectionStatus::Closed).unwrap());
        assert!(store.position(99).unwrap().is_none());
    }

    #[test]
    fn record_ballot_increments_and_records() {
        let store = seeded_store();

        let counts = store.record_ballot("CS-1", BOARD, &[200, 202]).unwrap();

        assert_eq!(counts, vec![(200, 1), (202, 1)]);
        assert!(store.has_voted("CS-1", BOARD).unwrap());
        assert!(!store.has_voted("CS-1", GOVERNOR).unwrap());
        assert_eq!(store.records_for("CS-1", BOARD).unwrap(), 2);
        assert!(store.audit().unwrap().is_empty());
    }

    #[test]
    fn second_submission_hits_the_constraint() {
        let store = seeded_store();

        store.record_ballot("CS-1", GOVERNOR, &[100]).unwrap();
        let err = store.record_ballot("CS-1", GOVERNOR, &[101]).unwrap_err();

        assert!(matches!(err, VoteError::AlreadyVoted { position: GOVERNOR, .. }));
        assert_eq!(store.candidate_votes(100).unwrap(), Some(1));
        assert_eq!(store.candidate_votes(101).unwrap(), Some(0));
        assert_eq!(store.vote_record_count(101).unwrap(), 0);
    }

    #[test]
    fn failed_candidate_rolls_back_the_whole_ballot() {
        let store = seeded_store();

        // 100 runs for governor, not for the board
        let err = store.record_ballot("CS-1", BOARD, &[200, 100]).unwrap_err();

        assert!(matches!(
            err,
            VoteError::CandidateNotFound {
                candidate: 100,
                position: BOARD
            }
        ));
        assert_eq!(store.candidate_votes(200).unwrap(), Some(0));
        assert_eq!(store.vote_record_count(200).unwrap(), 0);
        assert!(!store.has_voted("CS-1", BOARD).unwrap());
    }

    #[test]
    fn record_ballot_rechecks_status_and_limit() {
        let store = seeded_store();

        let err = store
            .record_ballot("CS-1", BOARD, &[200, 201, 202])
            .unwrap_err();
        assert!(matches!(err, VoteError::Validation(_)));

        store.set_election_status(1, ElectionStatus::Closed).unwrap();
        let err = store.record_ballot("CS-1", GOVERNOR, &[100]).unwrap_err();
        assert!(matches!(err, VoteError::ElectionClosed(1)));

        let err = store.record_ballot("CS-1", 99, &[100]).unwrap_err();
        assert!(matches!(err, VoteError::PositionNotFound(99)));

        assert!(!store.has_voted("CS-1", GOVERNOR).unwrap());
        assert!(!store.has_voted("CS-1", BOARD).unwrap());
        assert!(store.audit().unwrap().is_empty());
    }

    #[test]
    fn list_candidates_orders_by_votes() {
        let store = seeded_store();

        store.record_ballot("CS-1", BOARD, &[201]).unwrap();
        store.record_ballot("CS-2", BOARD, &[201, 202]).unwrap();

        let tallies = store.list_candidates(BOARD).unwrap();
        let order: Vec<_> = tallies.iter().map(|t| (t.candidate_id, t.votes)).collect();

        assert_eq!(order, vec![(201, 2), (202, 1), (200, 0)]);
    }

    #[test]
    fn purge_clears_the_cycle() {
        let store = seeded_store();

        store.record_ballot("CS-1", GOVERNOR, &[100]).unwrap();
        store.record_ballot("CS-1", BOARD, &[200, 201]).unwrap();

        let purge = store.purge_election(1).unwrap();

        assert_eq!(purge.records, 3);
        assert_eq!(purge.candidates, vec![100, 101, 200, 201, 202]);
        assert_eq!(store.candidate_votes(100).unwrap(), Some(0));
        assert!(!store.has_voted("CS-1", GOVERNOR).unwrap());
        assert!(store.audit().unwrap().is_empty());

        store.record_ballot("CS-1", GOVERNOR, &[101]).unwrap();
    }

    #[test]
    fn audit_reports_drift() {
        let store = seeded_store();

        store.record_ballot("CS-1", GOVERNOR, &[100]).unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE candidates SET votes = 5 WHERE id = 100", [])
            .unwrap();

        assert_eq!(
            store.audit().unwrap(),
            vec![TallyMismatch {
                candidate_id: 100,
                votes: 5,
                records: 1
            }]
        );
    }

    #[test]
    fn reimport_keeps_counters() {
        let store = seeded_store();

        store.record_ballot("CS-1", GOVERNOR, &[100]).unwrap();
        store.import_registry(&seed_registry(), || {}).unwrap();

        assert_eq!(store.candidate_votes(100).unwrap(), Some(1));
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.db");

        {
            let store = Store::open(&path).unwrap();
            store.import_registry(&seed_registry(), || {}).unwrap();
            store.record_ballot("CS-1", GOVERNOR, &[101]).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.candidate_votes(101).unwrap(), Some(1));
    }
}
