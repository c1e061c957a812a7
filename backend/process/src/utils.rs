use std::fmt::Write;

use server::database::{Tally, TallyMismatch};

pub fn format_tally(tallies: &[Tally]) -> String {
    let width = tallies
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(0)
        .max("Candidate".len());

    let mut out = format!("{:>4}  {:<width$}  {:>6}\n", "#", "Candidate", "Votes");

    for (rank, tally) in tallies.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {:<width$}  {:>6}",
            rank + 1,
            tally.name,
            tally.votes
        );
    }

    out
}

pub fn format_mismatches(mismatches: &[TallyMismatch]) -> String {
    let mut out = String::new();

    for mismatch in mismatches {
        let _ = writeln!(
            out,
            "candidate {}: counter {} but {} record(s)",
            mismatch.candidate_id, mismatch.votes, mismatch.records
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(candidate_id: i64, name: &str, votes: i64) -> Tally {
        Tally {
            candidate_id,
            name: name.into(),
            votes,
        }
    }

    #[test]
    fn test_tally_table() {
        let table = format_tally(&[tally(2, "Grace Hopper", 12), tally(1, "Ada", 3)]);

        let expected = [
            "   #  Candidate      Votes",
            "   1  Grace Hopper      12",
            "   2  Ada                3",
        ];

        assert_eq!(table.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_empty_tally() {
        assert_eq!(format_tally(&[]), "   #  Candidate   Votes\n");
    }

    #[test]
    fn test_mismatches() {
        let text = format_mismatches(&[TallyMismatch {
            candidate_id: 4,
            votes: 7,
            records: 6,
        }]);

        assert_eq!(text, "candidate 4: counter 7 but 6 record(s)\n");
    }
}
