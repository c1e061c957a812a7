use std::{collections::HashSet, fmt};

use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};

pub type ElectionId = i64;
pub type PositionId = i64;
pub type CandidateId = i64;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    Open,
    Closed,
}

impl ElectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionStatus::Open => "open",
            ElectionStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(ElectionStatus::Open),
            "closed" => Some(ElectionStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many candidates a voter picks on one position.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionRule {
    Single,
    Multi { max: u32 },
}

impl SelectionRule {
    pub fn max_selections(&self) -> usize {
        match self {
            SelectionRule::Single => 1,
            SelectionRule::Multi { max } => *max as usize,
        }
    }

    /// Inverse of [`SelectionRule::max_selections`], as stored in the database.
    pub fn from_max_selections(max: u32) -> Self {
        if max <= 1 {
            SelectionRule::Single
        } else {
            SelectionRule::Multi { max }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Election {
    pub id: ElectionId,
    pub name: String,
    pub status: ElectionStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Department {
    pub code: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Position {
    pub id: PositionId,
    pub election_id: ElectionId,
    pub department: String,
    pub title: String,
    pub rule: SelectionRule,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub id: CandidateId,
    pub position_id: PositionId,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RollEntry {
    pub key: String,
    pub department: String,
}

/// Seed file for one or more election cycles. Every department shares the
/// same position/candidate layout, parameterized by department code.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Registry {
    #[serde(default)]
    pub elections: Vec<Election>,
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub voters: Vec<RollEntry>,
}

impl Registry {
    pub fn validate(&self) -> anyhow::Result<()> {
        let elections: HashSet<_> = self.elections.iter().map(|e| e.id).collect();
        let departments: HashSet<_> = self.departments.iter().map(|d| d.code.as_str()).collect();
        let positions: HashSet<_> = self.positions.iter().map(|p| p.id).collect();

        for position in &self.positions {
            ensure!(
                elections.contains(&position.election_id),
                "position {} references unknown election {}",
                position.id,
                position.election_id
            );
            ensure!(
                departments.contains(position.department.as_str()),
                "position {} references unknown department {}",
                position.id,
                position.department
            );
            if let SelectionRule::Multi { max: 0 } = position.rule {
                bail!("position {} allows zero selections", position.id);
            }
        }

        for candidate in &self.candidates {
            ensure!(
                positions.contains(&candidate.position_id),
                "candidate {} references unknown position {}",
                candidate.id,
                candidate.position_id
            );
        }

        for voter in &self.voters {
            ensure!(
                departments.contains(voter.department.as_str()),
                "voter {} references unknown department {}",
                voter.key,
                voter.department
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_rule_round_trips_through_max() {
        assert_eq!(SelectionRule::from_max_selections(1), SelectionRule::Single);
        assert_eq!(
            SelectionRule::from_max_selections(3),
            SelectionRule::Multi { max: 3 }
        );
        assert_eq!(SelectionRule::Multi { max: 3 }.max_selections(), 3);
    }

    #[test]
    fn multi_with_zero_max_is_rejected() {
        let registry = Registry {
            elections: vec![Election {
                id: 1,
                name: "Council".into(),
                status: ElectionStatus::Open,
            }],
            departments: vec![Department {
                code: "BSA".into(),
                name: "Accountancy".into(),
            }],
            positions: vec![Position {
                id: 1,
                election_id: 1,
                department: "BSA".into(),
                title: "Senator".into(),
                rule: SelectionRule::Multi { max: 0 },
            }],
            ..Default::default()
        };

        assert!(registry.validate().is_err());
    }

    #[test]
    fn status_parses() {
        assert_eq!(ElectionStatus::parse("closed"), Some(ElectionStatus::Closed));
        assert_eq!(ElectionStatus::parse("paused"), None);
        assert_eq!(ElectionStatus::Open.to_string(), "open");
    }
}
