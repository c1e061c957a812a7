//! # Registry
//!
//! Shared election data: departments, elections, positions, candidates and the
//! eligibility roll. Loaded from a JSON seed file by the admin tool and read by
//! the server through the database.
//!
//! ## Payloads
//!
//! Votes travel as protobuf between the frontend and backend, see [`payloads`].
use std::{fs, path::Path, sync::LazyLock};

use anyhow::Context;
use prost::{DecodeError, Message, bytes::Buf};
use regex::Regex;

pub mod payloads;
pub mod types;

use payloads::Choice;
use types::Registry;

pub fn get_registry(path: impl AsRef<Path>) -> anyhow::Result<Registry> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read registry {}", path.display()))?;

    let registry: Registry = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse registry {}", path.display()))?;

    registry.validate()?;

    Ok(registry)
}

pub fn write_registry(path: impl AsRef<Path>, registry: &Registry) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string_pretty(registry)?)?;

    Ok(())
}

pub fn get_choice_from_bytes<B: Buf>(buf: B) -> Result<Choice, DecodeError> {
    Choice::decode(buf)
}

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_ ]+").unwrap());
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9-]").unwrap());

/// Student numbers arrive from spreadsheets and proxies in every shape, so keys
/// are compared in one canonical form: separators become dashes, everything
/// else outside `[A-Z0-9-]` is dropped.
pub fn normalize_voter_key(input: &str) -> String {
    let dashed = SEPARATORS.replace_all(input.trim(), "-");

    DISALLOWED
        .replace_all(&dashed, "")
        .trim_matches('-')
        .to_uppercase()
}
