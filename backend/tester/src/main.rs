//! Writes an encoded `Choice` for manual testing against a running portal.
//!
//! ```sh
//! cargo run -p tester -- 200 201
//! ```
use std::{env, fs, process::ExitCode};

use prost::Message;
use registry::payloads::Choice;

const OUTPUT_PATH: &str = "../ballot.bin";

fn main() -> ExitCode {
    let candidate_ids: Result<Vec<i64>, _> = env::args().skip(1).map(|arg| arg.parse()).collect();

    let candidate_ids = match candidate_ids {
        Ok(ids) if !ids.is_empty() => ids,
        _ => {
            eprintln!("usage: tester <candidate id>...");
            return ExitCode::FAILURE;
        }
    };

    let choice = Choice { candidate_ids };
    println!("Candidates: {:?}", choice.candidate_ids);

    let bytes = choice.encode_to_vec();
    println!("Payload length in bytes: {}", bytes.len());

    if let Err(e) = fs::write(OUTPUT_PATH, bytes) {
        eprintln!("Failed to write {OUTPUT_PATH}: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
