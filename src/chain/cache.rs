//! JSON cache of loaded deposit records.

use std::io::{Read, Write};
use std::path::PathBuf;

use super::DepositRecord;

/// File name of the cache inside the system temp directory.
pub const PERSISTED_DEPOSITS_FILE: &str = "deposits.json";

pub fn default_cache_path() -> PathBuf {
    std::env::temp_dir().join(PERSISTED_DEPOSITS_FILE)
}

pub fn persist_deposits<W: Write>(writer: W, deposits: &[DepositRecord]) -> serde_json::Result<()> {
    serde_json::to_writer(writer, deposits)
}

pub fn retrieve_deposits<R: Read>(reader: R) -> serde_json::Result<Vec<DepositRecord>> {
    serde_json::from_reader(reader)
}
