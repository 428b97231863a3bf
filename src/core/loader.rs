//! Startup loading of deposit records.
//!
//! Decrypting a keystore is slow, so the decrypted deposits are cached as JSON and
//! reused on later runs unless the cache is explicitly invalidated.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{error, info};

use crate::chain::{DepositRecord, cache, keystore};

/// Where deposits come from and whether to trust the cache.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub cache_path: PathBuf,
    pub keystore_path: Option<PathBuf>,
    pub password: String,
    pub invalidate_cache: bool,
}

/// Load deposits from the cache, falling back to (and refreshing the cache from) the keystore.
pub async fn load_deposits(opts: &LoadOptions) -> Result<Vec<DepositRecord>> {
    if !opts.invalidate_cache {
        match File::open(&opts.cache_path) {
            Ok(file) => {
                let deposits = cache::retrieve_deposits(BufReader::new(file))
                    .with_context(|| {
                        format!("Could not retrieve deposits from {}", opts.cache_path.display())
                    })?;
                info!(path = %opts.cache_path.display(), "Loaded deposits from cache");
                return Ok(deposits);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Could not read from {}", opts.cache_path.display())
                });
            }
        }
    }

    let Some(keystore_path) = opts.keystore_path.clone() else {
        bail!("No deposit cache found, a --keystore-path is required");
    };

    info!(path = %keystore_path.display(), "Decrypting private keys, this may take a while...");
    let password = opts.password.clone();
    let path = keystore_path.clone();
    let deposits = tokio::task::spawn_blocking(move || keystore::load_deposits(&path, &password))
        .await
        .context("Keystore decryption task failed")?
        .context("Could not create deposit data from keystore directory")?;

    if let Err(e) = persist(&opts.cache_path, &deposits) {
        error!(error = %e, "Could not persist deposits to disk");
    }

    Ok(deposits)
}

fn persist(path: &Path, deposits: &[DepositRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Could not create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    cache::persist_deposits(&mut writer, deposits)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(root: &Path, keystore: Option<PathBuf>) -> LoadOptions {
        LoadOptions {
            cache_path: root.join("deposits.json"),
            keystore_path: keystore,
            password: "secret".to_string(),
            invalidate_cache: false,
        }
    }

    #[tokio::test]
    async fn keystore_load_populates_cache() {
        let temp = tempdir().unwrap();
        let keys = temp.path().join("keys");
        keystore::create_keystore(&keys, "secret", 3, 16).unwrap();

        let opts = options(temp.path(), Some(keys));
        let deposits = load_deposits(&opts).await.unwrap();

        assert_eq!(deposits.len(), 3);
        assert!(opts.cache_path.exists());
    }

    #[tokio::test]
    async fn cache_is_used_without_keystore() {
        let temp = tempdir().unwrap();
        let keys = temp.path().join("keys");
        keystore::create_keystore(&keys, "secret", 2, 16).unwrap();
        let first = load_deposits(&options(temp.path(), Some(keys.clone()))).await.unwrap();

        std::fs::remove_dir_all(&keys).unwrap();
        let second = load_deposits(&options(temp.path(), None)).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalidate_cache_rereads_keystore() {
        let temp = tempdir().unwrap();
        let keys = temp.path().join("keys");
        keystore::create_keystore(&keys, "secret", 2, 16).unwrap();
        load_deposits(&options(temp.path(), Some(keys.clone()))).await.unwrap();

        keystore::create_keystore(&keys, "secret", 5, 16).unwrap();
        let mut opts = options(temp.path(), Some(keys));
        let cached = load_deposits(&opts).await.unwrap();
        opts.invalidate_cache = true;
        let fresh = load_deposits(&opts).await.unwrap();

        assert_eq!(cached.len(), 2);
        assert_eq!(fresh.len(), 5);
    }

    #[tokio::test]
    async fn corrupt_cache_is_fatal() {
        let temp = tempdir().unwrap();
        let opts = options(temp.path(), None);
        std::fs::write(&opts.cache_path, b"{not json").unwrap();

        assert!(load_deposits(&opts).await.is_err());
    }

    #[tokio::test]
    async fn missing_cache_and_keystore_is_fatal() {
        let temp = tempdir().unwrap();
        assert!(load_deposits(&options(temp.path(), None)).await.is_err());
    }
}
