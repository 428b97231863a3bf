//! Validator keystore directories.
//!
//! A keystore is a directory of `*.json` key files in the EIP-2335 layout: a 32-byte
//! validator secret encrypted with AES-128-CTR under a key stretched from the password
//! by PBKDF2-HMAC-SHA256 or scrypt, with a SHA-256 checksum over the second half of the
//! derived key and the cipher text. Decrypting every file is the slow part of startup,
//! which is why loaded deposits are cached (see `cache`).
//!
//! Passwords have control characters stripped before use. NFKD normalization is not
//! applied, so non-ASCII passwords must already be normalized.

use std::fs;
use std::path::{Path, PathBuf};

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::Hmac;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::{DepositRecord, to_hex};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

const KEYSTORE_VERSION: u32 = 4;
const DERIVED_KEY_LEN: usize = 32;
const SECRET_LEN: usize = 32;

/// PBKDF2 iteration count `keygen` writes unless told otherwise.
pub const DEFAULT_PBKDF2_ROUNDS: u32 = 262_144;

const SECRET_CONTEXT: &str = "eth1-mock-rpc 2024 keygen secret";
const SALT_CONTEXT: &str = "eth1-mock-rpc 2024 keygen salt";
const IV_CONTEXT: &str = "eth1-mock-rpc 2024 keygen iv";

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("could not access keystore at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed key file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed hex field in key file {path}: {source}")]
    Hex {
        path: PathBuf,
        #[source]
        source: hex::FromHexError,
    },
    #[error("key file {path} uses unsupported {module} {value:?}")]
    Unsupported {
        path: PathBuf,
        module: &'static str,
        value: String,
    },
    #[error("key file {path} has invalid {module} parameters")]
    InvalidParams { path: PathBuf, module: &'static str },
    #[error("key file {0} has an unexpected secret length")]
    SecretLength(PathBuf),
    #[error("invalid password for key file {0}")]
    InvalidPassword(PathBuf),
    #[error("no key files found in {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    crypto: Crypto,
    #[serde(default)]
    description: String,
    #[serde(default)]
    pubkey: String,
    #[serde(default)]
    path: String,
    uuid: String,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Crypto {
    kdf: Module,
    checksum: Module,
    cipher: Module,
}

/// One step of the crypto pipeline. `params` depend on `function`.
#[derive(Debug, Serialize, Deserialize)]
struct Module {
    function: String,
    params: Value,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Pbkdf2Params {
    dklen: usize,
    c: u32,
    prf: String,
    salt: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScryptParams {
    dklen: usize,
    n: u32,
    r: u32,
    p: u32,
    salt: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CipherParams {
    iv: String,
}

/// Decrypt every key file in `dir`, in file name order, into deposit records.
///
/// Blocking; call from `spawn_blocking` in async contexts.
pub fn load_deposits(dir: &Path, password: &str) -> Result<Vec<DepositRecord>, KeystoreError> {
    let io_err = |source| KeystoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(KeystoreError::Empty(dir.to_path_buf()));
    }

    paths
        .iter()
        .map(|path| {
            let secret = decrypt_key_file(path, password)?;
            debug!(path = %path.display(), "Decrypted key file");
            Ok(DepositRecord::from_secret(&secret))
        })
        .collect()
}

/// Write `count` key files encrypted under `password` into `dir`, creating it if needed.
/// The password is stretched with `rounds` PBKDF2 iterations.
///
/// Secrets, salts and IVs are derived from the file index, so a given count always
/// yields the same validators.
pub fn create_keystore(
    dir: &Path,
    password: &str,
    count: usize,
    rounds: u32,
) -> Result<Vec<PathBuf>, KeystoreError> {
    fs::create_dir_all(dir).map_err(|source| KeystoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let password = normalize_password(password);

    (0..count)
        .map(|index| {
            let path = dir.join(format!("keystore-{index:05}.json"));
            let seed = (index as u64).to_le_bytes();
            let secret = blake3::derive_key(SECRET_CONTEXT, &seed);
            let salt = blake3::derive_key(SALT_CONTEXT, &seed);
            let iv_seed = blake3::derive_key(IV_CONTEXT, &seed);
            let iv = &iv_seed[..16];

            let mut key = [0u8; DERIVED_KEY_LEN];
            pbkdf2::pbkdf2::<Hmac<Sha256>>(&password, &salt, rounds, &mut key).map_err(|_| {
                KeystoreError::InvalidParams {
                    path: path.clone(),
                    module: "kdf",
                }
            })?;

            let mut cipher_text = secret.to_vec();
            apply_cipher(&key, iv, &mut cipher_text, &path)?;

            let parse_err = |source| KeystoreError::Parse {
                path: path.clone(),
                source,
            };
            let kdf_params = serde_json::to_value(Pbkdf2Params {
                dklen: DERIVED_KEY_LEN,
                c: rounds,
                prf: "hmac-sha256".to_string(),
                salt: hex::encode(salt),
            })
            .map_err(parse_err)?;
            let cipher_params = serde_json::to_value(CipherParams {
                iv: hex::encode(iv),
            })
            .map_err(parse_err)?;

            let key_file = KeyFile {
                crypto: Crypto {
                    kdf: Module {
                        function: "pbkdf2".to_string(),
                        params: kdf_params,
                        message: String::new(),
                    },
                    checksum: Module {
                        function: "sha256".to_string(),
                        params: serde_json::json!({}),
                        message: hex::encode(checksum(&key, &cipher_text)),
                    },
                    cipher: Module {
                        function: "aes-128-ctr".to_string(),
                        params: cipher_params,
                        message: hex::encode(&cipher_text),
                    },
                },
                description: "eth1-mock-rpc validator key".to_string(),
                pubkey: to_hex(&DepositRecord::from_secret(&secret).pubkey),
                path: format!("m/12381/3600/{index}/0/0"),
                uuid: Uuid::now_v7().to_string(),
                version: KEYSTORE_VERSION,
            };

            let json = serde_json::to_vec_pretty(&key_file).map_err(parse_err)?;
            fs::write(&path, json).map_err(|source| KeystoreError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(path)
        })
        .collect()
}

fn decrypt_key_file(path: &Path, password: &str) -> Result<[u8; SECRET_LEN], KeystoreError> {
    let raw = fs::read(path).map_err(|source| KeystoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let key_file: KeyFile = serde_json::from_slice(&raw).map_err(|source| KeystoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let crypto = key_file.crypto;

    let key = derive_key(&crypto.kdf, &normalize_password(password), path)?;

    if crypto.checksum.function != "sha256" {
        return Err(unsupported(path, "checksum", &crypto.checksum.function));
    }
    if crypto.cipher.function != "aes-128-ctr" {
        return Err(unsupported(path, "cipher", &crypto.cipher.function));
    }
    let cipher_params: CipherParams = params(&crypto.cipher, path, "cipher")?;
    let iv = decode_hex(&cipher_params.iv, path)?;
    let mut data = decode_hex(&crypto.cipher.message, path)?;

    let expected = decode_hex(&crypto.checksum.message, path)?;
    if checksum(&key, &data)[..] != expected[..] {
        return Err(KeystoreError::InvalidPassword(path.to_path_buf()));
    }

    apply_cipher(&key, &iv, &mut data, path)?;
    data.try_into()
        .map_err(|_| KeystoreError::SecretLength(path.to_path_buf()))
}

fn derive_key(
    kdf: &Module,
    password: &[u8],
    path: &Path,
) -> Result<[u8; DERIVED_KEY_LEN], KeystoreError> {
    let invalid = || KeystoreError::InvalidParams {
        path: path.to_path_buf(),
        module: "kdf",
    };
    let mut key = [0u8; DERIVED_KEY_LEN];

    match kdf.function.as_str() {
        "pbkdf2" => {
            let p: Pbkdf2Params = params(kdf, path, "kdf")?;
            if p.prf != "hmac-sha256" {
                return Err(unsupported(path, "prf", &p.prf));
            }
            if p.dklen != DERIVED_KEY_LEN {
                return Err(invalid());
            }
            let salt = decode_hex(&p.salt, path)?;
            pbkdf2::pbkdf2::<Hmac<Sha256>>(password, &salt, p.c, &mut key)
                .map_err(|_| invalid())?;
        }
        "scrypt" => {
            let p: ScryptParams = params(kdf, path, "kdf")?;
            if p.dklen != DERIVED_KEY_LEN || !p.n.is_power_of_two() {
                return Err(invalid());
            }
            let log_n = u8::try_from(p.n.trailing_zeros()).map_err(|_| invalid())?;
            let scrypt_params =
                scrypt::Params::new(log_n, p.r, p.p, DERIVED_KEY_LEN).map_err(|_| invalid())?;
            let salt = decode_hex(&p.salt, path)?;
            scrypt::scrypt(password, &salt, &scrypt_params, &mut key).map_err(|_| invalid())?;
        }
        other => return Err(unsupported(path, "kdf", other)),
    }

    Ok(key)
}

/// AES-128-CTR keyed by the first half of the derived key. Encrypts and decrypts.
fn apply_cipher(
    key: &[u8; DERIVED_KEY_LEN],
    iv: &[u8],
    data: &mut [u8],
    path: &Path,
) -> Result<(), KeystoreError> {
    let mut cipher =
        Aes128Ctr::new_from_slices(&key[..16], iv).map_err(|_| KeystoreError::InvalidParams {
            path: path.to_path_buf(),
            module: "cipher",
        })?;
    cipher.apply_keystream(data);
    Ok(())
}

fn checksum(key: &[u8; DERIVED_KEY_LEN], cipher_text: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&key[16..]);
    hasher.update(cipher_text);
    hasher.finalize().into()
}

/// Strip C0, C1 and DEL control characters.
fn normalize_password(password: &str) -> Vec<u8> {
    password
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .into_bytes()
}

fn params<T: serde::de::DeserializeOwned>(
    module: &Module,
    path: &Path,
    name: &'static str,
) -> Result<T, KeystoreError> {
    serde_json::from_value(module.params.clone()).map_err(|_| KeystoreError::InvalidParams {
        path: path.to_path_buf(),
        module: name,
    })
}

fn decode_hex(field: &str, path: &Path) -> Result<Vec<u8>, KeystoreError> {
    hex::decode(field.trim_start_matches("0x")).map_err(|source| KeystoreError::Hex {
        path: path.to_path_buf(),
        source,
    })
}

fn unsupported(path: &Path, module: &'static str, value: &str) -> KeystoreError {
    KeystoreError::Unsupported {
        path: path.to_path_buf(),
        module,
        value: value.to_string(),
    }
}
