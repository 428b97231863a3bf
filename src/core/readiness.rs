//! Readiness state: how many of the loaded deposits are visible to RPC reads.
//!
//! The deposit records and their logs are loaded once and never change, so they are
//! shared without locking. Only the `ready` counter is mutable; every read and every
//! update of it goes through one exclusive lock, and callers only ever see a
//! `Snapshot` taken under that lock.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::chain::{DepositLog, DepositRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("cannot make {requested} deposits visible, only {headroom} remain")]
    ExceedsHeadroom { requested: usize, headroom: usize },
    #[error("initial readiness {initial} exceeds the {total} loaded deposits")]
    InitialExceedsTotal { initial: usize, total: usize },
}

/// Thread-safe readiness state shared by the control loop and every RPC handler.
#[derive(Clone)]
pub struct Readiness {
    deposits: Arc<[DepositRecord]>,
    logs: Arc<[DepositLog]>,
    ready: Arc<Mutex<usize>>,
}

/// A consistent view of the readiness state at one instant.
#[derive(Clone)]
pub struct Snapshot {
    ready: usize,
    deposits: Arc<[DepositRecord]>,
    logs: Arc<[DepositLog]>,
}

impl Readiness {
    pub fn new(
        deposits: Vec<DepositRecord>,
        logs: Vec<DepositLog>,
        initial: usize,
    ) -> Result<Self, ReadinessError> {
        let total = deposits.len();
        if initial > total {
            return Err(ReadinessError::InitialExceedsTotal { initial, total });
        }

        Ok(Self {
            deposits: deposits.into(),
            logs: logs.into(),
            ready: Arc::new(Mutex::new(initial)),
        })
    }

    pub fn total(&self) -> usize {
        self.deposits.len()
    }

    pub async fn snapshot(&self) -> Snapshot {
        let ready = *self.ready.lock().await;
        Snapshot {
            ready,
            deposits: self.deposits.clone(),
            logs: self.logs.clone(),
        }
    }

    /// Number of deposits that can still be made visible.
    pub async fn headroom(&self) -> usize {
        let ready = self.ready.lock().await;
        self.total() - *ready
    }

    /// Make `n` more deposits visible. Returns the new ready count.
    pub async fn advance(&self, n: usize) -> Result<usize, ReadinessError> {
        let mut ready = self.ready.lock().await;
        let headroom = self.total() - *ready;
        if n > headroom {
            return Err(ReadinessError::ExceedsHeadroom {
                requested: n,
                headroom,
            });
        }
        *ready += n;
        Ok(*ready)
    }
}

impl Snapshot {
    pub fn ready(&self) -> usize {
        self.ready
    }

    pub fn total(&self) -> usize {
        self.deposits.len()
    }

    /// The visible deposits: the first `ready` of them.
    pub fn deposits(&self) -> &[DepositRecord] {
        &self.deposits[..self.ready]
    }

    /// Event logs of the visible deposits.
    pub fn logs(&self) -> &[DepositLog] {
        let visible = self.ready.min(self.logs.len());
        &self.logs[..visible]
    }
}
