//! Operator control input.
//!
//! Reads one integer per line and makes that many more deposits visible, simulating new
//! deposits landing on chain.

use std::io::Write;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::readiness::Readiness;

pub struct ControlLoop {
    readiness: Readiness,
}

impl ControlLoop {
    pub fn new(readiness: Readiness) -> Self {
        Self { readiness }
    }

    /// Consume operator lines until the source closes.
    pub async fn run(&self, mut lines: mpsc::UnboundedReceiver<String>) {
        loop {
            let max_allowed = self.readiness.headroom().await;
            info!(
                max_allowed,
                "Enter the number of new eth2 deposits to trigger"
            );
            print!(">> ");
            let _ = std::io::stdout().flush();

            let Some(line) = lines.recv().await else {
                info!("Control input closed, deposit count is now fixed");
                return;
            };

            self.apply(line.trim()).await;
        }
    }

    /// Apply one line of operator input. Returns the new ready count when accepted.
    pub async fn apply(&self, input: &str) -> Option<usize> {
        let requested: usize = match input.parse() {
            Ok(n) => n,
            Err(e) => {
                warn!(input = %input, error = %e, "Expected a non-negative number of deposits");
                return None;
            }
        };

        match self.readiness.advance(requested).await {
            Ok(ready) => {
                info!(
                    added = requested,
                    ready,
                    total = self.readiness.total(),
                    "Deposits are now visible"
                );
                Some(ready)
            }
            Err(e) => {
                error!(
                    total = self.readiness.total(),
                    error = %e,
                    "You have already sent most available deposits in keystore, cannot submit more"
                );
                None
            }
        }
    }
}

/// Forward stdin lines to a channel from a dedicated OS thread.
///
/// Reading stdin blocks, so it stays off the runtime. The channel closes at end of input.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Could not read control input");
                    break;
                }
            }
        }
    });

    rx
}
