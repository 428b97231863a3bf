pub mod control;
pub mod loader;
pub mod readiness;

pub use control::{ControlLoop, spawn_stdin_reader};
pub use loader::{LoadOptions, load_deposits};
pub use readiness::{Readiness, ReadinessError, Snapshot};
