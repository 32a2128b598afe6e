//! Domain types shared across the evolver.

pub mod cycle;
pub mod error;
pub mod target;

pub use cycle::{CycleOutcome, CyclePhase, CycleState};
pub use error::{EvolverError, Result, Upstream};
pub use target::RepositoryTarget;
