//! The `gar` (generalized augmented Riccati) structured linear solver.

pub mod parallel;
pub mod serial;
pub mod stage_factor;

pub use parallel::ParallelRiccati;
pub use serial::{ForwardResult, ProximalRiccatiImpl};
pub use stage_factor::StageFactor;
