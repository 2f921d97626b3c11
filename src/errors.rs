use thiserror::Error;

/// Errors surfaced by the solver's public API.
///
/// Local recovery (regularization growth, line-search backtracking, mu
/// decrease) happens silently inside [`crate::solver::SolverProxDDP::run`];
/// only unrecoverable conditions and user-data problems reach this type.
/// Hitting an iteration cap is *not* an error: it is reported via
/// [`crate::results::Results::converged`] being `false`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxDdpError {
    #[error("dimension mismatch: {what} expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("index {index} out of bounds (len {len}) in {what}")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Riccati backward pass failed: Hamiltonian not SPD even at reg = {reg}")]
    RiccatiFailure { reg: f64 },

    #[error("block-tridiagonal solve failed: block {block} not SPD")]
    BlockTridiagonalFailure { block: usize },

    #[error("line search exhausted at alpha = {alpha_min}, merit did not decrease")]
    LineSearchFailure { alpha_min: f64 },

    #[error("nonlinear rollout failed to converge after {iters} substeps")]
    RolloutDivergence { iters: usize },

    #[error("setup() must be called with a problem before run()")]
    NotSetUp,

    #[error("leg split indices are invalid: {reason}")]
    InvalidSplit { reason: &'static str },
}
