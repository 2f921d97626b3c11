//! Solve outputs and telemetry.

use std::time::Duration;

use nalgebra::DVector;

use crate::scalar::{IndexType, Scalar};

/// Per-outer-iteration diagnostics, recorded only when
/// [`crate::solver::VerboseLevel::VeryVerbose`] is active.
#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry {
    pub primal_infeas: Scalar,
    pub dual_infeas: Scalar,
    pub mu: Scalar,
    pub step_norm: Scalar,
}

/// Final primal-dual iterate and convergence telemetry produced by
/// [`crate::solver::SolverProxDDP::run`].
#[derive(Debug, Clone)]
pub struct Results {
    pub xs: Vec<DVector<Scalar>>,
    pub us: Vec<DVector<Scalar>>,
    pub lams: Vec<DVector<Scalar>>,
    pub vs: Vec<DVector<Scalar>>,

    pub outer_iters: IndexType,
    pub inner_iters: IndexType,
    pub converged: bool,

    pub primal_infeas: Scalar,
    pub dual_infeas: Scalar,
    pub merit: Scalar,
    pub wall_time: Duration,

    /// Set if any inner Newton loop exhausted its line search (`LS_FAILURE`)
    /// and terminated early on its last iterate instead of reaching
    /// `eta_k`. Not fatal: the outer loop continues with that iterate.
    pub ls_failed: bool,

    pub history: Option<Vec<HistoryEntry>>,
}

impl Results {
    /// A zeroed placeholder, replaced wholesale once `run` completes. Never
    /// observed by a caller: `SolverProxDDP::setup` allocates this, and
    /// `run` always overwrites every field before returning.
    pub fn new_uninitialized(nx: IndexType, horizon: IndexType, keep_history: bool) -> Self {
        Self {
            xs: vec![DVector::zeros(nx); horizon + 1],
            us: Vec::new(),
            lams: Vec::new(),
            vs: Vec::new(),
            outer_iters: 0,
            inner_iters: 0,
            converged: false,
            primal_infeas: Scalar::INFINITY,
            dual_infeas: Scalar::INFINITY,
            merit: Scalar::INFINITY,
            wall_time: Duration::ZERO,
            ls_failed: false,
            history: if keep_history { Some(Vec::new()) } else { None },
        }
    }
}
