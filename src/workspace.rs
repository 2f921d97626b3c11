//! Outer-solver scratch space: every buffer the driver touches inside the
//! outer/inner loops is allocated once, here, from the problem shape, and
//! reused across outer iterations.

use nalgebra::DVector;

use crate::constraint::ConstraintStack;
use crate::errors::ProxDdpError;
use crate::lq::LqProblem;
use crate::ocp::OcpProblem;
use crate::scalar::Scalar;
use crate::scaler::ProxScaler;
use crate::solver::HessianApprox;

/// Iteration buffers for one problem. Constructed once per `setup`, reused
/// (not reallocated) across every outer AL iteration of `run`.
pub struct Workspace {
    pub xs_trial: Vec<DVector<Scalar>>,
    pub us_trial: Vec<DVector<Scalar>>,

    pub prev_xs: Vec<DVector<Scalar>>,
    pub prev_us: Vec<DVector<Scalar>>,
    pub prev_lams: Vec<DVector<Scalar>>,
    pub prev_vs: Vec<DVector<Scalar>>,

    /// Dynamics multipliers, one per transition knot.
    pub lams: Vec<DVector<Scalar>>,
    /// Path-constraint multipliers, one per stage (empty vector if a stage
    /// has no constraints), plus one terminal entry.
    pub vs: Vec<DVector<Scalar>>,

    pub lams_plus: Vec<DVector<Scalar>>,
    pub lams_pdal: Vec<DVector<Scalar>>,
    pub vs_plus: Vec<DVector<Scalar>>,
    pub vs_pdal: Vec<DVector<Scalar>>,

    /// `zshift[t] = proj_C(d_t + mu_eq * v_t) - mu_eq * v_t`, the AL gradient
    /// shift consumed directly by [`crate::riccati::serial::ProximalRiccatiImpl`].
    pub zshift: Vec<DVector<Scalar>>,

    /// Per-stage indicator of which constraint rows are currently active
    /// (z <= 0 boundary, used for diagnostics / active-set reporting).
    pub active_set: Vec<Vec<bool>>,

    pub primal_infeas: Scalar,
    pub dual_infeas: Scalar,

    pub lq: LqProblem,
    pub scalers: Vec<ProxScaler>,
}

impl Workspace {
    /// Allocate a workspace sized to `problem`, with multipliers and the
    /// nested LQ approximation initialized to zero.
    pub fn new(problem: &OcpProblem) -> Result<Self, ProxDdpError> {
        let n = problem.horizon();
        let nx = problem.nx();

        let mut xs_trial = Vec::with_capacity(n + 1);
        let mut prev_xs = Vec::with_capacity(n + 1);
        for _ in 0..=n {
            xs_trial.push(DVector::zeros(nx));
            prev_xs.push(DVector::zeros(nx));
        }

        let mut us_trial = Vec::with_capacity(n);
        let mut prev_us = Vec::with_capacity(n);
        let mut lams = Vec::with_capacity(n);
        let mut prev_lams = Vec::with_capacity(n);
        let mut lams_plus = Vec::with_capacity(n);
        let mut lams_pdal = Vec::with_capacity(n);
        let mut vs = Vec::with_capacity(n + 1);
        let mut prev_vs = Vec::with_capacity(n + 1);
        let mut vs_plus = Vec::with_capacity(n + 1);
        let mut vs_pdal = Vec::with_capacity(n + 1);
        let mut zshift = Vec::with_capacity(n + 1);
        let mut active_set = Vec::with_capacity(n + 1);
        let mut scalers = Vec::with_capacity(n + 1);

        for stage in &problem.stages {
            let nu = stage_nu(stage);
            us_trial.push(DVector::zeros(nu));
            prev_us.push(DVector::zeros(nu));
            lams.push(DVector::zeros(nx));
            prev_lams.push(DVector::zeros(nx));
            lams_plus.push(DVector::zeros(nx));
            lams_pdal.push(DVector::zeros(nx));

            let nc = stage_constraint_dim(&stage.constraint_set);
            vs.push(DVector::zeros(nc));
            prev_vs.push(DVector::zeros(nc));
            vs_plus.push(DVector::zeros(nc));
            vs_pdal.push(DVector::zeros(nc));
            zshift.push(DVector::zeros(nc));
            active_set.push(vec![false; nc]);
            scalers.push(build_scaler(&stage.constraint_set));
        }

        let nc_term = stage_constraint_dim(&problem.terminal_constraint_set);
        vs.push(DVector::zeros(nc_term));
        prev_vs.push(DVector::zeros(nc_term));
        vs_plus.push(DVector::zeros(nc_term));
        vs_pdal.push(DVector::zeros(nc_term));
        zshift.push(DVector::zeros(nc_term));
        active_set.push(vec![false; nc_term]);
        scalers.push(build_scaler(&problem.terminal_constraint_set));

        let xs_init: Vec<DVector<Scalar>> = (0..=n).map(|_| DVector::zeros(nx)).collect();
        let us_init: Vec<DVector<Scalar>> =
            problem.stages.iter().map(|s| DVector::zeros(stage_nu(s))).collect();
        let lq = problem.linearize(&xs_init, &us_init, HessianApprox::GaussNewton, &[], &[])?;

        Ok(Self {
            xs_trial,
            us_trial,
            prev_xs,
            prev_us,
            prev_lams,
            prev_vs,
            lams,
            vs,
            lams_plus,
            lams_pdal,
            vs_plus,
            vs_pdal,
            zshift,
            active_set,
            primal_infeas: 0.0,
            dual_infeas: 0.0,
            lq,
            scalers,
        })
    }

    /// Rebuild the nested LQ approximation around the current trial
    /// trajectory. Not allocation-free: the NOMALLOC contract around the
    /// Riccati hot loop itself is preserved; this call sits outside it,
    /// once per outer iteration, which is the one documented exception
    /// granted to the condensed-KKT assembly.
    pub fn rebuild_lq(&mut self, problem: &OcpProblem, hess_approx: HessianApprox) -> Result<(), ProxDdpError> {
        self.lq = problem.linearize(&self.xs_trial, &self.us_trial, hess_approx, &self.lams, &self.vs)?;
        Ok(())
    }

    /// Recompute `zshift[t]` from the current `vs` and the per-stage
    /// constraint residual of `self.lq`, at AL penalty weight `mu_eq` scaled
    /// per-block by `self.scalers[t]`, projecting onto each stage's actual
    /// constraint cone.
    pub fn update_zshift(&mut self, problem: &OcpProblem, mu_eq: Scalar) {
        for t in 0..self.lq.knots.len() {
            let knot = &self.lq.knots[t];
            if knot.nc == 0 {
                continue;
            }
            let v = &self.vs[t];
            let mu_vec = self.scalers[t].effective_mu_vec(mu_eq);
            let shift = v.component_mul(&mu_vec);
            let shifted = &knot.dvec + &shift;
            let projected = match &problem.stages[t].constraint_set {
                Some(stack) => stack.projection(&shifted),
                None => shifted.clone(),
            };
            self.zshift[t] = projected - shift;
        }
        let term = &self.lq.terminal;
        if term.nc > 0 {
            let n = self.zshift.len() - 1;
            let v = &self.vs[n];
            let mu_vec = self.scalers[n].effective_mu_vec(mu_eq);
            let shift = v.component_mul(&mu_vec);
            let shifted = &term.dvec + &shift;
            let projected = match &problem.terminal_constraint_set {
                Some(stack) => stack.projection(&shifted),
                None => shifted.clone(),
            };
            self.zshift[n] = projected - shift;
        }
    }
}

fn stage_nu(stage: &crate::ocp::StageModel) -> usize {
    stage.cost.nu()
}

fn stage_constraint_dim(set: &Option<ConstraintStack>) -> usize {
    set.as_ref().map(|c| c.total_dim()).unwrap_or(0)
}

fn build_scaler(set: &Option<ConstraintStack>) -> ProxScaler {
    match set {
        None => ProxScaler::new(vec![]),
        Some(stack) => {
            let sizes: Vec<usize> = (0..stack.num_blocks()).map(|j| stack.block_dim(j)).collect();
            let is_eq: Vec<bool> = (0..stack.num_blocks()).map(|j| stack.block_is_equality_like(j)).collect();
            let mut scaler = ProxScaler::new(sizes);
            scaler.apply_default_scaling_strategy(&is_eq).expect("sizes match by construction");
            scaler
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::QuadraticCost;
    use crate::function::{StageFunction, StageFunctionData};
    use crate::manifold::VectorSpace;
    use crate::ocp::StageModel;
    use nalgebra::DMatrix;

    struct IdentityDynamics;
    impl StageFunction for IdentityDynamics {
        fn nr(&self) -> usize {
            2
        }
        fn evaluate(&self, x: &DVector<Scalar>, _u: &DVector<Scalar>, y: &DVector<Scalar>, data: &mut StageFunctionData) {
            data.value = y - x;
        }
        fn compute_jacobians(&self, _x: &DVector<Scalar>, _u: &DVector<Scalar>, _y: &DVector<Scalar>, data: &mut StageFunctionData) {
            data.jac_x = -DMatrix::identity(2, 2);
            data.jac_u = DMatrix::zeros(2, 0);
            data.jac_y = DMatrix::identity(2, 2);
        }
    }

    fn toy_problem(n: usize) -> OcpProblem {
        let nx = 2;
        let q = DMatrix::identity(nx, nx);
        let stage = || {
            StageModel::new(
                Box::new(IdentityDynamics),
                Box::new(QuadraticCost::new(q.clone(), DMatrix::zeros(0, 0), DMatrix::zeros(0, nx), DVector::zeros(nx), DVector::zeros(0))),
            )
        };
        OcpProblem {
            x0: DVector::zeros(nx),
            manifold: Box::new(VectorSpace::new(nx)),
            stages: (0..n).map(|_| stage()).collect(),
            terminal_cost: Box::new(QuadraticCost::terminal(q, DVector::zeros(nx))),
            terminal_constraint_fn: None,
            terminal_constraint_set: None,
        }
    }

    #[test]
    fn workspace_sizes_match_problem() {
        let problem = toy_problem(5);
        let ws = Workspace::new(&problem).unwrap();
        assert_eq!(ws.xs_trial.len(), 6);
        assert_eq!(ws.us_trial.len(), 5);
        assert_eq!(ws.lams.len(), 5);
        assert_eq!(ws.vs.len(), 6);
    }
}
