//! The modelling layer's entry point: an [`OcpProblem`] bundles per-stage
//! dynamics, cost and (optional) path constraints, and knows how to turn a
//! trial trajectory into the [`LqProblem`] the Riccati solver consumes.

use nalgebra::{DMatrix, DVector};

use crate::constraint::ConstraintStack;
use crate::cost::{Cost, CostData};
use crate::errors::ProxDdpError;
use crate::function::{StageFunction, StageFunctionData, UnaryFunction};
use crate::lq::{LqKnot, LqProblem};
use crate::manifold::Manifold;
use crate::scalar::Scalar;
use crate::solver::HessianApprox;

/// One time-step's modelling data: the dynamics mapping `(x, u) -> x'`, the
/// stage cost, and an optional path constraint (a residual function paired
/// with the cone it must land in).
pub struct StageModel {
    pub dynamics: Box<dyn StageFunction>,
    pub cost: Box<dyn Cost>,
    pub constraint_fn: Option<Box<dyn StageFunction>>,
    pub constraint_set: Option<ConstraintStack>,
}

impl StageModel {
    pub fn new(dynamics: Box<dyn StageFunction>, cost: Box<dyn Cost>) -> Self {
        Self { dynamics, cost, constraint_fn: None, constraint_set: None }
    }

    pub fn with_constraint(mut self, constraint_fn: Box<dyn StageFunction>, constraint_set: ConstraintStack) -> Self {
        debug_assert_eq!(constraint_fn.nr(), constraint_set.total_dim());
        self.constraint_fn = Some(constraint_fn);
        self.constraint_set = Some(constraint_set);
        self
    }

    fn nx(&self) -> usize {
        self.cost.ndx()
    }

    fn nu(&self) -> usize {
        self.cost.nu()
    }

    fn nc(&self) -> usize {
        self.constraint_set.as_ref().map(|c| c.total_dim()).unwrap_or(0)
    }
}

/// A full discrete-time optimal control problem: fixed initial state,
/// a chain of [`StageModel`]s, and a terminal cost/constraint.
pub struct OcpProblem {
    pub x0: DVector<Scalar>,
    pub manifold: Box<dyn Manifold>,
    pub stages: Vec<StageModel>,
    pub terminal_cost: Box<dyn Cost>,
    pub terminal_constraint_fn: Option<Box<dyn UnaryFunction>>,
    pub terminal_constraint_set: Option<ConstraintStack>,
}

impl OcpProblem {
    pub fn horizon(&self) -> usize {
        self.stages.len()
    }

    pub fn nx(&self) -> usize {
        self.manifold.ndx()
    }

    fn nc_term(&self) -> usize {
        self.terminal_constraint_set.as_ref().map(|c| c.total_dim()).unwrap_or(0)
    }

    /// Validate that a trial trajectory has the shapes this problem expects.
    pub fn check_trajectory(&self, xs: &[DVector<Scalar>], us: &[DVector<Scalar>]) -> Result<(), ProxDdpError> {
        let n = self.horizon();
        if xs.len() != n + 1 {
            return Err(ProxDdpError::DimensionMismatch {
                what: "OcpProblem::check_trajectory xs",
                expected: n + 1,
                got: xs.len(),
            });
        }
        if us.len() != n {
            return Err(ProxDdpError::DimensionMismatch {
                what: "OcpProblem::check_trajectory us",
                expected: n,
                got: us.len(),
            });
        }
        Ok(())
    }

    /// Build the tangent-space LQ approximation around `(xs, us)` (the
    /// "updateLQSubproblem" hook): evaluate every stage's cost/dynamics/
    /// constraint Jacobians and assemble one [`LqKnot`] per stage plus a
    /// terminal knot. The result carries pure curvature/Jacobian data; the
    /// AL penalty terms (`mu_eq`, the projected shift) are added later by
    /// the Riccati backward pass, not baked in here.
    ///
    /// `hess_approx` selects whether the dynamics/constraint second-order
    /// curvature (the `lambda' d^2f` term Gauss-Newton drops) is folded
    /// into `q`/`r`/`s`; `lams`/`vs` supply the dual vectors it's contracted
    /// against (the previous iterate's multiplier estimates, as is standard
    /// for full-Newton DDP — they lag the primal update by one solve).
    pub fn linearize(
        &self,
        xs: &[DVector<Scalar>],
        us: &[DVector<Scalar>],
        hess_approx: HessianApprox,
        lams: &[DVector<Scalar>],
        vs: &[DVector<Scalar>],
    ) -> Result<LqProblem, ProxDdpError> {
        self.check_trajectory(xs, us)?;
        let n = self.horizon();
        let nx = self.nx();

        let mut knots = Vec::with_capacity(n);
        for t in 0..n {
            let stage = &self.stages[t];
            let x = &xs[t];
            let u = &us[t];
            let y = &xs[t + 1];

            let mut cost_data = CostData::zeros(stage.nx(), stage.nu());
            stage.cost.compute_gradients(x, u, &mut cost_data);
            stage.cost.compute_hessians(x, u, &mut cost_data);

            let mut dyn_data = StageFunctionData::zeros(stage.dynamics.nr(), stage.nx(), stage.nu(), nx);
            stage.dynamics.evaluate(x, u, y, &mut dyn_data);
            stage.dynamics.compute_jacobians(x, u, y, &mut dyn_data);

            let mut knot = LqKnot::zeros(stage.nx(), stage.nu(), stage.nc());
            knot.q = cost_data.lxx;
            knot.r = cost_data.luu;
            knot.s = cost_data.lxu.transpose();
            knot.qvec = cost_data.lx;
            knot.rvec = cost_data.lu;

            knot.a = dyn_data.jac_x;
            knot.b = dyn_data.jac_u;
            knot.e = dyn_data.jac_y;
            knot.f = dyn_data.value;

            if hess_approx == HessianApprox::Exact {
                let lambda = lams.get(t).cloned().unwrap_or_else(|| DVector::zeros(nx));
                let mut hxx = DMatrix::zeros(stage.nx(), stage.nx());
                let mut huu = DMatrix::zeros(stage.nu(), stage.nu());
                let mut hxu = DMatrix::zeros(stage.nx(), stage.nu());
                stage.dynamics.compute_vector_hessian_products(x, u, y, &lambda, &mut hxx, &mut huu, &mut hxu);
                knot.q += &hxx;
                knot.r += &huu;
                knot.s += hxu.transpose();
            }

            if let Some(cfun) = &stage.constraint_fn {
                let nc = cfun.nr();
                let mut c_data = StageFunctionData::zeros(nc, stage.nx(), stage.nu(), 0);
                cfun.evaluate(x, u, y, &mut c_data);
                cfun.compute_jacobians(x, u, y, &mut c_data);
                knot.c = c_data.jac_x;
                knot.d = c_data.jac_u;
                knot.dvec = c_data.value;

                if hess_approx == HessianApprox::Exact {
                    let v = vs.get(t).cloned().unwrap_or_else(|| DVector::zeros(nc));
                    let mut hxx = DMatrix::zeros(stage.nx(), stage.nx());
                    let mut huu = DMatrix::zeros(stage.nu(), stage.nu());
                    let mut hxu = DMatrix::zeros(stage.nx(), stage.nu());
                    cfun.compute_vector_hessian_products(x, u, y, &v, &mut hxx, &mut huu, &mut hxu);
                    knot.q += &hxx;
                    knot.r += &huu;
                    knot.s += hxu.transpose();
                }
            }

            knots.push(knot);
        }

        let x_n = &xs[n];
        let zero_u = DVector::zeros(0);
        let mut terminal_data = CostData::zeros(self.terminal_cost.ndx(), 0);
        self.terminal_cost.compute_gradients(x_n, &zero_u, &mut terminal_data);
        self.terminal_cost.compute_hessians(x_n, &zero_u, &mut terminal_data);

        let mut terminal = LqKnot::zeros(self.terminal_cost.ndx(), 0, self.nc_term());
        terminal.q = terminal_data.lxx;
        terminal.qvec = terminal_data.lx;

        if let Some(cfun) = &self.terminal_constraint_fn {
            let nc = cfun.nr();
            let mut c_data = StageFunctionData::zeros(nc, self.terminal_cost.ndx(), 0, 0);
            cfun.evaluate(x_n, &mut c_data);
            cfun.compute_jacobian(x_n, &mut c_data);
            terminal.c = c_data.jac_x;
            terminal.dvec = c_data.value;
        }

        Ok(LqProblem {
            g0: nalgebra::DMatrix::zeros(0, nx),
            gvec0: DVector::zeros(0),
            nc0: 0,
            knots,
            terminal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::VectorSpace;
    use nalgebra::DMatrix;

    struct LinearDynamics {
        a: DMatrix<Scalar>,
        b: DMatrix<Scalar>,
    }

    impl StageFunction for LinearDynamics {
        fn nr(&self) -> usize {
            self.a.nrows()
        }

        fn evaluate(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, y: &DVector<Scalar>, data: &mut StageFunctionData) {
            data.value = y - (&self.a * x + &self.b * u);
        }

        fn compute_jacobians(&self, _x: &DVector<Scalar>, _u: &DVector<Scalar>, _y: &DVector<Scalar>, data: &mut StageFunctionData) {
            data.jac_x = -self.a.clone();
            data.jac_u = -self.b.clone();
            data.jac_y = DMatrix::identity(self.a.nrows(), self.a.nrows());
        }
    }

    use crate::cost::QuadraticCost;

    fn toy_problem() -> OcpProblem {
        let nx = 2;
        let nu = 1;
        let a = DMatrix::identity(nx, nx);
        let b = DMatrix::from_row_slice(nx, nu, &[0.0, 1.0]);
        let q = DMatrix::identity(nx, nx);
        let r = DMatrix::identity(nu, nu);
        let s = DMatrix::zeros(nu, nx);
        let stage = StageModel::new(
            Box::new(LinearDynamics { a: a.clone(), b: b.clone() }),
            Box::new(QuadraticCost::new(q.clone(), r, s, DVector::zeros(nx), DVector::zeros(nu))),
        );
        OcpProblem {
            x0: DVector::from_vec(vec![1.0, 0.0]),
            manifold: Box::new(VectorSpace::new(nx)),
            stages: vec![stage],
            terminal_cost: Box::new(QuadraticCost::terminal(q, DVector::zeros(nx))),
            terminal_constraint_fn: None,
            terminal_constraint_set: None,
        }
    }

    #[test]
    fn linearize_recovers_exact_dynamics_along_consistent_trajectory() {
        let problem = toy_problem();
        let x0 = problem.x0.clone();
        let u0 = DVector::from_vec(vec![0.5]);
        let x1 = &x0 + DVector::from_vec(vec![0.0, 0.5]);
        let lq = problem
            .linearize(&[x0, x1], &[u0], HessianApprox::GaussNewton, &[], &[])
            .unwrap();
        assert_eq!(lq.knots.len(), 1);
        assert_relative_eq_vec(&lq.knots[0].f, &DVector::zeros(2));
    }

    /// Dynamics with nonzero curvature: `y = x + u^2 * ones`, so the
    /// costate-contracted Hessian w.r.t. `u` is `2 * lambda.sum()`.
    struct QuadraticDynamics {
        nx: usize,
    }

    impl StageFunction for QuadraticDynamics {
        fn nr(&self) -> usize {
            self.nx
        }

        fn evaluate(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, y: &DVector<Scalar>, data: &mut StageFunctionData) {
            data.value = y - x - DVector::from_element(self.nx, u[0] * u[0]);
        }

        fn compute_jacobians(&self, _x: &DVector<Scalar>, u: &DVector<Scalar>, _y: &DVector<Scalar>, data: &mut StageFunctionData) {
            data.jac_x = -DMatrix::identity(self.nx, self.nx);
            data.jac_u = DMatrix::from_element(self.nx, 1, -2.0 * u[0]);
            data.jac_y = DMatrix::identity(self.nx, self.nx);
        }

        fn compute_vector_hessian_products(
            &self,
            _x: &DVector<Scalar>,
            _u: &DVector<Scalar>,
            _y: &DVector<Scalar>,
            lambda: &DVector<Scalar>,
            _hxx: &mut DMatrix<Scalar>,
            huu: &mut DMatrix<Scalar>,
            _hxu: &mut DMatrix<Scalar>,
        ) {
            huu[(0, 0)] += -2.0 * lambda.sum();
        }
    }

    #[test]
    fn exact_hessian_folds_in_dynamics_curvature() {
        let nx = 2;
        let q = DMatrix::identity(nx, nx);
        let stage = StageModel::new(
            Box::new(QuadraticDynamics { nx }),
            Box::new(QuadraticCost::new(q.clone(), DMatrix::identity(1, 1), DMatrix::zeros(1, nx), DVector::zeros(nx), DVector::zeros(1))),
        );
        let problem = OcpProblem {
            x0: DVector::from_vec(vec![1.0, 0.0]),
            manifold: Box::new(VectorSpace::new(nx)),
            stages: vec![stage],
            terminal_cost: Box::new(QuadraticCost::terminal(q, DVector::zeros(nx))),
            terminal_constraint_fn: None,
            terminal_constraint_set: None,
        };

        let x0 = problem.x0.clone();
        let u0 = DVector::from_vec(vec![0.5]);
        let x1 = &x0 + DVector::from_vec(vec![0.25, 0.25]);
        let lam = DVector::from_vec(vec![1.0, 2.0]);

        let gn = problem
            .linearize(&[x0.clone(), x1.clone()], &[u0.clone()], HessianApprox::GaussNewton, &[], &[])
            .unwrap();
        let exact = problem
            .linearize(&[x0, x1], &[u0], HessianApprox::Exact, &[lam.clone()], &[])
            .unwrap();

        assert_eq!(gn.knots[0].r[(0, 0)], 1.0);
        assert_eq!(exact.knots[0].r[(0, 0)], 1.0 - 2.0 * lam.sum());
    }

    #[test]
    fn mismatched_trajectory_length_is_rejected() {
        let problem = toy_problem();
        let err = problem
            .linearize(&[problem.x0.clone()], &[], HessianApprox::GaussNewton, &[], &[])
            .unwrap_err();
        assert!(matches!(err, ProxDdpError::DimensionMismatch { .. }));
    }

    fn assert_relative_eq_vec(a: &DVector<Scalar>, b: &DVector<Scalar>) {
        approx::assert_relative_eq!(a, b, epsilon = 1e-10);
    }
}
