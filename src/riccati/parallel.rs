//! Parallel-condensing structured Riccati solver.
//!
//! The horizon is split into `J` legs. Each leg runs an ordinary backward
//! pass ([`crate::riccati::serial::ProximalRiccatiImpl::backward_over_knots`])
//! against a *synthetic* boundary value function instead of a real terminal
//! cost: `V(x) = theta' x` exactly (`nth = nx`, `v_xt = I`, every other
//! theta-block zero). This treats the unknown cost-to-go beyond the leg as
//! purely affine in its own gradient (the boundary costate `theta`) — the
//! standard parallel-in-time relaxation (cf. Nielsen & Axehill's partitioned
//! Riccati) that turns the interface between legs into a small, densely
//! coupled linear system instead of a sequential recursion.
//!
//! That reduced system couples, for each of the `J - 1` interior boundaries,
//! the boundary costate `theta_i` and the boundary state `x_{b_i}`:
//!
//! - from the *right* leg's own first-knot factor: `theta_i = P x_{b_i} + p
//!   + Vxt theta_{i+1}` (costate = gradient of the right leg's value
//!   function at its own entry point);
//! - from the *left* leg's own first-knot factor: `x_{b_i} = Vtt theta_i +
//!   Vxt' x_in + vt` (envelope theorem: the gradient of a value function
//!   w.r.t. a linear multiplier is the primal quantity it's paired with).
//!
//! Interleaving `(theta_i, x_{b_i})` gives a block-tridiagonal system, but
//! not a block-SPD one (it's a saddle-point system, alternating +I/-P/-Vtt
//! blocks) — so unlike [`crate::block_tridiagonal`] this is assembled
//! densely and solved with a single partial-pivoted LU rather than the
//! Cholesky-based block sweep.  Once solved, every leg knows its own entry
//! state and boundary costate without waiting on its neighbours, so the `J`
//! per-leg forward passes are independent and run concurrently.

use nalgebra::{DMatrix, DVector};

use crate::errors::ProxDdpError;
use crate::lq::LqProblem;
use crate::riccati::serial::{ForwardResult, ProximalRiccatiImpl};
use crate::riccati::stage_factor::StageFactor;
use crate::scalar::{IndexType, Scalar};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

pub struct ParallelRiccati;

impl ParallelRiccati {
    /// Near-equal split of `[0, horizon)` into `num_legs` contiguous legs,
    /// returning the `num_legs + 1` boundary indices.
    pub fn split_indices(horizon: IndexType, num_legs: IndexType) -> Result<Vec<IndexType>, ProxDdpError> {
        if num_legs == 0 || num_legs > horizon {
            return Err(ProxDdpError::InvalidSplit {
                reason: "num_legs must be in 1..=horizon",
            });
        }
        let base = horizon / num_legs;
        let rem = horizon % num_legs;
        let mut split = Vec::with_capacity(num_legs + 1);
        split.push(0);
        let mut acc = 0;
        for j in 0..num_legs {
            acc += base + if j < rem { 1 } else { 0 };
            split.push(acc);
        }
        Ok(split)
    }

    /// Build the synthetic boundary value function `V(x) = theta' x` used as
    /// the terminal factor for every non-final leg.
    fn affine_boundary_factor(nx: IndexType) -> StageFactor {
        StageFactor {
            nx,
            nu: 0,
            nth: nx,
            p_mat: DMatrix::zeros(nx, nx),
            p_vec: DVector::zeros(nx),
            v_tt: DMatrix::zeros(nx, nx),
            v_xt: DMatrix::identity(nx, nx),
            v_t: DVector::zeros(nx),
            k_fb: DMatrix::zeros(0, nx),
            k_ff: DVector::zeros(0),
            k_th: DMatrix::zeros(0, nx),
            kz_fb: DMatrix::zeros(nx, nx),
            kz_ff: DVector::zeros(nx),
            kz_th: DMatrix::zeros(nx, nx),
            huu_chol: None,
        }
    }

    /// Run the full parallel-condensed solve: backward pass per leg,
    /// assemble and solve the condensed boundary system, then an
    /// independent forward pass per leg.
    pub fn solve(
        problem: &LqProblem,
        split: &[IndexType],
        x0: &DVector<Scalar>,
        zshift: &[DVector<Scalar>],
        mu_dyn: Scalar,
        mu_eq: Scalar,
        reg: Scalar,
        refine_steps: IndexType,
        refine_tol: Scalar,
    ) -> Result<ForwardResult, ProxDdpError> {
        let num_legs = split.len() - 1;
        let n = problem.horizon();
        if split[0] != 0 || split[num_legs] != n {
            return Err(ProxDdpError::InvalidSplit {
                reason: "split must cover [0, horizon]",
            });
        }
        let nx = problem.nx0();

        // Backward pass, one leg at a time (cheap relative to the
        // forward pass for typical nu << nx * leg_len; run serially — the
        // interesting parallelism here is the forward sweep below).
        let mut leg_factors: Vec<Vec<StageFactor>> = Vec::with_capacity(num_legs);
        for i in 0..num_legs {
            let lo = split[i];
            let hi = split[i + 1];
            let leg_knots = &problem.knots[lo..hi];
            let leg_zshift = &zshift[lo..hi];
            let terminal = if i == num_legs - 1 {
                ProximalRiccatiImpl::terminal_factor(&problem.terminal, &zshift[n], reg, mu_eq)
            } else {
                Self::affine_boundary_factor(nx)
            };
            let factors = ProximalRiccatiImpl::backward_over_knots(
                leg_knots, leg_zshift, mu_dyn, mu_eq, reg, terminal, refine_steps, refine_tol,
            )?;
            leg_factors.push(factors);
        }

        let num_boundaries = num_legs - 1;
        let (thetas, boundary_states) =
            Self::solve_condensed_system(&leg_factors, x0, num_boundaries, nx)?;

        // Per-leg entry state and incoming theta, fully determined — legs
        // can now run their forward passes independently.
        let entries: Vec<(DVector<Scalar>, Option<DVector<Scalar>>)> = (0..num_legs)
            .map(|i| {
                let x_in = if i == 0 { x0.clone() } else { boundary_states[i - 1].clone() };
                let theta = if i < num_boundaries { Some(thetas[i].clone()) } else { None };
                (x_in, theta)
            })
            .collect();

        let run_leg = |i: usize| -> ForwardResult {
            let lo = split[i];
            let hi = split[i + 1];
            let leg_knots = &problem.knots[lo..hi];
            let (x_in, theta) = &entries[i];
            ProximalRiccatiImpl::forward_over_knots(leg_knots, &leg_factors[i], x_in, theta.as_ref())
        };

        #[cfg(feature = "rayon")]
        let leg_results: Vec<ForwardResult> = (0..num_legs).into_par_iter().map(run_leg).collect();
        #[cfg(not(feature = "rayon"))]
        let leg_results: Vec<ForwardResult> = (0..num_legs).map(run_leg).collect();

        Ok(Self::stitch(problem, leg_results))
    }

    /// Assemble and solve the `2 * num_boundaries * nx`-dimensional condensed
    /// saddle-point system; returns `(thetas, boundary_states)`, each of
    /// length `num_boundaries`.
    fn solve_condensed_system(
        leg_factors: &[Vec<StageFactor>],
        x0: &DVector<Scalar>,
        num_boundaries: usize,
        nx: IndexType,
    ) -> Result<(Vec<DVector<Scalar>>, Vec<DVector<Scalar>>), ProxDdpError> {
        if num_boundaries == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let m = 2 * num_boundaries;
        let dim = m * nx;
        let mut mat = DMatrix::<Scalar>::zeros(dim, dim);
        let mut rhs = DVector::<Scalar>::zeros(dim);

        let blk = |b: usize| b * nx..(b + 1) * nx;

        for i in 0..num_boundaries {
            let right0 = &leg_factors[i + 1][0];
            let left0 = &leg_factors[i][0];

            // Eq theta_i: theta_i - P_right x_b_i - Vxt_right theta_{i+1} = p_right
            let row_th = 2 * i;
            mat.view_mut((row_th * nx, row_th * nx), (nx, nx))
                .copy_from(&DMatrix::identity(nx, nx));
            mat.view_mut((row_th * nx, (row_th + 1) * nx), (nx, nx))
                .copy_from(&(-&right0.p_mat));
            if i + 1 < num_boundaries {
                mat.view_mut((row_th * nx, (row_th + 2) * nx), (nx, nx))
                    .copy_from(&(-&right0.v_xt));
            }
            rhs.rows_mut(blk(row_th).start, nx).copy_from(&right0.p_vec);

            // Eq x_b_i: x_b_i - Vtt_left theta_i - Vxt_left' x_in = vt_left
            let row_xb = 2 * i + 1;
            mat.view_mut((row_xb * nx, row_xb * nx), (nx, nx))
                .copy_from(&DMatrix::identity(nx, nx));
            mat.view_mut((row_xb * nx, row_th * nx), (nx, nx))
                .copy_from(&(-&left0.v_tt));
            let mut rhs_xb = left0.v_t.clone();
            if i == 0 {
                rhs_xb += left0.v_xt.transpose() * x0;
            } else {
                mat.view_mut((row_xb * nx, (row_xb - 2) * nx), (nx, nx))
                    .copy_from(&(-left0.v_xt.transpose()));
            }
            rhs.rows_mut(blk(row_xb).start, nx).copy_from(&rhs_xb);
        }

        let lu = mat.lu();
        let sol = lu
            .solve(&rhs)
            .ok_or(ProxDdpError::BlockTridiagonalFailure { block: 0 })?;

        let mut thetas = Vec::with_capacity(num_boundaries);
        let mut boundary_states = Vec::with_capacity(num_boundaries);
        for i in 0..num_boundaries {
            thetas.push(DVector::from_column_slice(&sol.as_slice()[blk(2 * i)]));
            boundary_states.push(DVector::from_column_slice(&sol.as_slice()[blk(2 * i + 1)]));
        }
        Ok((thetas, boundary_states))
    }

    /// Concatenate per-leg forward results into one horizon-spanning
    /// trajectory, appending the real terminal constraint value (if any).
    fn stitch(problem: &LqProblem, leg_results: Vec<ForwardResult>) -> ForwardResult {
        let mut xs = Vec::new();
        let mut us = Vec::new();
        let mut lams = Vec::new();
        let mut vs = Vec::new();

        for (i, leg) in leg_results.into_iter().enumerate() {
            if i == 0 {
                xs.extend(leg.xs);
            } else {
                xs.extend(leg.xs.into_iter().skip(1));
            }
            us.extend(leg.us);
            lams.extend(leg.lams);
            vs.extend(leg.vs);
        }

        if problem.terminal.nc > 0 {
            let x_n = xs.last().unwrap();
            vs.push(&problem.terminal.c * x_n + &problem.terminal.dvec);
        } else {
            vs.push(DVector::zeros(0));
        }

        ForwardResult { xs, us, lams, vs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::lq::LqKnot;

    fn lqr_problem(n: usize) -> LqProblem {
        let nx = 2;
        let nu = 2;
        let a = DMatrix::<Scalar>::identity(nx, nx);
        let b = DMatrix::from_row_slice(nx, nu, &[-0.6, 0.3, 0.0, 1.0]);
        let q = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 1.0]));
        let r = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.01]));

        let mut knot = LqKnot::zeros(nx, nu, 0);
        knot.q = q.clone();
        knot.r = r;
        knot.a = a;
        knot.b = b;
        knot.e = -DMatrix::identity(nx, nx);

        let knots = vec![knot; n];
        let terminal = {
            let mut t = LqKnot::zeros(nx, 0, 0);
            t.q = q;
            t
        };

        LqProblem {
            g0: DMatrix::zeros(0, nx),
            gvec0: DVector::zeros(0),
            nc0: 0,
            knots,
            terminal,
        }
    }

    #[test]
    fn single_leg_matches_serial() {
        let n = 12;
        let problem = lqr_problem(n);
        let zshift = vec![DVector::zeros(0); n + 1];
        let x0 = DVector::from_vec(vec![1.0, -0.5]);

        let serial_factors = ProximalRiccatiImpl::backward(&problem, &zshift, 1e-6, 1e-6, 0.0, 0, 0.0).unwrap();
        let serial_result = ProximalRiccatiImpl::forward(&problem, &serial_factors, &x0, None);

        let split = ParallelRiccati::split_indices(n, 1).unwrap();
        let parallel_result =
            ParallelRiccati::solve(&problem, &split, &x0, &zshift, 1e-6, 1e-6, 0.0, 0, 0.0).unwrap();

        for t in 0..=n {
            assert_relative_eq!(serial_result.xs[t], parallel_result.xs[t], epsilon = 1e-9);
        }
    }

    #[test]
    fn two_legs_matches_serial() {
        let n = 8;
        let problem = lqr_problem(n);
        let zshift = vec![DVector::zeros(0); n + 1];
        let x0 = DVector::from_vec(vec![0.7, 0.3]);

        let serial_factors = ProximalRiccatiImpl::backward(&problem, &zshift, 1e-6, 1e-6, 0.0, 0, 0.0).unwrap();
        let serial_result = ProximalRiccatiImpl::forward(&problem, &serial_factors, &x0, None);

        for num_legs in [2usize, 3, 4] {
            let split = ParallelRiccati::split_indices(n, num_legs).unwrap();
            let parallel_result =
                ParallelRiccati::solve(&problem, &split, &x0, &zshift, 1e-6, 1e-6, 0.0, 0, 0.0).unwrap();
            for t in 0..=n {
                assert_relative_eq!(serial_result.xs[t], parallel_result.xs[t], epsilon = 1e-8);
            }
            for t in 0..n {
                assert_relative_eq!(serial_result.us[t], parallel_result.us[t], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn invalid_split_rejected() {
        assert!(ParallelRiccati::split_indices(4, 0).is_err());
        assert!(ParallelRiccati::split_indices(4, 5).is_err());
    }
}
