//! Serial structured Riccati backward/forward pass.
//!
//! The backward pass factorizes the AL-regularized KKT system of the LQ
//! approximation knot by knot, from `t = N` down to `0`, producing a
//! [`StageFactor`] per knot. Knots that carry a parameterization (the last
//! knot of a non-final parallel leg) propagate an additional
//! affine dependency on the parameter `theta` through every knot behind
//! them in the same leg — this is why every [`StageFactor`] carries
//! `Vtt`/`Vxt`/`vt` blocks, not just the parameterized knot itself.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::errors::ProxDdpError;
use crate::lq::{LqKnot, LqProblem};
use crate::riccati::stage_factor::StageFactor;
use crate::scalar::{IndexType, Scalar};

/// Classical iterative refinement of `chol.solve(rhs)` against the
/// un-regularized `quu`: residual `r = rhs - quu x`, correction
/// `x += chol.solve(r)`, repeated until `r` is small or `steps` is spent.
/// `steps == 0` is a single direct solve (the default).
fn refine_solve_vec(
    chol: &Cholesky<Scalar, Dyn>,
    quu: &DMatrix<Scalar>,
    rhs: &DVector<Scalar>,
    steps: IndexType,
    tol: Scalar,
) -> DVector<Scalar> {
    let mut x = chol.solve(rhs);
    for _ in 0..steps {
        let r = rhs - quu * &x;
        if r.amax() <= tol {
            break;
        }
        x += chol.solve(&r);
    }
    x
}

fn refine_solve_mat(
    chol: &Cholesky<Scalar, Dyn>,
    quu: &DMatrix<Scalar>,
    rhs: &DMatrix<Scalar>,
    steps: IndexType,
    tol: Scalar,
) -> DMatrix<Scalar> {
    let mut x = chol.solve(rhs);
    for _ in 0..steps {
        let r = rhs - quu * &x;
        if r.amax() <= tol {
            break;
        }
        x += chol.solve(&r);
    }
    x
}

/// Output of a backward pass: a search direction is recovered from these via
/// [`ProximalRiccatiImpl::forward`].
pub struct ProximalRiccatiImpl;

/// Effective dynamics propagation matrices `x' = tilde_a x + tilde_b u + tilde_f`,
/// obtained by eliminating `E` from `A x + B u + E x' + f = 0`.
struct EffectiveDynamics {
    a: DMatrix<Scalar>,
    b: DMatrix<Scalar>,
    f: DVector<Scalar>,
}

/// Eliminate `E` from the knot's dynamics. Uses the exact inverse when `E`
/// is invertible; otherwise falls back to a `mu_dyn`-damped least-squares
/// solve (the proximal dynamics coupling with `E`), which
/// degrades gracefully as `E` becomes singular instead of failing outright.
fn eliminate_dynamics(knot: &LqKnot, mu_dyn: Scalar) -> EffectiveDynamics {
    let n = knot.e.nrows();
    let e_inv = match knot.e.clone().try_inverse() {
        Some(inv) => inv,
        None => {
            let et = knot.e.transpose();
            let damped = &et * &knot.e + DMatrix::identity(n, n) * mu_dyn;
            let chol = Cholesky::new(damped).expect("damped E'E + mu*I is SPD for mu_dyn > 0");
            chol.solve(&et)
        }
    };
    EffectiveDynamics {
        a: &e_inv * &knot.a * -1.0,
        b: &e_inv * &knot.b * -1.0,
        f: &e_inv * &knot.f * -1.0,
    }
}

impl ProximalRiccatiImpl {
    /// Run the backward pass over the whole horizon.
    ///
    /// `zshift[t]` is the precomputed AL-penalty gradient shift for knot
    /// `t`'s path-constraint block, `proj_C(d_t + mu_eq * v_t) - mu_eq * v_t`
    /// (empty if the knot has no constraints); `zshift` has length
    /// `problem.horizon() + 1` (terminal knot included, last entry).
    pub fn backward(
        problem: &LqProblem,
        zshift: &[DVector<Scalar>],
        mu_dyn: Scalar,
        mu_eq: Scalar,
        reg: Scalar,
        refine_steps: IndexType,
        refine_tol: Scalar,
    ) -> Result<Vec<StageFactor>, ProxDdpError> {
        let n = problem.horizon();
        assert_eq!(zshift.len(), n + 1, "zshift must have one entry per knot incl. terminal");
        let terminal = Self::terminal_factor(&problem.terminal, &zshift[n], reg, mu_eq);
        Self::backward_over_knots(&problem.knots, &zshift[..n], mu_dyn, mu_eq, reg, terminal, refine_steps, refine_tol)
    }

    /// Backward pass over an explicit knot slice with a caller-supplied
    /// terminal [`StageFactor`] in place of a real terminal cost/constraint.
    ///
    /// Used directly by [`crate::riccati::parallel`] to run a leg's backward
    /// pass against a synthetic, `theta`-parameterized boundary value
    /// function (`nth = nx`, `v_xt = I`) instead of the problem's real
    /// terminal knot.
    pub(crate) fn backward_over_knots(
        knots: &[LqKnot],
        zshift: &[DVector<Scalar>],
        mu_dyn: Scalar,
        mu_eq: Scalar,
        reg: Scalar,
        terminal: StageFactor,
        refine_steps: IndexType,
        refine_tol: Scalar,
    ) -> Result<Vec<StageFactor>, ProxDdpError> {
        let n = knots.len();
        assert_eq!(zshift.len(), n, "zshift must have one entry per transition knot");

        // Knots are produced terminal-first, then reversed into ascending
        // time order at the end.
        let mut factors_rev: Vec<StageFactor> = Vec::with_capacity(n + 1);
        factors_rev.push(terminal);

        for t in (0..n).rev() {
            let knot = &knots[t];
            let next = factors_rev.last().unwrap();
            let factor =
                Self::backward_step(knot, next, &zshift[t], mu_dyn, mu_eq, reg, refine_steps, refine_tol)?;
            factors_rev.push(factor);
        }

        factors_rev.reverse();
        Ok(factors_rev)
    }

    pub(crate) fn terminal_factor(
        term: &LqKnot,
        zshift_term: &DVector<Scalar>,
        reg: Scalar,
        mu_eq: Scalar,
    ) -> StageFactor {
        let nx = term.nx;
        let mut p_mat = term.q.clone();
        for i in 0..nx {
            p_mat[(i, i)] += reg;
        }
        let mut p_vec = term.qvec.clone();
        if term.nc > 0 {
            p_mat += term.c.transpose() * &term.c * (1.0 / mu_eq);
            p_vec += term.c.transpose() * zshift_term;
        }
        StageFactor {
            nx,
            nu: 0,
            nth: 0,
            p_mat,
            p_vec,
            v_tt: DMatrix::zeros(0, 0),
            v_xt: DMatrix::zeros(nx, 0),
            v_t: DVector::zeros(0),
            k_fb: DMatrix::zeros(0, nx),
            k_ff: DVector::zeros(0),
            k_th: DMatrix::zeros(0, 0),
            kz_fb: DMatrix::zeros(nx, nx),
            kz_ff: DVector::zeros(nx),
            kz_th: DMatrix::zeros(nx, 0),
            huu_chol: None,
        }
    }

    fn backward_step(
        knot: &LqKnot,
        next: &StageFactor,
        zshift: &DVector<Scalar>,
        mu_dyn: Scalar,
        mu_eq: Scalar,
        reg: Scalar,
        refine_steps: IndexType,
        refine_tol: Scalar,
    ) -> Result<StageFactor, ProxDdpError> {
        let nx = knot.nx;
        let nu = knot.nu;
        let nth = next.nth.max(knot.nth);

        let dyn_eff = eliminate_dynamics(knot, mu_dyn);

        let mut qxx = &knot.q + dyn_eff.a.transpose() * &next.p_mat * &dyn_eff.a;
        let mut qux = &knot.s + dyn_eff.b.transpose() * &next.p_mat * &dyn_eff.a;
        let mut quu = &knot.r + dyn_eff.b.transpose() * &next.p_mat * &dyn_eff.b;
        let mut qx = &knot.qvec + dyn_eff.a.transpose() * (&next.p_mat * &dyn_eff.f + &next.p_vec);
        let mut qu = &knot.rvec + dyn_eff.b.transpose() * (&next.p_mat * &dyn_eff.f + &next.p_vec);

        if knot.nc > 0 {
            qxx += knot.c.transpose() * &knot.c * (1.0 / mu_eq);
            qux += knot.d.transpose() * &knot.c * (1.0 / mu_eq);
            quu += knot.d.transpose() * &knot.d * (1.0 / mu_eq);
            qx += knot.c.transpose() * zshift;
            qu += knot.d.transpose() * zshift;
        }
        for i in 0..nx {
            qxx[(i, i)] += reg;
        }

        // Cross/quadratic terms coupling the glued parameter theta, own
        // knot parameterization (if any) plus whatever theta-dependency the
        // next knot already propagates.
        let mut qxt = DMatrix::zeros(nx, nth);
        let mut qut = DMatrix::zeros(nu, nth);
        let mut qtt = DMatrix::zeros(nth, nth);
        let mut qt = DVector::zeros(nth);

        if knot.has_parameterization() {
            let gx = knot.gx.as_ref().unwrap();
            let gu = knot.gu.as_ref().unwrap();
            let gamma = knot.gamma.as_ref().unwrap();
            let gammavec = knot.gammavec.as_ref().unwrap();
            qxt += gx.transpose();
            qut += gu.transpose();
            qtt += gamma;
            qt += gammavec;
        }
        if next.nth > 0 {
            qxt += dyn_eff.a.transpose() * &next.v_xt;
            qut += dyn_eff.b.transpose() * &next.v_xt;
            qtt += &next.v_tt;
            qt += next.v_xt.transpose() * &dyn_eff.f + &next.v_t;
        }

        let huu_chol =
            Cholesky::new(quu.clone()).ok_or(ProxDdpError::RiccatiFailure { reg })?;

        let k_fb = -refine_solve_mat(&huu_chol, &quu, &qux, refine_steps, refine_tol);
        let k_ff = -refine_solve_vec(&huu_chol, &quu, &qu, refine_steps, refine_tol);
        let k_th = if nth > 0 {
            -refine_solve_mat(&huu_chol, &quu, &qut, refine_steps, refine_tol)
        } else {
            DMatrix::zeros(nu, 0)
        };

        let p_mat = &qxx + qux.transpose() * &k_fb;
        let p_vec = &qx + qux.transpose() * &k_ff;
        let v_xt = if nth > 0 { &qxt + qux.transpose() * &k_th } else { DMatrix::zeros(nx, 0) };
        let v_tt = if nth > 0 { &qtt + qut.transpose() * &k_th } else { DMatrix::zeros(0, 0) };
        let v_t = if nth > 0 { &qt + qut.transpose() * &k_ff } else { DVector::zeros(0) };

        // Dual feedback for the dynamics multiplier: lambda_{t+1} is the
        // gradient of the next value function at the propagated state,
        // expressed here as an affine function of (x_t, theta).
        let closed_loop_a = &dyn_eff.a + &dyn_eff.b * &k_fb;
        let closed_loop_shift = &dyn_eff.b * &k_ff + &dyn_eff.f;
        let kz_fb = &next.p_mat * &closed_loop_a;
        let kz_ff = &next.p_mat * &closed_loop_shift + &next.p_vec;
        let kz_th = if nth > 0 {
            let mut kz_th = &next.p_mat * &dyn_eff.b * &k_th;
            if next.nth > 0 {
                kz_th += &next.v_xt;
            }
            kz_th
        } else {
            DMatrix::zeros(nx, 0)
        };

        Ok(StageFactor {
            nx,
            nu,
            nth,
            p_mat,
            p_vec,
            v_tt,
            v_xt,
            v_t,
            k_fb,
            k_ff,
            k_th,
            kz_fb,
            kz_ff,
            kz_th,
            huu_chol: Some(huu_chol),
        })
    }

    /// Given the per-knot factors and an initial state, propagate the
    /// closed-loop primal step and recover multiplier estimates.
    ///
    /// `theta` is `Some` when this is a non-final leg glued to a successor
    /// via the parallel condensation; `None` for a
    /// standalone/serial solve.
    pub fn forward(
        problem: &LqProblem,
        factors: &[StageFactor],
        x0: &DVector<Scalar>,
        theta: Option<&DVector<Scalar>>,
    ) -> ForwardResult {
        let mut result = Self::forward_over_knots(&problem.knots, factors, x0, theta);
        if problem.terminal.nc > 0 {
            let x_n = result.xs.last().unwrap();
            result.vs.push(&problem.terminal.c * x_n + &problem.terminal.dvec);
        } else {
            result.vs.push(DVector::zeros(0));
        }
        result
    }

    /// Forward pass over an explicit knot slice (used per-leg by
    /// [`crate::riccati::parallel`]); `vs` only covers the transition
    /// knots' own constraints, not any terminal/boundary constraint.
    pub(crate) fn forward_over_knots(
        knots: &[LqKnot],
        factors: &[StageFactor],
        x0: &DVector<Scalar>,
        theta: Option<&DVector<Scalar>>,
    ) -> ForwardResult {
        let n = knots.len();
        let mut xs = Vec::with_capacity(n + 1);
        let mut us = Vec::with_capacity(n);
        let mut lams = Vec::with_capacity(n);
        let mut vs = Vec::with_capacity(n);

        xs.push(x0.clone());
        for t in 0..n {
            let knot = &knots[t];
            let factor = &factors[t];
            let x = &xs[t];

            let mut u = &factor.k_fb * x + &factor.k_ff;
            if factor.nth > 0 {
                if let Some(th) = theta {
                    u += &factor.k_th * th;
                }
            }

            let dyn_eff = eliminate_dynamics(knot, 1.0);
            let x_next = &dyn_eff.a * x + &dyn_eff.b * &u + &dyn_eff.f;

            let mut lam = &factor.kz_fb * x + &factor.kz_ff;
            if factor.nth > 0 {
                if let Some(th) = theta {
                    lam += &factor.kz_th * th;
                }
            }

            if knot.nc > 0 {
                let c_val = &knot.c * x + &knot.d * &u + &knot.dvec;
                vs.push(c_val);
            } else {
                vs.push(DVector::zeros(0));
            }

            us.push(u);
            lams.push(lam);
            xs.push(x_next);
        }

        ForwardResult { xs, us, lams, vs }
    }
}

/// Primal-dual search direction produced by [`ProximalRiccatiImpl::forward`].
pub struct ForwardResult {
    pub xs: Vec<DVector<Scalar>>,
    pub us: Vec<DVector<Scalar>>,
    pub lams: Vec<DVector<Scalar>>,
    pub vs: Vec<DVector<Scalar>>,
}
