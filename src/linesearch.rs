//! Merit function evaluation and step-acceptance line search.

use nalgebra::DVector;

use crate::errors::ProxDdpError;
use crate::ocp::OcpProblem;
use crate::scalar::Scalar;
use crate::scaler::ProxScaler;

/// Backtracking schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsMode {
    /// Backtrack from `alpha = 1` until sufficient decrease holds.
    Armijo,
    /// Accept the fixed step `alpha = 1` unconditionally (used once the
    /// outer iterate is already close to a stationary point).
    Nonmonotone,
}

/// How the next trial step length is chosen during backtracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsInterpolation {
    Bisection,
    Quadratic,
    Cubic,
}

/// Evaluate the AL-proximal merit function `M(xs, us, vs)`:
/// stage + terminal costs, plus the AL penalty term
/// `sum_j 1/(2 mu_j) ||proj_C(c_j + mu_j v_j) - mu_j v_j||^2` (`mu_j` the
/// per-block scaler-weighted penalty parameter), plus the proximal
/// term `1/2 rho ||x - x_prev||^2` in the manifold tangent space.
pub fn evaluate_merit(
    problem: &OcpProblem,
    xs: &[DVector<Scalar>],
    us: &[DVector<Scalar>],
    vs: &[DVector<Scalar>],
    scalers: &[ProxScaler],
    mu: Scalar,
    rho: Scalar,
    prev_xs: &[DVector<Scalar>],
) -> Result<Scalar, ProxDdpError> {
    problem.check_trajectory(xs, us)?;
    let n = problem.horizon();

    let mut merit = 0.0;
    for t in 0..n {
        let stage = &problem.stages[t];
        merit += stage.cost.evaluate(&xs[t], &us[t]);

        if let Some(cfun) = &stage.constraint_fn {
            let mut data = crate::function::StageFunctionData::zeros(cfun.nr(), xs[t].len(), us[t].len(), 0);
            cfun.evaluate(&xs[t], &us[t], &xs[t + 1], &mut data);
            merit += al_penalty_term(&problem.stages[t].constraint_set, &data.value, &vs[t], &scalers[t], mu);
        }
    }
    merit += problem.terminal_cost.evaluate(&xs[n], &DVector::zeros(0));
    if let Some(cfun) = &problem.terminal_constraint_fn {
        let mut data = crate::function::StageFunctionData::zeros(cfun.nr(), xs[n].len(), 0, 0);
        cfun.evaluate(&xs[n], &mut data);
        merit += al_penalty_term(&problem.terminal_constraint_set, &data.value, &vs[n], &scalers[n], mu);
    }

    if rho > 0.0 {
        for t in 0..=n {
            let dx = problem.manifold.difference(&prev_xs[t], &xs[t]);
            merit += 0.5 * rho * dx.dot(&dx);
        }
    }

    Ok(merit)
}

fn al_penalty_term(
    set: &Option<crate::constraint::ConstraintStack>,
    c: &DVector<Scalar>,
    v: &DVector<Scalar>,
    scaler: &ProxScaler,
    mu: Scalar,
) -> Scalar {
    if c.is_empty() {
        return 0.0;
    }
    let mu_vec = scaler.effective_mu_vec(mu);
    let shift = v.component_mul(&mu_vec);
    let shifted = c + &shift;
    let projected = match set {
        Some(stack) => stack.projection(&shifted),
        None => shifted.clone(),
    };
    let r = &projected - &shift;
    r.iter().zip(mu_vec.iter()).map(|(&ri, &mi)| 0.5 * ri * ri / mi).sum()
}

/// Armijo/nonmonotone backtracking over `alpha in {1, beta, beta^2, ...}`.
///
/// `merit_at` evaluates `M(alpha)` for a trial step length; `m0` and
/// `directional_deriv` are `M(0)` and `<grad M, d>` at the current iterate.
/// Returns the accepted `(alpha, M(alpha))`, or
/// [`ProxDdpError::LineSearchFailure`] once `alpha` drops below `alpha_min`
/// without sufficient decrease.
pub struct LineSearch {
    pub mode: LsMode,
    pub interp: LsInterpolation,
    pub c1: Scalar,
    pub beta: Scalar,
    pub alpha_min: Scalar,
}

impl Default for LineSearch {
    fn default() -> Self {
        Self {
            mode: LsMode::Armijo,
            interp: LsInterpolation::Quadratic,
            c1: 1e-4,
            beta: 0.5,
            alpha_min: 1e-8,
        }
    }
}

impl LineSearch {
    pub fn search(
        &self,
        m0: Scalar,
        directional_deriv: Scalar,
        mut merit_at: impl FnMut(Scalar) -> Scalar,
    ) -> Result<(Scalar, Scalar), ProxDdpError> {
        if self.mode == LsMode::Nonmonotone {
            return Ok((1.0, merit_at(1.0)));
        }

        let mut alpha = 1.0;
        let mut m_alpha = merit_at(alpha);
        let mut prev: Option<(Scalar, Scalar)> = None;

        loop {
            if m_alpha <= m0 + self.c1 * alpha * directional_deriv {
                return Ok((alpha, m_alpha));
            }
            if alpha <= self.alpha_min {
                return Err(ProxDdpError::LineSearchFailure { alpha_min: self.alpha_min });
            }

            let next_alpha = self.shrink(alpha, m0, directional_deriv, m_alpha, prev);
            prev = Some((alpha, m_alpha));
            alpha = next_alpha;
            m_alpha = merit_at(alpha);
        }
    }

    fn shrink(
        &self,
        alpha: Scalar,
        m0: Scalar,
        g0: Scalar,
        m_alpha: Scalar,
        prev: Option<(Scalar, Scalar)>,
    ) -> Scalar {
        let lo = 0.1 * alpha;
        let hi = 0.9 * alpha;
        match self.interp {
            LsInterpolation::Bisection => self.beta * alpha,
            LsInterpolation::Quadratic => {
                let denom = 2.0 * (m_alpha - m0 - g0 * alpha);
                if denom.abs() < 1e-14 {
                    self.beta * alpha
                } else {
                    (-g0 * alpha * alpha / denom).clamp(lo, hi)
                }
            }
            LsInterpolation::Cubic => match prev {
                None => {
                    let denom = 2.0 * (m_alpha - m0 - g0 * alpha);
                    if denom.abs() < 1e-14 {
                        self.beta * alpha
                    } else {
                        (-g0 * alpha * alpha / denom).clamp(lo, hi)
                    }
                }
                Some((alpha_prev, m_prev)) => {
                    let a1 = alpha * alpha;
                    let a2 = alpha_prev * alpha_prev;
                    let denom = a1 * a2 * (alpha - alpha_prev);
                    if denom.abs() < 1e-14 {
                        self.beta * alpha
                    } else {
                        let rhs1 = m_alpha - m0 - g0 * alpha;
                        let rhs2 = m_prev - m0 - g0 * alpha_prev;
                        let a = (a2 * rhs1 - a1 * rhs2) / denom;
                        let b = (-alpha_prev.powi(3) * rhs1 + alpha.powi(3) * rhs2) / denom;
                        if a.abs() < 1e-14 {
                            self.beta * alpha
                        } else {
                            let disc = b * b - 3.0 * a * g0;
                            if disc < 0.0 {
                                self.beta * alpha
                            } else {
                                ((-b + disc.sqrt()) / (3.0 * a)).clamp(lo, hi)
                            }
                        }
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armijo_accepts_full_step_on_strictly_decreasing_quadratic() {
        let ls = LineSearch::default();
        let (alpha, m) = ls.search(1.0, -2.0, |a| 1.0 - 2.0 * a + 0.01 * a * a).unwrap();
        assert_eq!(alpha, 1.0);
        assert!(m < 1.0);
    }

    #[test]
    fn armijo_backtracks_when_full_step_increases_merit() {
        let ls = LineSearch::default();
        let (alpha, _) = ls.search(1.0, -0.01, |a| 1.0 + 5.0 * a * a).unwrap();
        assert!(alpha < 1.0);
    }

    #[test]
    fn nonmonotone_always_accepts_unit_step() {
        let mut ls = LineSearch::default();
        ls.mode = LsMode::Nonmonotone;
        let (alpha, _) = ls.search(1.0, -0.01, |a| 1.0 + 5.0 * a * a).unwrap();
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn failure_when_no_decrease_possible() {
        let ls = LineSearch::default();
        let result = ls.search(1.0, -0.01, |_a| 100.0);
        assert!(result.is_err());
    }
}
