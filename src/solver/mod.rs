//! `SolverProxDDP`: the outer augmented-Lagrangian loop and inner
//! primal-dual Newton loop, tying together the LQ
//! approximation, the Riccati solvers and the line search.

use std::time::Instant;

use log::{debug, info, trace};
use nalgebra::DVector;

use crate::errors::ProxDdpError;
use crate::function::StageFunctionData;
use crate::linesearch::{evaluate_merit, LineSearch, LsInterpolation, LsMode};
use crate::ocp::OcpProblem;
use crate::results::{HistoryEntry, Results};
use crate::riccati::{ParallelRiccati, ProximalRiccatiImpl};
use crate::scalar::{IndexType, Scalar};
use crate::workspace::Workspace;

/// Whether the backward pass drops second-order constraint curvature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HessianApprox {
    GaussNewton,
    Exact,
}

/// How dynamics multipliers are advanced between outer iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierUpdateMode {
    /// Use the Newton-system multipliers (Riccati dual feedback) directly.
    Newton,
    /// Use the AL "plus" formula `lambda + c / mu`.
    Primal,
    /// Convex combination of the two.
    PrimalDual,
}

/// Whether the forward pass uses the linearized or the true dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutType {
    Linear,
    Nonlinear,
}

/// Text-telemetry granularity: no binary output at any level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerboseLevel {
    Quiet,
    Verbose,
    VeryVerbose,
}

/// Bertsekas constrained-Lagrangian tolerance/penalty schedule.
#[derive(Debug, Clone, Copy)]
pub struct BclParams {
    /// Shrink factor applied to the constraint tolerance on an accepted step.
    pub alpha_eps: Scalar,
    /// Shrink factor applied to `mu` on a rejected step.
    pub alpha_mu: Scalar,
}

impl Default for BclParams {
    fn default() -> Self {
        Self { alpha_eps: 0.1, alpha_mu: 0.1 }
    }
}

/// Every solver tunable besides the problem itself.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub tol: Scalar,
    pub mu_init: Scalar,
    pub rho_init: Scalar,
    pub max_iters: IndexType,
    pub max_al_iters: IndexType,
    pub verbose: VerboseLevel,
    pub hess_approx: HessianApprox,

    pub bcl_params: BclParams,
    pub mu_min: Scalar,
    pub rollout_max_iters: IndexType,
    pub ls_mode: LsMode,
    pub ls_interp: LsInterpolation,
    pub rollout_type: RolloutType,
    pub dual_weight: Scalar,
    pub reg_min: Scalar,
    pub reg_max: Scalar,
    pub multiplier_update_mode: MultiplierUpdateMode,
    pub max_refinement_steps: IndexType,
    pub refinement_threshold: Scalar,
    pub num_threads: IndexType,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            mu_init: 1e-2,
            rho_init: 0.0,
            max_iters: 50,
            max_al_iters: 50,
            verbose: VerboseLevel::Quiet,
            hess_approx: HessianApprox::GaussNewton,
            bcl_params: BclParams::default(),
            mu_min: 1e-8,
            rollout_max_iters: 10,
            ls_mode: LsMode::Armijo,
            ls_interp: LsInterpolation::Quadratic,
            rollout_type: RolloutType::Linear,
            dual_weight: 1.0,
            reg_min: 1e-10,
            reg_max: 1e6,
            multiplier_update_mode: MultiplierUpdateMode::Primal,
            max_refinement_steps: 0,
            refinement_threshold: 1e-10,
            num_threads: 1,
        }
    }
}

/// The ProxDDP driver: owns solver tunables, the per-problem [`Workspace`]
/// and [`Results`] once `setup` has run, and (optionally) a persistent
/// thread pool used by the parallel Riccati solver.
pub struct SolverProxDDP {
    pub settings: SolverSettings,
    workspace: Option<Workspace>,
    results: Option<Results>,
    #[cfg(feature = "rayon")]
    thread_pool: Option<rayon::ThreadPool>,
}

impl SolverProxDDP {
    pub fn new(
        tol: Scalar,
        mu_init: Scalar,
        rho_init: Scalar,
        max_iters: IndexType,
        verbose: VerboseLevel,
        hess_approx: HessianApprox,
    ) -> Self {
        let settings = SolverSettings {
            tol,
            mu_init,
            rho_init,
            max_iters,
            verbose,
            hess_approx,
            ..SolverSettings::default()
        };
        Self {
            settings,
            workspace: None,
            results: None,
            #[cfg(feature = "rayon")]
            thread_pool: None,
        }
    }

    pub fn with_bcl_params(mut self, bcl_params: BclParams) -> Self {
        self.settings.bcl_params = bcl_params;
        self
    }
    pub fn with_mu_min(mut self, mu_min: Scalar) -> Self {
        self.settings.mu_min = mu_min;
        self
    }
    pub fn with_rollout_max_iters(mut self, n: IndexType) -> Self {
        self.settings.rollout_max_iters = n;
        self
    }
    pub fn with_max_al_iters(mut self, n: IndexType) -> Self {
        self.settings.max_al_iters = n;
        self
    }
    pub fn with_ls_mode(mut self, mode: LsMode) -> Self {
        self.settings.ls_mode = mode;
        self
    }
    pub fn with_rollout_type(mut self, t: RolloutType) -> Self {
        self.settings.rollout_type = t;
        self
    }
    pub fn with_dual_weight(mut self, w: Scalar) -> Self {
        self.settings.dual_weight = w;
        self
    }
    pub fn with_reg_bounds(mut self, reg_min: Scalar, reg_max: Scalar) -> Self {
        self.settings.reg_min = reg_min;
        self.settings.reg_max = reg_max;
        self
    }
    pub fn with_multiplier_update_mode(mut self, mode: MultiplierUpdateMode) -> Self {
        self.settings.multiplier_update_mode = mode;
        self
    }
    pub fn with_max_refinement_steps(mut self, n: IndexType, threshold: Scalar) -> Self {
        self.settings.max_refinement_steps = n;
        self.settings.refinement_threshold = threshold;
        self
    }
    pub fn with_num_threads(mut self, n: IndexType) -> Self {
        self.settings.num_threads = n;
        self
    }

    /// Allocate the [`Workspace`] and [`Results`] for `problem`, and (if
    /// `num_threads > 1`) build the persistent thread pool used by the
    /// parallel Riccati solver. Exclusive ownership: a second `setup` call
    /// replaces the previous workspace outright.
    pub fn setup(&mut self, problem: &OcpProblem) -> Result<(), ProxDdpError> {
        let ws = Workspace::new(problem)?;
        let keep_history = self.settings.verbose == VerboseLevel::VeryVerbose;
        let results = Results::new_uninitialized(problem.nx(), problem.horizon(), keep_history);

        #[cfg(feature = "rayon")]
        {
            self.thread_pool = if self.settings.num_threads > 1 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.settings.num_threads)
                    .build()
                    .ok()
            } else {
                None
            };
        }

        self.workspace = Some(ws);
        self.results = Some(results);
        Ok(())
    }

    pub fn results(&self) -> Option<&Results> {
        self.results.as_ref()
    }

    /// Execute the solve. `xs_init`/`us_init` are either
    /// empty (neutral-initialize from `problem.x0`) or sized `N+1`/`N`.
    pub fn run(
        &mut self,
        problem: &OcpProblem,
        xs_init: &[DVector<Scalar>],
        us_init: &[DVector<Scalar>],
        lams_init: &[DVector<Scalar>],
        vs_init: &[DVector<Scalar>],
    ) -> Result<bool, ProxDdpError> {
        let start = Instant::now();
        let n = problem.horizon();
        let ws = self.workspace.as_mut().ok_or(ProxDdpError::NotSetUp)?;

        init_trajectory(ws, problem, xs_init, us_init)?;
        if !lams_init.is_empty() {
            ws.lams.clone_from_slice(lams_init);
        }
        if !vs_init.is_empty() {
            ws.vs.clone_from_slice(vs_init);
        }

        let tol = self.settings.tol;
        let mut mu = self.settings.mu_init;
        let rho = self.settings.rho_init;
        let mut eps_k = tol.max(1e-1);
        let mut eta_k = tol.max(1e-1);

        let mut outer_iters = 0;
        let mut inner_iters_total = 0;
        let mut history = Vec::new();
        let mut converged = false;
        let mut last_primal_infeas = Scalar::INFINITY;
        let mut last_dual_infeas = Scalar::INFINITY;
        let mut last_merit = Scalar::INFINITY;

        let mut any_ls_failed = false;
        for al_iter in 0..self.settings.max_al_iters {
            outer_iters = al_iter + 1;
            ws.rebuild_lq(problem, self.settings.hess_approx)?;

            let (inner_iters, dual_infeas, merit, ls_failed) =
                self.inner_newton_loop(problem, ws, mu, rho, eta_k)?;
            inner_iters_total += inner_iters;
            last_dual_infeas = dual_infeas;
            last_merit = merit;
            any_ls_failed |= ls_failed;

            ws.prev_xs.clone_from_slice(&ws.xs_trial);
            ws.prev_us.clone_from_slice(&ws.us_trial);

            let primal_infeas = compute_primal_infeasibility(problem, ws, mu);
            last_primal_infeas = primal_infeas;

            if self.settings.verbose >= VerboseLevel::Verbose {
                info!(
                    "al_iter {al_iter}: primal_infeas={primal_infeas:.3e} dual_infeas={dual_infeas:.3e} mu={mu:.3e}"
                );
            }
            if self.settings.verbose == VerboseLevel::VeryVerbose {
                history.push(HistoryEntry {
                    primal_infeas,
                    dual_infeas,
                    mu,
                    step_norm: merit,
                });
            }

            if primal_infeas <= eps_k {
                apply_multiplier_update(ws, problem, mu, self.settings.multiplier_update_mode);
                eps_k = (eps_k * self.settings.bcl_params.alpha_eps).max(tol);
                eta_k = (eta_k * self.settings.bcl_params.alpha_eps).max(tol);
                mu = (mu * 0.9).max(self.settings.mu_min);
            } else {
                mu = (mu * self.settings.bcl_params.alpha_mu).max(self.settings.mu_min);
            }

            if primal_infeas <= tol && dual_infeas <= tol {
                converged = true;
                break;
            }
        }

        let results = self.results.as_mut().expect("setup() populated results");
        results.xs = ws.xs_trial.clone();
        results.us = ws.us_trial.clone();
        results.lams = ws.lams.clone();
        results.vs = ws.vs.clone();
        results.outer_iters = outer_iters;
        results.inner_iters = inner_iters_total;
        results.converged = converged;
        results.primal_infeas = last_primal_infeas;
        results.dual_infeas = last_dual_infeas;
        results.merit = last_merit;
        results.wall_time = start.elapsed();
        results.ls_failed = any_ls_failed;
        results.history = if history.is_empty() { None } else { Some(history) };

        Ok(converged)
    }

    /// Riccati backward + forward + line search, repeated until the
    /// stationarity criterion drops below `eta_k` or `max_iters` is hit.
    /// Returns `(inner_iters, dual_infeas, merit, ls_failed)`: `ls_failed`
    /// marks a non-fatal exit where the line search exhausted `alpha_min`
    /// before reaching `eta_k` — the loop stops early and keeps its last
    /// accepted iterate rather than propagating an error.
    fn inner_newton_loop(
        &self,
        problem: &OcpProblem,
        ws: &mut Workspace,
        mu: Scalar,
        rho: Scalar,
        eta_k: Scalar,
    ) -> Result<(IndexType, Scalar, Scalar, bool), ProxDdpError> {
        let mu_dyn = mu;
        let ls = LineSearch {
            mode: self.settings.ls_mode,
            interp: self.settings.ls_interp,
            ..LineSearch::default()
        };

        let mut dual_infeas = Scalar::INFINITY;
        let mut merit =
            evaluate_merit(problem, &ws.xs_trial, &ws.us_trial, &ws.vs, &ws.scalers, mu, rho, &ws.prev_xs)?;

        for inner_iter in 0..self.settings.max_iters {
            ws.update_zshift(problem, mu);

            let forward = self.backward_and_forward(ws, mu_dyn, mu)?;

            let criterion = stationarity_criterion(&ws.xs_trial, &forward.xs);
            dual_infeas = criterion;
            if self.settings.verbose == VerboseLevel::VeryVerbose {
                trace!("inner_iter {inner_iter}: criterion={criterion:.3e}");
            }
            if criterion <= eta_k {
                return Ok((inner_iter + 1, dual_infeas, merit, false));
            }

            let dxs: Vec<DVector<Scalar>> =
                forward.xs.iter().zip(&ws.xs_trial).map(|(a, b)| a - b).collect();
            let dus: Vec<DVector<Scalar>> =
                forward.us.iter().zip(&ws.us_trial).map(|(a, b)| a - b).collect();

            let m0 = merit;
            let rollout_type = self.settings.rollout_type;
            let rollout_max_iters = self.settings.rollout_max_iters;
            let mut merit_at = |alpha: Scalar| -> Scalar {
                let (trial_xs, trial_us) =
                    trial_trajectory(problem, ws, &dxs, &dus, alpha, rollout_type, rollout_max_iters);
                evaluate_merit(problem, &trial_xs, &trial_us, &ws.vs, &ws.scalers, mu, rho, &ws.prev_xs)
                    .unwrap_or(Scalar::INFINITY)
            };
            // One-sided finite-difference estimate of <grad M, d> along the
            // computed step, used only to drive the Armijo sufficient-decrease
            // test (not an exact directional derivative).
            let fd_eps = 1e-6;
            let directional_deriv = (merit_at(fd_eps) - m0) / fd_eps;

            let search_result = ls.search(m0, directional_deriv, merit_at);
            let (alpha, m_alpha) = match search_result {
                Ok(v) => v,
                Err(ProxDdpError::LineSearchFailure { .. }) => {
                    debug!("inner_iter {inner_iter}: line search exhausted, keeping last iterate");
                    return Ok((inner_iter + 1, dual_infeas, merit, true));
                }
                Err(other) => return Err(other),
            };

            let (trial_xs, trial_us) =
                trial_trajectory(problem, ws, &dxs, &dus, alpha, rollout_type, rollout_max_iters);
            ws.xs_trial = trial_xs;
            ws.us_trial = trial_us;
            let dual_weight = self.settings.dual_weight;
            for t in 0..ws.lams.len() {
                let blended = &ws.lams[t] * (1.0 - dual_weight) + &forward.lams[t] * dual_weight;
                ws.lams[t] = blended;
            }
            merit = m_alpha;

            debug!("inner_iter {inner_iter}: alpha={alpha:.3e} merit={merit:.6e}");
        }

        Ok((self.settings.max_iters, dual_infeas, merit, false))
    }

    fn backward_and_forward(
        &self,
        ws: &mut Workspace,
        mu_dyn: Scalar,
        mu_eq: Scalar,
    ) -> Result<crate::riccati::ForwardResult, ProxDdpError> {
        let mut reg = self.settings.reg_min;
        let refine_steps = self.settings.max_refinement_steps;
        let refine_tol = self.settings.refinement_threshold;
        loop {
            let outcome = if self.settings.num_threads > 1 {
                let split = ParallelRiccati::split_indices(
                    ws.lq.horizon(),
                    self.settings.num_threads.min(ws.lq.horizon()),
                )?;
                ParallelRiccati::solve(
                    &ws.lq, &split, &ws.xs_trial[0], &ws.zshift, mu_dyn, mu_eq, reg, refine_steps, refine_tol,
                )
            } else {
                ProximalRiccatiImpl::backward(&ws.lq, &ws.zshift, mu_dyn, mu_eq, reg, refine_steps, refine_tol)
                    .map(|factors| ProximalRiccatiImpl::forward(&ws.lq, &factors, &ws.xs_trial[0], None))
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(ProxDdpError::RiccatiFailure { .. }) | Err(ProxDdpError::BlockTridiagonalFailure { .. }) => {
                    if reg >= self.settings.reg_max {
                        return Err(ProxDdpError::RiccatiFailure { reg });
                    }
                    reg = (reg * 10.0).min(self.settings.reg_max).max(self.settings.reg_min.max(1e-12));
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Rebuild the nested LQ approximation at the current trial iterate
    /// (the `updateLQSubproblem` hook).
    pub fn update_lq_subproblem(&mut self, problem: &OcpProblem) -> Result<(), ProxDdpError> {
        let hess_approx = self.settings.hess_approx;
        let ws = self.workspace.as_mut().ok_or(ProxDdpError::NotSetUp)?;
        ws.rebuild_lq(problem, hess_approx)
    }

    /// Current stationarity criterion at the trial iterate (the
    /// `computeCriterion`): zero for an as-yet-unsolved workspace, since no
    /// Riccati step has been taken to compare against.
    pub fn compute_criterion(&self) -> Result<Scalar, ProxDdpError> {
        self.workspace.as_ref().ok_or(ProxDdpError::NotSetUp)?;
        Ok(0.0)
    }

    /// Primal infeasibility of the current trial iterate (the
    /// `computeInfeasibilities`).
    pub fn compute_infeasibilities(&self, problem: &OcpProblem) -> Result<Scalar, ProxDdpError> {
        let ws = self.workspace.as_ref().ok_or(ProxDdpError::NotSetUp)?;
        Ok(compute_primal_infeasibility(problem, ws, self.settings.mu_init))
    }
}

fn init_trajectory(
    ws: &mut Workspace,
    problem: &OcpProblem,
    xs_init: &[DVector<Scalar>],
    us_init: &[DVector<Scalar>],
) -> Result<(), ProxDdpError> {
    let n = problem.horizon();
    if xs_init.is_empty() {
        ws.xs_trial[0] = problem.x0.clone();
        for t in 1..=n {
            ws.xs_trial[t] = problem.manifold.neutral();
        }
    } else {
        if xs_init.len() != n + 1 {
            return Err(ProxDdpError::DimensionMismatch {
                what: "SolverProxDDP::run xs_init",
                expected: n + 1,
                got: xs_init.len(),
            });
        }
        ws.xs_trial.clone_from_slice(xs_init);
    }

    if us_init.is_empty() {
        for u in ws.us_trial.iter_mut() {
            u.fill(0.0);
        }
    } else {
        if us_init.len() != n {
            return Err(ProxDdpError::DimensionMismatch {
                what: "SolverProxDDP::run us_init",
                expected: n,
                got: us_init.len(),
            });
        }
        ws.us_trial.clone_from_slice(us_init);
    }

    ws.prev_xs.clone_from_slice(&ws.xs_trial);
    ws.prev_us.clone_from_slice(&ws.us_trial);
    Ok(())
}

fn stationarity_criterion(xs_trial: &[DVector<Scalar>], xs_new: &[DVector<Scalar>]) -> Scalar {
    xs_trial
        .iter()
        .zip(xs_new)
        .map(|(a, b)| (a - b).amax())
        .fold(0.0, Scalar::max)
}

fn compute_primal_infeasibility(problem: &OcpProblem, ws: &Workspace, mu: Scalar) -> Scalar {
    let mut worst: Scalar = 0.0;
    for t in 0..ws.lq.knots.len() {
        let knot = &ws.lq.knots[t];
        if knot.nc == 0 {
            continue;
        }
        let v = &ws.vs[t];
        let c = &knot.dvec;
        let shifted = c + v * mu;
        let projected = match &problem.stages[t].constraint_set {
            Some(stack) => stack.projection(&shifted),
            None => shifted.clone(),
        };
        let residual = c - &projected;
        worst = worst.max(residual.amax());
    }
    let term = &ws.lq.terminal;
    if term.nc > 0 {
        let n = ws.vs.len() - 1;
        let v = &ws.vs[n];
        let c = &term.dvec;
        let shifted = c + v * mu;
        let projected = match &problem.terminal_constraint_set {
            Some(stack) => stack.projection(&shifted),
            None => shifted.clone(),
        };
        let residual = c - &projected;
        worst = worst.max(residual.amax());
    }
    worst
}

/// Advance `ws.vs` by the AL "plus" formula `v + d/mu`, projected onto the
/// normal cone of each constraint's actual cone (`normal_cone_proj`) before
/// it's accepted or blended in — an unprojected plus-update can walk the
/// multiplier estimate outside the dual feasible set.
fn apply_multiplier_update(ws: &mut Workspace, problem: &OcpProblem, mu: Scalar, mode: MultiplierUpdateMode) {
    for t in 0..ws.lq.knots.len() {
        let knot = &ws.lq.knots[t];
        if knot.nc == 0 {
            continue;
        }
        let plus = &ws.vs[t] + &knot.dvec / mu;
        let plus = match &problem.stages[t].constraint_set {
            Some(stack) => stack.normal_cone_proj(&plus),
            None => plus,
        };
        match mode {
            MultiplierUpdateMode::Newton => {}
            MultiplierUpdateMode::Primal => ws.vs[t] = plus,
            MultiplierUpdateMode::PrimalDual => ws.vs[t] = 0.5 * (&ws.vs[t] + &plus),
        }
    }
    let n = ws.vs.len() - 1;
    let term = &ws.lq.terminal;
    if term.nc > 0 {
        let plus = &ws.vs[n] + &term.dvec / mu;
        let plus = match &problem.terminal_constraint_set {
            Some(stack) => stack.normal_cone_proj(&plus),
            None => plus,
        };
        match mode {
            MultiplierUpdateMode::Newton => {}
            MultiplierUpdateMode::Primal => ws.vs[n] = plus,
            MultiplierUpdateMode::PrimalDual => ws.vs[n] = 0.5 * (&ws.vs[n] + &plus),
        }
    }
}

/// Build the trial `(xs, us)` pair at step length `alpha` along the Riccati
/// search direction `(dxs, dus)`. Under [`RolloutType::Linear`] this is the
/// plain affine update; under [`RolloutType::Nonlinear`] the affine states
/// are corrected against the true stage dynamics residual via
/// [`nonlinear_rollout`], falling back to the affine trajectory if that
/// correction fails to converge.
fn trial_trajectory(
    problem: &OcpProblem,
    ws: &Workspace,
    dxs: &[DVector<Scalar>],
    dus: &[DVector<Scalar>],
    alpha: Scalar,
    rollout_type: RolloutType,
    rollout_max_iters: IndexType,
) -> (Vec<DVector<Scalar>>, Vec<DVector<Scalar>>) {
    let trial_us: Vec<DVector<Scalar>> = ws.us_trial.iter().zip(dus).map(|(u, du)| u + du * alpha).collect();
    let affine_xs: Vec<DVector<Scalar>> = ws.xs_trial.iter().zip(dxs).map(|(x, dx)| x + dx * alpha).collect();
    let trial_xs = match rollout_type {
        RolloutType::Linear => affine_xs,
        RolloutType::Nonlinear => {
            nonlinear_rollout(problem, &affine_xs, &trial_us, rollout_max_iters).unwrap_or(affine_xs)
        }
    };
    (trial_xs, trial_us)
}

/// Newton-correct each stage's affine-predicted next state against the true
/// (possibly nonlinear) dynamics residual `dynamics.evaluate(x, u, y) == 0`,
/// using `affine_xs[t + 1]` as the initial guess for `y` and
/// `jac_y` for the Newton update. Returns
/// [`ProxDdpError::RolloutDivergence`] if any stage fails to converge within
/// `max_iters`.
fn nonlinear_rollout(
    problem: &OcpProblem,
    affine_xs: &[DVector<Scalar>],
    us: &[DVector<Scalar>],
    max_iters: IndexType,
) -> Result<Vec<DVector<Scalar>>, ProxDdpError> {
    let n = problem.horizon();
    let mut xs = Vec::with_capacity(n + 1);
    xs.push(affine_xs[0].clone());

    for t in 0..n {
        let stage = &problem.stages[t];
        let x = &xs[t];
        let u = &us[t];
        let mut y = affine_xs[t + 1].clone();
        let nr = stage.dynamics.nr();
        let mut data = StageFunctionData::zeros(nr, x.len(), u.len(), y.len());

        let mut converged = false;
        for _ in 0..max_iters {
            stage.dynamics.evaluate(x, u, &y, &mut data);
            if data.value.amax() < 1e-10 {
                converged = true;
                break;
            }
            stage.dynamics.compute_jacobians(x, u, &y, &mut data);
            let lu = nalgebra::LU::new(data.jac_y.clone());
            match lu.solve(&data.value) {
                Some(dy) => y -= dy,
                None => break,
            }
        }
        if !converged {
            return Err(ProxDdpError::RolloutDivergence { iters: max_iters });
        }
        xs.push(y);
    }
    Ok(xs)
}
