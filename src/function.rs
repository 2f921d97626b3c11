//! Stage-function contract: dynamics and path-constraint residuals.

use nalgebra::{DMatrix, DVector};

use crate::scalar::{IndexType, Scalar};

/// Per-evaluation scratch for a [`StageFunction`].
///
/// Owned by the caller (the workspace or a transient evaluation site), never
/// by the function itself: stage models are the owners of their own
/// parameters, not of per-call scratch.
#[derive(Debug, Clone)]
pub struct StageFunctionData {
    pub value: DVector<Scalar>,
    pub jac_x: DMatrix<Scalar>,
    pub jac_u: DMatrix<Scalar>,
    pub jac_y: DMatrix<Scalar>,
}

impl StageFunctionData {
    pub fn zeros(nr: IndexType, ndx: IndexType, nu: IndexType, ndx_next: IndexType) -> Self {
        Self {
            value: DVector::zeros(nr),
            jac_x: DMatrix::zeros(nr, ndx),
            jac_u: DMatrix::zeros(nr, nu),
            jac_y: DMatrix::zeros(nr, ndx_next),
        }
    }
}

/// A stage function `(x, u, y) -> residual`, where `y` is the next-state
/// tangent. Dynamics are a stage function with `nr == ndx_next`.
pub trait StageFunction {
    /// Residual dimension.
    fn nr(&self) -> IndexType;

    fn evaluate(
        &self,
        x: &DVector<Scalar>,
        u: &DVector<Scalar>,
        y: &DVector<Scalar>,
        data: &mut StageFunctionData,
    );

    fn compute_jacobians(
        &self,
        x: &DVector<Scalar>,
        u: &DVector<Scalar>,
        y: &DVector<Scalar>,
        data: &mut StageFunctionData,
    );

    /// Second-order vector-Hessian product contraction with a dual vector
    /// `lambda`, added into `(hxx, huu, hxu)`. Default is a no-op (linear
    /// function / Gauss-Newton approximation drops this term).
    fn compute_vector_hessian_products(
        &self,
        _x: &DVector<Scalar>,
        _u: &DVector<Scalar>,
        _y: &DVector<Scalar>,
        _lambda: &DVector<Scalar>,
        _hxx: &mut DMatrix<Scalar>,
        _huu: &mut DMatrix<Scalar>,
        _hxu: &mut DMatrix<Scalar>,
    ) {
    }
}

/// A stage function depending on `x` only (e.g. a terminal constraint).
pub trait UnaryFunction {
    fn nr(&self) -> IndexType;

    fn evaluate(&self, x: &DVector<Scalar>, data: &mut StageFunctionData);

    fn compute_jacobian(&self, x: &DVector<Scalar>, data: &mut StageFunctionData);
}
