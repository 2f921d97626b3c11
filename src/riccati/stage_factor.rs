//! Per-knot Riccati workspace: value-function blocks, feedback gains, and
//! the factorization scratch needed to re-use the condensed Hamiltonian.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::scalar::{IndexType, Scalar};

/// Value-function and feedback data produced by the backward pass for one
/// knot. `nth > 0` only for the last knot of a non-final parallel leg.
pub struct StageFactor {
    pub nx: IndexType,
    pub nu: IndexType,
    pub nth: IndexType,

    /// Value function `V(x) = 1/2 x'Px + p'x + ...` blocks.
    pub p_mat: DMatrix<Scalar>,
    pub p_vec: DVector<Scalar>,
    pub v_tt: DMatrix<Scalar>,
    pub v_xt: DMatrix<Scalar>,
    pub v_t: DVector<Scalar>,

    /// Control feedback: `u = K x + k + Kth theta`.
    pub k_fb: DMatrix<Scalar>,
    pub k_ff: DVector<Scalar>,
    pub k_th: DMatrix<Scalar>,

    /// Dual (costate) feedback: `lambda = Kz x + kz + Kzth theta`.
    pub kz_fb: DMatrix<Scalar>,
    pub kz_ff: DVector<Scalar>,
    pub kz_th: DMatrix<Scalar>,

    /// Cached Cholesky factor of the condensed `(u,u)` Hamiltonian block,
    /// kept around so a caller with the same Hamiltonian (e.g. iterative
    /// refinement) doesn't need to refactorize.
    pub huu_chol: Option<Cholesky<Scalar, Dyn>>,
}

impl StageFactor {
    pub fn zeros(nx: IndexType, nu: IndexType, nth: IndexType) -> Self {
        Self {
            nx,
            nu,
            nth,
            p_mat: DMatrix::zeros(nx, nx),
            p_vec: DVector::zeros(nx),
            v_tt: DMatrix::zeros(nth, nth),
            v_xt: DMatrix::zeros(nx, nth),
            v_t: DVector::zeros(nth),
            k_fb: DMatrix::zeros(nu, nx),
            k_ff: DVector::zeros(nu),
            k_th: DMatrix::zeros(nu, nth),
            kz_fb: DMatrix::zeros(nx, nx),
            kz_ff: DVector::zeros(nx),
            kz_th: DMatrix::zeros(nx, nth),
            huu_chol: None,
        }
    }
}
