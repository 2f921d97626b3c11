//! The [`Cost`] contract: stage and terminal cost callbacks.

use nalgebra::{DMatrix, DVector};

use crate::scalar::Scalar;

/// Scratch for one cost evaluation: value, gradients, Hessian blocks.
#[derive(Debug, Clone)]
pub struct CostData {
    pub value: Scalar,
    pub lx: DVector<Scalar>,
    pub lu: DVector<Scalar>,
    pub lxx: DMatrix<Scalar>,
    pub luu: DMatrix<Scalar>,
    pub lxu: DMatrix<Scalar>,
}

impl CostData {
    pub fn zeros(ndx: usize, nu: usize) -> Self {
        Self {
            value: 0.0,
            lx: DVector::zeros(ndx),
            lu: DVector::zeros(nu),
            lxx: DMatrix::zeros(ndx, ndx),
            luu: DMatrix::zeros(nu, nu),
            lxu: DMatrix::zeros(ndx, nu),
        }
    }
}

/// A stage or terminal cost `l(x, u)`. Terminal costs are evaluated with an
/// empty `u` (`nu() == 0`).
pub trait Cost {
    fn ndx(&self) -> usize;
    fn nu(&self) -> usize;

    fn evaluate(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> Scalar;

    fn compute_gradients(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, data: &mut CostData);

    fn compute_hessians(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, data: &mut CostData);
}

/// `l(x, u) = 1/2 x'Qx + 1/2 u'Ru + u'Sx + q'x + r'u`.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    pub q: DMatrix<Scalar>,
    pub r: DMatrix<Scalar>,
    pub s: DMatrix<Scalar>,
    pub qvec: DVector<Scalar>,
    pub rvec: DVector<Scalar>,
}

impl QuadraticCost {
    pub fn new(
        q: DMatrix<Scalar>,
        r: DMatrix<Scalar>,
        s: DMatrix<Scalar>,
        qvec: DVector<Scalar>,
        rvec: DVector<Scalar>,
    ) -> Self {
        debug_assert_eq!(q.nrows(), q.ncols());
        debug_assert_eq!(r.nrows(), r.ncols());
        debug_assert_eq!(s.nrows(), r.nrows());
        debug_assert_eq!(s.ncols(), q.nrows());
        Self { q, r, s, qvec, rvec }
    }

    /// Terminal (control-free) quadratic cost `1/2 x'Qx + q'x`.
    pub fn terminal(q: DMatrix<Scalar>, qvec: DVector<Scalar>) -> Self {
        let n = q.nrows();
        Self {
            q,
            r: DMatrix::zeros(0, 0),
            s: DMatrix::zeros(0, n),
            qvec,
            rvec: DVector::zeros(0),
        }
    }
}

impl Cost for QuadraticCost {
    fn ndx(&self) -> usize {
        self.q.nrows()
    }

    fn nu(&self) -> usize {
        self.r.nrows()
    }

    fn evaluate(&self, x: &DVector<Scalar>, u: &DVector<Scalar>) -> Scalar {
        let mut v = 0.5 * (x.transpose() * &self.q * x)[(0, 0)] + (self.qvec.dot(x));
        if self.nu() > 0 {
            v += 0.5 * (u.transpose() * &self.r * u)[(0, 0)]
                + (u.transpose() * &self.s * x)[(0, 0)]
                + self.rvec.dot(u);
        }
        v
    }

    fn compute_gradients(&self, x: &DVector<Scalar>, u: &DVector<Scalar>, data: &mut CostData) {
        data.lx = &self.q * x + &self.qvec;
        if self.nu() > 0 {
            data.lx += self.s.transpose() * u;
            data.lu = &self.r * u + &self.s * x + &self.rvec;
        }
    }

    fn compute_hessians(&self, _x: &DVector<Scalar>, _u: &DVector<Scalar>, data: &mut CostData) {
        data.lxx = self.q.clone();
        data.luu = self.r.clone();
        data.lxu = self.s.transpose();
    }
}
