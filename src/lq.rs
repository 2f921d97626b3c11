//! The per-stage linear-quadratic data model.

use nalgebra::{DMatrix, DVector};

use crate::scalar::{IndexType, Scalar};

/// One time-step's worth of linear-quadratic data.
///
/// Value-semantic: supports `Clone` (copy), structural `PartialEq`, and
/// [`std::mem::swap`] via ordinary move semantics — there is no interior
/// mutability or shared ownership here, so the derived/manual impls below
/// already give knots the value behaviour the Riccati passes need.
#[derive(Debug, Clone)]
pub struct LqKnot {
    pub nx: IndexType,
    pub nu: IndexType,
    pub nc: IndexType,
    pub nth: IndexType,

    // cost blocks
    pub q: DMatrix<Scalar>,
    pub r: DMatrix<Scalar>,
    pub s: DMatrix<Scalar>,
    pub qvec: DVector<Scalar>,
    pub rvec: DVector<Scalar>,

    // dynamics: A x + B u + E x' + f = 0
    pub a: DMatrix<Scalar>,
    pub b: DMatrix<Scalar>,
    pub e: DMatrix<Scalar>,
    pub f: DVector<Scalar>,

    // path constraints: C x + D u + d in cone
    pub c: DMatrix<Scalar>,
    pub d: DMatrix<Scalar>,
    pub dvec: DVector<Scalar>,

    // optional parameterization linking to a vector parameter theta
    pub gx: Option<DMatrix<Scalar>>,
    pub gu: Option<DMatrix<Scalar>>,
    pub gamma: Option<DMatrix<Scalar>>,
    pub gammavec: Option<DVector<Scalar>>,
}

impl PartialEq for LqKnot {
    fn eq(&self, other: &Self) -> bool {
        self.nx == other.nx
            && self.nu == other.nu
            && self.nc == other.nc
            && self.nth == other.nth
            && self.q == other.q
            && self.r == other.r
            && self.s == other.s
            && self.qvec == other.qvec
            && self.rvec == other.rvec
            && self.a == other.a
            && self.b == other.b
            && self.e == other.e
            && self.f == other.f
            && self.c == other.c
            && self.d == other.d
            && self.dvec == other.dvec
            && self.gx == other.gx
            && self.gu == other.gu
            && self.gamma == other.gamma
            && self.gammavec == other.gammavec
    }
}

impl LqKnot {
    /// Build a knot with zeroed cost/dynamics/constraint blocks of the given
    /// dimensions, and no parameterization.
    pub fn zeros(nx: IndexType, nu: IndexType, nc: IndexType) -> Self {
        Self {
            nx,
            nu,
            nc,
            nth: 0,
            q: DMatrix::zeros(nx, nx),
            r: DMatrix::zeros(nu, nu),
            s: DMatrix::zeros(nu, nx),
            qvec: DVector::zeros(nx),
            rvec: DVector::zeros(nu),
            a: DMatrix::zeros(nx, nx),
            b: DMatrix::zeros(nx, nu),
            e: DMatrix::zeros(nx, nx),
            f: DVector::zeros(nx),
            c: DMatrix::zeros(nc, nx),
            d: DMatrix::zeros(nc, nu),
            dvec: DVector::zeros(nc),
            gx: None,
            gu: None,
            gamma: None,
            gammavec: None,
        }
    }

    /// Allocate a parameterization of size `nth`, linking this knot's
    /// feedforward/feedback to a vector parameter theta (used to glue
    /// parallel-Riccati legs together). Leaves all other blocks unchanged.
    pub fn add_parameterization(&mut self, nth: IndexType) {
        self.nth = nth;
        self.gx = Some(DMatrix::zeros(nth, self.nx));
        self.gu = Some(DMatrix::zeros(nth, self.nu));
        self.gamma = Some(DMatrix::zeros(nth, nth));
        self.gammavec = Some(DVector::zeros(nth));
    }

    pub fn has_parameterization(&self) -> bool {
        self.nth > 0
    }
}

/// The full horizon: initial constraint, ordered knots, terminal cost and
/// optional terminal constraint (modelled as a knot with `nu == 0`).
#[derive(Debug, Clone)]
pub struct LqProblem {
    /// Initial-state constraint `G0 x0 + g0 = 0` (or in a cone, in general).
    pub g0: DMatrix<Scalar>,
    pub gvec0: DVector<Scalar>,
    pub nc0: IndexType,

    pub knots: Vec<LqKnot>,
    pub terminal: LqKnot,
}

impl PartialEq for LqProblem {
    fn eq(&self, other: &Self) -> bool {
        self.g0 == other.g0
            && self.gvec0 == other.gvec0
            && self.nc0 == other.nc0
            && self.knots == other.knots
            && self.terminal == other.terminal
    }
}

impl LqProblem {
    pub fn horizon(&self) -> IndexType {
        self.knots.len()
    }

    pub fn nx0(&self) -> IndexType {
        self.knots.first().map(|k| k.nx).unwrap_or(self.terminal.nx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_equals_original() {
        let mut k = LqKnot::zeros(2, 1, 0);
        k.q[(0, 0)] = 3.0;
        let k2 = k.clone();
        assert_eq!(k, k2);
    }

    #[test]
    fn swap_exchanges_contents() {
        let mut a = LqKnot::zeros(2, 1, 0);
        a.q[(0, 0)] = 1.0;
        let mut b = LqKnot::zeros(2, 1, 0);
        b.q[(0, 0)] = 2.0;
        let a_before = a.clone();
        let b_before = b.clone();
        std::mem::swap(&mut a, &mut b);
        assert_eq!(a, b_before);
        assert_eq!(b, a_before);
    }

    #[test]
    fn add_parameterization_leaves_core_blocks_unchanged() {
        let mut k = LqKnot::zeros(2, 1, 0);
        k.q[(0, 0)] = 5.0;
        k.a[(0, 0)] = 1.0;
        let (q, r, qvec, rvec, a, b, e, f) = (
            k.q.clone(),
            k.r.clone(),
            k.qvec.clone(),
            k.rvec.clone(),
            k.a.clone(),
            k.b.clone(),
            k.e.clone(),
            k.f.clone(),
        );
        k.add_parameterization(3);
        assert_eq!(k.q, q);
        assert_eq!(k.r, r);
        assert_eq!(k.qvec, qvec);
        assert_eq!(k.rvec, rvec);
        assert_eq!(k.a, a);
        assert_eq!(k.b, b);
        assert_eq!(k.e, e);
        assert_eq!(k.f, f);
        assert!(k.has_parameterization());
        assert_eq!(k.nth, 3);
    }
}
