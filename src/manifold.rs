//! The [`Manifold`] contract: a differentiable state space with `integrate`/
//! `difference` tangent operations, plus a Euclidean fixture used by tests.

use nalgebra::{DMatrix, DVector};

use crate::scalar::{IndexType, Scalar};

/// A differentiable state space of nominal dimension `nx` and tangent
/// dimension `ndx`.
///
/// Invariant: `difference(x, integrate(x, dx)) == dx` to floating tolerance,
/// for any `x` in the manifold and any tangent vector `dx`.
pub trait Manifold {
    /// Ambient (possibly redundant) state dimension.
    fn nx(&self) -> IndexType;
    /// Tangent-space dimension.
    fn ndx(&self) -> IndexType;

    /// The manifold's neutral element (e.g. the origin for a vector space).
    fn neutral(&self) -> DVector<Scalar>;

    /// A random element, for tests and random-problem generators.
    fn rand(&self) -> DVector<Scalar>;

    /// `x' = integrate(x, dx)`.
    fn integrate(&self, x: &DVector<Scalar>, dx: &DVector<Scalar>) -> DVector<Scalar>;

    /// `dx = difference(x, y)`, i.e. the tangent vector taking `x` to `y`.
    fn difference(&self, x: &DVector<Scalar>, y: &DVector<Scalar>) -> DVector<Scalar>;

    /// Jacobians of `integrate(x, dx)` w.r.t. `(x, dx)`.
    fn integrate_jacobians(
        &self,
        x: &DVector<Scalar>,
        dx: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>);

    /// Jacobians of `difference(x, y)` w.r.t. `(x, y)`.
    fn difference_jacobians(
        &self,
        x: &DVector<Scalar>,
        y: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>);
}

/// Euclidean space `R^n`, where `integrate`/`difference` reduce to vector
/// addition/subtraction and `nx == ndx`.
#[derive(Debug, Clone, Copy)]
pub struct VectorSpace {
    n: IndexType,
}

impl VectorSpace {
    pub fn new(n: IndexType) -> Self {
        Self { n }
    }
}

impl Manifold for VectorSpace {
    fn nx(&self) -> IndexType {
        self.n
    }

    fn ndx(&self) -> IndexType {
        self.n
    }

    fn neutral(&self) -> DVector<Scalar> {
        DVector::zeros(self.n)
    }

    fn rand(&self) -> DVector<Scalar> {
        DVector::from_fn(self.n, |_, _| rand_unit())
    }

    fn integrate(&self, x: &DVector<Scalar>, dx: &DVector<Scalar>) -> DVector<Scalar> {
        x + dx
    }

    fn difference(&self, x: &DVector<Scalar>, y: &DVector<Scalar>) -> DVector<Scalar> {
        y - x
    }

    fn integrate_jacobians(
        &self,
        _x: &DVector<Scalar>,
        _dx: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>) {
        (DMatrix::identity(self.n, self.n), DMatrix::identity(self.n, self.n))
    }

    fn difference_jacobians(
        &self,
        _x: &DVector<Scalar>,
        _y: &DVector<Scalar>,
    ) -> (DMatrix<Scalar>, DMatrix<Scalar>) {
        let neg_id = -DMatrix::<Scalar>::identity(self.n, self.n);
        (neg_id, DMatrix::identity(self.n, self.n))
    }
}

/// Deterministic, dependency-free stand-in for a uniform sample in `[-1, 1]`.
/// Good enough for generating non-degenerate test fixtures; not a PRNG.
fn rand_unit() -> Scalar {
    use std::cell::Cell;
    thread_local! {
        static STATE: Cell<u64> = Cell::new(0x9E3779B97F4A7C15);
    }
    STATE.with(|s| {
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        ((x >> 11) as Scalar / (1u64 << 53) as Scalar) * 2.0 - 1.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vector_space_round_trip() {
        let m = VectorSpace::new(3);
        let x = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let dx = DVector::from_vec(vec![0.1, 0.2, -0.3]);
        let y = m.integrate(&x, &dx);
        let dx2 = m.difference(&x, &y);
        assert_relative_eq!(dx, dx2, epsilon = 1e-12);
    }
}
