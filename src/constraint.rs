//! Constraint-set contract and the fixture cones used by the solver's test
//! suite: equality, negative-orthant (inequality), and box constraints.

use nalgebra::DVector;

use crate::scalar::{IndexType, Scalar};

/// A closed convex set `C` with cheap projection and normal-cone test.
pub trait ConstraintSet {
    /// Dimension of the ambient space `C` lives in.
    fn dim(&self) -> IndexType;

    /// Euclidean projection of `z` onto `C`.
    fn projection(&self, z: &DVector<Scalar>) -> DVector<Scalar>;

    /// Projection of `z` onto the normal cone of `C` at `projection(z)`.
    fn normal_cone_proj(&self, z: &DVector<Scalar>) -> DVector<Scalar>;

    /// Whether `lambda` lies in the normal cone of `C` at `z`.
    fn is_in_normal_cone(&self, z: &DVector<Scalar>, lambda: &DVector<Scalar>) -> bool;

    /// Whether this block behaves like an equality constraint for the
    /// purposes of [`crate::scaler::ProxScaler::apply_default_scaling_strategy`].
    fn is_equality_like(&self) -> bool {
        false
    }
}

/// `C = {0}`: equality constraints `z = 0`.
#[derive(Debug, Clone, Copy)]
pub struct EqualityConstraintSet {
    n: IndexType,
}

impl EqualityConstraintSet {
    pub fn new(n: IndexType) -> Self {
        Self { n }
    }
}

impl ConstraintSet for EqualityConstraintSet {
    fn dim(&self) -> IndexType {
        self.n
    }

    fn projection(&self, _z: &DVector<Scalar>) -> DVector<Scalar> {
        DVector::zeros(self.n)
    }

    fn normal_cone_proj(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        z.clone()
    }

    fn is_in_normal_cone(&self, _z: &DVector<Scalar>, _lambda: &DVector<Scalar>) -> bool {
        true
    }

    fn is_equality_like(&self) -> bool {
        true
    }
}

/// `C = (-infinity, 0]^n`: the negative orthant, i.e. `g(x,u) <= 0`.
#[derive(Debug, Clone, Copy)]
pub struct NegativeOrthantConstraintSet {
    n: IndexType,
}

impl NegativeOrthantConstraintSet {
    pub fn new(n: IndexType) -> Self {
        Self { n }
    }
}

impl ConstraintSet for NegativeOrthantConstraintSet {
    fn dim(&self) -> IndexType {
        self.n
    }

    fn projection(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        z.map(|v| v.min(0.0))
    }

    fn normal_cone_proj(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        z.map(|v| v.max(0.0))
    }

    fn is_in_normal_cone(&self, z: &DVector<Scalar>, lambda: &DVector<Scalar>) -> bool {
        z.iter()
            .zip(lambda.iter())
            .all(|(&zi, &li)| zi <= 1e-10 && li >= -1e-10 && (zi * li).abs() <= 1e-8)
    }
}

/// `C = [lower, upper]` componentwise.
#[derive(Debug, Clone)]
pub struct BoxConstraintSet {
    pub lower: DVector<Scalar>,
    pub upper: DVector<Scalar>,
}

impl BoxConstraintSet {
    pub fn new(lower: DVector<Scalar>, upper: DVector<Scalar>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }
}

impl ConstraintSet for BoxConstraintSet {
    fn dim(&self) -> IndexType {
        self.lower.len()
    }

    fn projection(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        DVector::from_iterator(
            z.len(),
            z.iter()
                .zip(self.lower.iter())
                .zip(self.upper.iter())
                .map(|((&v, &lo), &hi)| v.clamp(lo, hi)),
        )
    }

    fn normal_cone_proj(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        z - self.projection(z)
    }

    fn is_in_normal_cone(&self, z: &DVector<Scalar>, lambda: &DVector<Scalar>) -> bool {
        z.iter().zip(lambda.iter()).enumerate().all(|(i, (&zi, &li))| {
            if zi <= self.lower[i] + 1e-10 {
                li <= 1e-10
            } else if zi >= self.upper[i] - 1e-10 {
                li >= -1e-10
            } else {
                li.abs() <= 1e-8
            }
        })
    }
}

/// A cone-product of several constraint blocks, concatenated along the
/// constraint-row axis. Each block keeps its own weight in the
/// [`crate::scaler::ProxScaler`]; this type only tracks block extents so
/// `projection`/`normal_cone_proj` can be applied blockwise.
pub struct ConstraintStack {
    blocks: Vec<Box<dyn ConstraintSet>>,
    offsets: Vec<IndexType>,
}

impl ConstraintStack {
    pub fn new(blocks: Vec<Box<dyn ConstraintSet>>) -> Self {
        let mut offsets = Vec::with_capacity(blocks.len() + 1);
        let mut acc = 0;
        offsets.push(0);
        for b in &blocks {
            acc += b.dim();
            offsets.push(acc);
        }
        Self { blocks, offsets }
    }

    pub fn num_blocks(&self) -> IndexType {
        self.blocks.len()
    }

    pub fn block_dim(&self, j: IndexType) -> IndexType {
        self.blocks[j].dim()
    }

    pub fn block_is_equality_like(&self, j: IndexType) -> bool {
        self.blocks[j].is_equality_like()
    }

    pub fn total_dim(&self) -> IndexType {
        *self.offsets.last().unwrap_or(&0)
    }

    fn block_range(&self, j: IndexType) -> std::ops::Range<IndexType> {
        self.offsets[j]..self.offsets[j + 1]
    }

    pub fn projection(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        let mut out = DVector::zeros(self.total_dim());
        for (j, block) in self.blocks.iter().enumerate() {
            let r = self.block_range(j);
            let sub = DVector::from_column_slice(&z.as_slice()[r.clone()]);
            out.rows_mut(r.start, r.len()).copy_from(&block.projection(&sub));
        }
        out
    }

    pub fn normal_cone_proj(&self, z: &DVector<Scalar>) -> DVector<Scalar> {
        let mut out = DVector::zeros(self.total_dim());
        for (j, block) in self.blocks.iter().enumerate() {
            let r = self.block_range(j);
            let sub = DVector::from_column_slice(&z.as_slice()[r.clone()]);
            out.rows_mut(r.start, r.len())
                .copy_from(&block.normal_cone_proj(&sub));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_orthant_projects_onto_nonpositive() {
        let c = NegativeOrthantConstraintSet::new(2);
        let z = DVector::from_vec(vec![1.0, -1.0]);
        let p = c.projection(&z);
        assert_eq!(p, DVector::from_vec(vec![0.0, -1.0]));
    }

    #[test]
    fn box_constraint_clamps() {
        let c = BoxConstraintSet::new(DVector::from_vec(vec![-1.0]), DVector::from_vec(vec![1.0]));
        assert_eq!(c.projection(&DVector::from_vec(vec![5.0])), DVector::from_vec(vec![1.0]));
        assert_eq!(c.projection(&DVector::from_vec(vec![-5.0])), DVector::from_vec(vec![-1.0]));
    }

    #[test]
    fn constraint_stack_blockwise_projection() {
        let stack = ConstraintStack::new(vec![
            Box::new(EqualityConstraintSet::new(1)),
            Box::new(NegativeOrthantConstraintSet::new(2)),
        ]);
        assert_eq!(stack.total_dim(), 3);
        let z = DVector::from_vec(vec![5.0, 1.0, -1.0]);
        let p = stack.projection(&z);
        assert_eq!(p, DVector::from_vec(vec![0.0, 0.0, -1.0]));
    }
}
