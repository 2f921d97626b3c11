//! Per-stage constraint proximal scaler.

use nalgebra::{DMatrix, DVector};

use crate::errors::ProxDdpError;
use crate::scalar::{IndexType, Scalar};

/// Default weight applied to equality-like blocks by
/// [`ProxScaler::apply_default_scaling_strategy`].
const DEFAULT_EQUALITY_WEIGHT: Scalar = 10.0;
/// Default weight applied to inequality-cone blocks.
const DEFAULT_INEQUALITY_WEIGHT: Scalar = 1.0;

/// Per-block scalar AL penalty weights for one stage's constraints.
///
/// Constraints are grouped into `k` blocks; `diag_matrix()` repeats each
/// block's weight across that block's rows.
#[derive(Debug, Clone)]
pub struct ProxScaler {
    block_sizes: Vec<IndexType>,
    weights: Vec<Scalar>,
}

impl ProxScaler {
    /// Build a scaler for blocks of the given sizes, all weights at 1.
    pub fn new(block_sizes: Vec<IndexType>) -> Self {
        let k = block_sizes.len();
        Self {
            block_sizes,
            weights: vec![1.0; k],
        }
    }

    pub fn num_blocks(&self) -> IndexType {
        self.block_sizes.len()
    }

    pub fn total_dim(&self) -> IndexType {
        self.block_sizes.iter().sum()
    }

    pub fn weight(&self, j: IndexType) -> Result<Scalar, ProxDdpError> {
        self.weights.get(j).copied().ok_or(ProxDdpError::IndexOutOfBounds {
            what: "ProxScaler::weight",
            index: j,
            len: self.weights.len(),
        })
    }

    pub fn set_weight(&mut self, j: IndexType, v: Scalar) -> Result<(), ProxDdpError> {
        let len = self.weights.len();
        let slot = self.weights.get_mut(j).ok_or(ProxDdpError::IndexOutOfBounds {
            what: "ProxScaler::set_weight",
            index: j,
            len,
        })?;
        *slot = v;
        Ok(())
    }

    /// Replace all weights at once. Fails (without mutating state) if `w`'s
    /// length doesn't match the number of blocks.
    pub fn set_weights(&mut self, w: &[Scalar]) -> Result<(), ProxDdpError> {
        if w.len() != self.weights.len() {
            return Err(ProxDdpError::DimensionMismatch {
                what: "ProxScaler::set_weights",
                expected: self.weights.len(),
                got: w.len(),
            });
        }
        self.weights.copy_from_slice(w);
        Ok(())
    }

    /// Equality-like blocks get a large weight, inequality/cone blocks the
    /// baseline weight. `is_equality` must have one entry per block.
    pub fn apply_default_scaling_strategy(&mut self, is_equality: &[bool]) -> Result<(), ProxDdpError> {
        if is_equality.len() != self.weights.len() {
            return Err(ProxDdpError::DimensionMismatch {
                what: "ProxScaler::apply_default_scaling_strategy",
                expected: self.weights.len(),
                got: is_equality.len(),
            });
        }
        for (w, &eq) in self.weights.iter_mut().zip(is_equality.iter()) {
            *w = if eq {
                DEFAULT_EQUALITY_WEIGHT
            } else {
                DEFAULT_INEQUALITY_WEIGHT
            };
        }
        Ok(())
    }

    /// Per-row effective penalty parameter `mu / weight_j`, one entry per
    /// row of this scaler's blocks: a heavier block gets a proportionally
    /// smaller effective `mu`, tightening its AL penalty.
    pub fn effective_mu_vec(&self, mu: Scalar) -> DVector<Scalar> {
        let n = self.total_dim();
        let mut out = DVector::zeros(n);
        let mut row = 0;
        for (&size, &w) in self.block_sizes.iter().zip(self.weights.iter()) {
            let m = mu / w;
            for i in row..row + size {
                out[i] = m;
            }
            row += size;
        }
        out
    }

    /// Diagonal matrix of dimension `total_dim()` with each block's weight
    /// repeated across that block's rows.
    pub fn diag_matrix(&self) -> DMatrix<Scalar> {
        let n = self.total_dim();
        let mut out = DMatrix::zeros(n, n);
        let mut row = 0;
        for (&size, &w) in self.block_sizes.iter().zip(self.weights.iter()) {
            for i in row..row + size {
                out[(i, i)] = w;
            }
            row += size;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_constant_and_weights_roundtrip() {
        let mut s = ProxScaler::new(vec![2, 3]);
        assert_eq!(s.num_blocks(), 2);
        assert_eq!(s.total_dim(), 5);
        s.set_weight(0, 7.0).unwrap();
        assert_eq!(s.weight(0).unwrap(), 7.0);
        assert_eq!(s.num_blocks(), 2);
    }

    #[test]
    fn set_weights_wrong_size_fails() {
        let mut s = ProxScaler::new(vec![2, 3]);
        assert!(s.set_weights(&[1.0]).is_err());
        // state must be unchanged after a rejected update
        assert_eq!(s.weight(0).unwrap(), 1.0);
    }

    #[test]
    fn diag_matrix_repeats_weights_per_block() {
        let mut s = ProxScaler::new(vec![2, 1]);
        s.set_weights(&[3.0, 5.0]).unwrap();
        let d = s.diag_matrix();
        assert_eq!(d[(0, 0)], 3.0);
        assert_eq!(d[(1, 1)], 3.0);
        assert_eq!(d[(2, 2)], 5.0);
        assert_eq!(d[(0, 1)], 0.0);
    }

    #[test]
    fn default_strategy_weights_equality_higher() {
        let mut s = ProxScaler::new(vec![1, 1]);
        s.apply_default_scaling_strategy(&[true, false]).unwrap();
        assert_eq!(s.weight(0).unwrap(), DEFAULT_EQUALITY_WEIGHT);
        assert_eq!(s.weight(1).unwrap(), DEFAULT_INEQUALITY_WEIGHT);
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let s = ProxScaler::new(vec![2]);
        assert!(s.weight(5).is_err());
    }

    #[test]
    fn effective_mu_vec_divides_by_block_weight() {
        let mut s = ProxScaler::new(vec![2, 1]);
        s.set_weights(&[2.0, 10.0]).unwrap();
        let v = s.effective_mu_vec(1.0);
        assert_eq!(v[0], 0.5);
        assert_eq!(v[1], 0.5);
        assert_eq!(v[2], 0.1);
    }
}
