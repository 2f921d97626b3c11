//! Symmetric block-tridiagonal LDL-style solve.
//!
//! A standalone solver for the reduced saddle-point systems produced by
//! condensing a chain of legs (each leg's boundary coupling forms one
//! diagonal block, adjacent legs couple through the off-diagonal blocks).
//! [`crate::riccati::parallel`] currently condenses its (small, fixed-size)
//! reduced system with a dense LU factorization instead; this solver scales
//! better when the number of legs grows and is exercised independently.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::errors::ProxDdpError;
use crate::scalar::Scalar;

/// Solve the symmetric block-tridiagonal system with sub-diagonal blocks
/// `sub[i] = L_i` (for `i = 1..J-1`, `sub[i]` sits below `diag[i]`),
/// diagonal blocks `diag[i] = D_i`, and `rhs[i] = b_i`, where the
/// super-diagonal is `sub[i+1]^T` (the system is symmetric).
///
/// `sub` has length `J - 1` (one fewer than `diag`/`rhs`); `sub[i]`
/// corresponds to the coupling between `diag[i]` and `diag[i+1]`.
///
/// Returns `None` (and which block failed) if the Schur-complemented
/// diagonal block at some step is not SPD, mirroring the "return false, let
/// the caller inflate `mu_dyn`" contract.
pub fn solve_symmetric_block_tridiagonal(
    diag: &[DMatrix<Scalar>],
    sub: &[DMatrix<Scalar>],
    rhs: &[DVector<Scalar>],
) -> Result<Vec<DVector<Scalar>>, ProxDdpError> {
    let j = diag.len();
    assert_eq!(sub.len() + 1, j.max(1), "sub must have one fewer block than diag");
    assert_eq!(rhs.len(), j);

    if j == 0 {
        return Ok(Vec::new());
    }

    // Forward sweep: Schur-complement the diagonal and factorize.
    let mut d: Vec<DMatrix<Scalar>> = Vec::with_capacity(j);
    let mut b: Vec<DVector<Scalar>> = Vec::with_capacity(j);
    let mut factors: Vec<Cholesky<Scalar, nalgebra::Dyn>> = Vec::with_capacity(j);

    d.push(diag[0].clone());
    b.push(rhs[0].clone());
    factors.push(
        Cholesky::new(d[0].clone()).ok_or(ProxDdpError::BlockTridiagonalFailure { block: 0 })?,
    );

    for i in 1..j {
        let l_i = &sub[i - 1];
        // z_{i-1} = D_{i-1}'^{-1} b_{i-1}
        let z_prev = factors[i - 1].solve(&b[i - 1]);
        let dinv_lt = factors[i - 1].solve(&l_i.transpose());
        let di = &diag[i] - l_i * &dinv_lt;
        let bi = &rhs[i] - l_i * &z_prev;
        let factor =
            Cholesky::new(di.clone()).ok_or(ProxDdpError::BlockTridiagonalFailure { block: i })?;
        d.push(di);
        b.push(bi);
        factors.push(factor);
    }

    // Backward sweep: x_i = D_i^{-1} z_i - U_i x_{i+1}, U_i = sub[i]^T.
    let mut x: Vec<DVector<Scalar>> = vec![DVector::zeros(0); j];
    x[j - 1] = factors[j - 1].solve(&b[j - 1]);
    for i in (0..j - 1).rev() {
        let zi = factors[i].solve(&b[i]);
        let u_i = sub[i].transpose();
        x[i] = zi - u_i * &x[i + 1];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dense_from_blocks(
        diag: &[DMatrix<Scalar>],
        sub: &[DMatrix<Scalar>],
    ) -> DMatrix<Scalar> {
        let sizes: Vec<usize> = diag.iter().map(|d| d.nrows()).collect();
        let n: usize = sizes.iter().sum();
        let mut a = DMatrix::zeros(n, n);
        let mut offsets = vec![0];
        for &s in &sizes {
            offsets.push(offsets.last().unwrap() + s);
        }
        for (i, di) in diag.iter().enumerate() {
            a.view_mut((offsets[i], offsets[i]), (sizes[i], sizes[i]))
                .copy_from(di);
        }
        for (i, li) in sub.iter().enumerate() {
            a.view_mut((offsets[i + 1], offsets[i]), (sizes[i + 1], sizes[i]))
                .copy_from(li);
            a.view_mut((offsets[i], offsets[i + 1]), (sizes[i], sizes[i + 1]))
                .copy_from(&li.transpose());
        }
        a
    }

    #[test]
    fn solves_random_spd_block_tridiagonal_system() {
        // Build a diagonally-dominant (hence SPD) block-tridiagonal system
        // out of small random-ish blocks.
        let diag = vec![
            DMatrix::from_row_slice(2, 2, &[4.0, 0.5, 0.5, 3.0]),
            DMatrix::from_row_slice(2, 2, &[5.0, -0.2, -0.2, 4.0]),
            DMatrix::from_row_slice(2, 2, &[6.0, 0.1, 0.1, 5.0]),
        ];
        let sub = vec![
            DMatrix::from_row_slice(2, 2, &[0.3, 0.0, 0.0, 0.2]),
            DMatrix::from_row_slice(2, 2, &[0.1, 0.0, 0.0, 0.1]),
        ];
        let rhs = vec![
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![-1.0, 0.5]),
            DVector::from_vec(vec![0.3, -0.4]),
        ];

        let x = solve_symmetric_block_tridiagonal(&diag, &sub, &rhs).unwrap();
        let a = dense_from_blocks(&diag, &sub);
        let mut b_flat = DVector::zeros(6);
        b_flat.rows_mut(0, 2).copy_from(&rhs[0]);
        b_flat.rows_mut(2, 2).copy_from(&rhs[1]);
        b_flat.rows_mut(4, 2).copy_from(&rhs[2]);
        let mut x_flat = DVector::zeros(6);
        x_flat.rows_mut(0, 2).copy_from(&x[0]);
        x_flat.rows_mut(2, 2).copy_from(&x[1]);
        x_flat.rows_mut(4, 2).copy_from(&x[2]);

        let residual = &a * &x_flat - &b_flat;
        assert_relative_eq!(residual.amax(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn non_spd_diagonal_block_fails() {
        let diag = vec![DMatrix::from_row_slice(1, 1, &[-1.0])];
        let sub: Vec<DMatrix<Scalar>> = vec![];
        let rhs = vec![DVector::from_vec(vec![1.0])];
        assert!(solve_symmetric_block_tridiagonal(&diag, &sub, &rhs).is_err());
    }
}
