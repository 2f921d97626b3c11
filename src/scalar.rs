//! Scalar and index type aliases.
//!
//! A single floating-point type is used throughout; we fix it at `f64`
//! rather than threading a `Scalar: RealField` generic through every
//! module, matching the concrete `f64`/`DMatrix<f64>` instantiations
//! exercised by the test suite.

/// The floating-point type used by every solver component.
pub type Scalar = f64;

/// Index / dimension type.
pub type IndexType = usize;
