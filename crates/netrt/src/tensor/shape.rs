//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::DType;

/// Inline-capacity dimension storage; rank four covers NCHW without spilling.
pub type Dims = SmallVec<[usize; 4]>;

/// Stores the logical dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Dims,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty or contains a zero dimension; every tensor
    /// has at least one axis and a positive extent along each.
    pub fn new<D: IntoIterator<Item = usize>>(dims: D) -> Self {
        let dims: Dims = dims.into_iter().collect();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        assert!(
            dims.iter().all(|&d| d > 0),
            "shape dimensions must be positive: {dims:?}"
        );
        Shape { dims }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements, or `None` on overflow.
    pub fn num_elements(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Computes the storage size in bytes for the given dtype, or `None`
    /// when the product overflows `usize`.
    pub fn byte_len(&self, dtype: DType) -> Option<usize> {
        self.num_elements()?.checked_mul(dtype.size_in_bytes())
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}
