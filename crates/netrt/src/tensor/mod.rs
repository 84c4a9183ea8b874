//! Host tensors and the metadata shared with pooled tensor views.
//!
//! Tensors the engine executes against are views into pool-owned slot
//! buffers (see [`crate::memory`]); they never own storage. The types here
//! cover the host side of that boundary: the immutable `(dtype, shape)`
//! metadata attached to every tensor, and [`HostTensor`] — the owned buffer
//! clients hand in as inputs/constants and read back as outputs.

pub(crate) mod aligned;
mod dtype;
mod shape;

pub use dtype::DType;
pub use shape::{Dims, Shape};

use aligned::AlignedBytes;

use bytemuck::{AnyBitPattern, NoUninit};
use serde::{Deserialize, Serialize};

/// Immutable element type and shape of a tensor, fixed once planned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorMeta {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorMeta {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        TensorMeta { dtype, shape }
    }

    /// Storage size in bytes, or `None` when the element count overflows.
    pub fn byte_len(&self) -> Option<usize> {
        self.shape.byte_len(self.dtype)
    }
}

/// Owned, host-resident tensor used for workspace inputs, outputs, and
/// persistent constants (weights). Element data is stored as raw bytes with
/// typed access through `bytemuck`-checked casts.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    meta: TensorMeta,
    bytes: AlignedBytes,
}

impl HostTensor {
    /// Builds a zero-filled tensor of the given dtype and shape.
    ///
    /// Panics if the byte length overflows `usize`; host tensors are sized
    /// by the caller and an overflowing request is a programming error.
    pub fn zeros(dtype: DType, shape: Shape) -> Self {
        let len = shape
            .byte_len(dtype)
            .unwrap_or_else(|| panic!("host tensor byte length overflow for shape {shape}"));
        HostTensor {
            meta: TensorMeta::new(dtype, shape),
            bytes: AlignedBytes::zeroed(len),
        }
    }

    /// Builds a tensor from typed element data.
    ///
    /// Panics if `data` does not match the element count implied by `shape`.
    pub fn from_elems<T: NoUninit>(dtype: DType, shape: Shape, data: &[T]) -> Self {
        let raw: &[u8] = bytemuck::cast_slice(data);
        let expected = shape
            .byte_len(dtype)
            .unwrap_or_else(|| panic!("host tensor byte length overflow for shape {shape}"));
        assert_eq!(
            raw.len(),
            expected,
            "element data does not match shape {shape} ({} vs {expected} bytes)",
            raw.len()
        );
        HostTensor {
            meta: TensorMeta::new(dtype, shape),
            bytes: AlignedBytes::from_bytes(raw),
        }
    }

    /// Convenience constructor for `f32` element data.
    pub fn from_f32(shape: Shape, data: &[f32]) -> Self {
        Self::from_elems(DType::F32, shape, data)
    }

    /// Convenience constructor for `f16` element data.
    pub fn from_f16(shape: Shape, data: &[half::f16]) -> Self {
        Self::from_elems(DType::F16, shape, data)
    }

    /// Builds a tensor by copying raw bytes already laid out for the given
    /// metadata. Used by the workspace when copying outputs out of the pool.
    pub(crate) fn from_raw(meta: TensorMeta, bytes: &[u8]) -> Self {
        debug_assert_eq!(meta.byte_len(), Some(bytes.len()));
        HostTensor {
            meta,
            bytes: AlignedBytes::from_bytes(bytes),
        }
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.meta.shape
    }

    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.bytes.as_bytes_mut()
    }

    /// Typed view over the element data.
    ///
    /// Panics if `T` does not match the stored dtype's width; storage is
    /// word-aligned so alignment can never fail for the supported scalars.
    pub fn as_slice<T: AnyBitPattern>(&self) -> &[T] {
        bytemuck::try_cast_slice(self.bytes.as_bytes())
            .unwrap_or_else(|err| panic!("typed view mismatch for {:?}: {err}", self.meta.dtype))
    }

    /// Shorthand for an `f32` element view.
    pub fn as_f32(&self) -> &[f32] {
        self.as_slice()
    }

    /// Shorthand for an `f16` element view.
    pub fn as_f16(&self) -> &[half::f16] {
        self.as_slice()
    }

    /// Pre-execution reshape to a dimension-compatible shape.
    ///
    /// The element count must match; dtype and storage are untouched.
    pub fn reshaped(mut self, shape: Shape) -> Self {
        assert_eq!(
            self.meta.shape.num_elements(),
            shape.num_elements(),
            "reshape must preserve element count: {} -> {shape}",
            self.meta.shape
        );
        self.meta.shape = shape;
        self
    }
}
