//! Enumerates the scalar element types supported by the engine.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between host tensors and pooled views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 16-bit floating point (fp16), carried via [`half::f16`].
    F16,
    /// 32-bit signed integer, primarily for index tensors.
    I32,
    /// 8-bit unsigned integer for quantized fixed-point paths.
    U8,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }

    /// Produces a stable tag used when serializing or crossing loader boundaries.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
            DType::I32 => 2,
            DType::U8 => 3,
        }
    }

    /// Reconstructs a `DType` from its serialized tag representation.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            2 => Some(DType::I32),
            3 => Some(DType::U8),
            _ => None,
        }
    }

    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16)
    }

    /// Returns `true` when the dtype belongs to a quantized fixed-point path.
    pub fn is_quantized(self) -> bool {
        matches!(self, DType::U8)
    }
}
