//! Activation kernels: rectified linear and axis-wise softmax.

use netrt::graph::OperatorDef;
use netrt::ops::{Operator, RunContext};
use netrt::{DType, EngineResult, ShapeInferenceError, TensorMeta};

pub struct Relu;

impl Operator for Relu {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 1 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 1 input, got {}",
                inputs.len()
            )));
        }
        if inputs[0].dtype != DType::F32 {
            return Err(ShapeInferenceError::msg("relu supports f32 only"));
        }
        Ok(vec![inputs[0].clone()])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let x = inputs[0].as_f32();
        let out = outputs[0].as_f32_mut();
        for (o, v) in out.iter_mut().zip(x) {
            *o = v.max(0.0);
        }
        Ok(())
    }
}

/// Numerically stable softmax along one axis (`axis` attribute, negative
/// values count from the back; defaults to the last axis).
pub struct Softmax {
    axis: i64,
}

impl Softmax {
    pub fn from_def(def: &OperatorDef) -> Self {
        Softmax {
            axis: def.int_attr("axis").unwrap_or(-1),
        }
    }

    fn resolve_axis(&self, rank: usize) -> Result<usize, ShapeInferenceError> {
        let axis = if self.axis < 0 {
            self.axis + rank as i64
        } else {
            self.axis
        };
        if axis < 0 || axis as usize >= rank {
            return Err(ShapeInferenceError::msg(format!(
                "axis {} is out of range for rank {rank}",
                self.axis
            )));
        }
        Ok(axis as usize)
    }
}

impl Operator for Softmax {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 1 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 1 input, got {}",
                inputs.len()
            )));
        }
        if inputs[0].dtype != DType::F32 {
            return Err(ShapeInferenceError::msg("softmax supports f32 only"));
        }
        self.resolve_axis(inputs[0].shape.rank())?;
        Ok(vec![inputs[0].clone()])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let dims = inputs[0].shape().dims().to_vec();
        // Checked during shape inference.
        let axis = self
            .resolve_axis(dims.len())
            .unwrap_or(dims.len() - 1);
        let axis_len = dims[axis];
        let outer: usize = dims[..axis].iter().product();
        let inner: usize = dims[axis + 1..].iter().product();

        let x = inputs[0].as_f32();
        let out = outputs[0].as_f32_mut();
        for o in 0..outer {
            for i in 0..inner {
                let base = o * axis_len * inner + i;
                let mut max = f32::NEG_INFINITY;
                for a in 0..axis_len {
                    max = max.max(x[base + a * inner]);
                }
                let mut sum = 0.0f32;
                for a in 0..axis_len {
                    let e = (x[base + a * inner] - max).exp();
                    out[base + a * inner] = e;
                    sum += e;
                }
                for a in 0..axis_len {
                    out[base + a * inner] /= sum;
                }
            }
        }
        Ok(())
    }
}
