//! Dense linear algebra kernels.

use netrt::ops::{Operator, RunContext};
use netrt::tensor::Shape;
use netrt::{DType, EngineResult, ShapeInferenceError, TensorMeta};

/// Rank-2 matrix product: `[m, k] x [k, n] -> [m, n]`, f32.
pub struct MatMul;

impl Operator for MatMul {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 2 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 2 inputs, got {}",
                inputs.len()
            )));
        }
        let (a, b) = (&inputs[0], &inputs[1]);
        if a.dtype != DType::F32 || b.dtype != DType::F32 {
            return Err(ShapeInferenceError::msg("matmul supports f32 only"));
        }
        if a.shape.rank() != 2 || b.shape.rank() != 2 {
            return Err(ShapeInferenceError::msg(format!(
                "matmul operands must be rank 2: {} x {}",
                a.shape, b.shape
            )));
        }
        let (m, k) = (a.shape.dims()[0], a.shape.dims()[1]);
        let (k2, n) = (b.shape.dims()[0], b.shape.dims()[1]);
        if k != k2 {
            return Err(ShapeInferenceError::msg(format!(
                "inner dimensions disagree: {} x {}",
                a.shape, b.shape
            )));
        }
        Ok(vec![TensorMeta::new(DType::F32, Shape::new([m, n]))])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let (m, k) = {
            let d = inputs[0].shape().dims();
            (d[0], d[1])
        };
        let n = inputs[1].shape().dims()[1];
        let a = inputs[0].as_f32();
        let b = inputs[1].as_f32();
        let out = outputs[0].as_f32_mut();
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0f32;
                for p in 0..k {
                    acc += a[i * k + p] * b[p * n + j];
                }
                out[i * n + j] = acc;
            }
        }
        Ok(())
    }
}

/// Adds a rank-1 bias over the last axis of the input.
pub struct BiasAdd;

impl Operator for BiasAdd {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 2 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 2 inputs, got {}",
                inputs.len()
            )));
        }
        let (x, bias) = (&inputs[0], &inputs[1]);
        if x.dtype != DType::F32 || bias.dtype != DType::F32 {
            return Err(ShapeInferenceError::msg("bias add supports f32 only"));
        }
        if bias.shape.rank() != 1 {
            return Err(ShapeInferenceError::msg(format!(
                "bias must be rank 1, got {}",
                bias.shape
            )));
        }
        let last = *x.shape.dims().last().expect("shape has at least one axis");
        if bias.shape.dims()[0] != last {
            return Err(ShapeInferenceError::msg(format!(
                "bias length {} does not match trailing dimension of {}",
                bias.shape.dims()[0],
                x.shape
            )));
        }
        Ok(vec![x.clone()])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let x = inputs[0].as_f32();
        let bias = inputs[1].as_f32();
        let out = outputs[0].as_f32_mut();
        let n = bias.len();
        for (row_out, row_x) in out.chunks_mut(n).zip(x.chunks(n)) {
            for ((o, v), b) in row_out.iter_mut().zip(row_x).zip(bias) {
                *o = v + b;
            }
        }
        Ok(())
    }
}
