//! Elementwise binary arithmetic over same-shape f32 operands.

use netrt::ops::{Operator, RunContext};
use netrt::{DType, EngineResult, ShapeInferenceError, TensorMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

/// Applies a [`BinaryOp`] element by element. Both operands must share a
/// shape; broadcasting belongs to the model converter, not the engine.
pub struct EltwiseBinary {
    op: BinaryOp,
}

impl EltwiseBinary {
    pub fn new(op: BinaryOp) -> Self {
        EltwiseBinary { op }
    }
}

impl Operator for EltwiseBinary {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 2 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 2 inputs, got {}",
                inputs.len()
            )));
        }
        let (a, b) = (&inputs[0], &inputs[1]);
        if a.dtype != DType::F32 || b.dtype != DType::F32 {
            return Err(ShapeInferenceError::msg(
                "elementwise arithmetic supports f32 operands only",
            ));
        }
        if a.shape != b.shape {
            return Err(ShapeInferenceError::msg(format!(
                "operand shapes differ: {} vs {}",
                a.shape, b.shape
            )));
        }
        Ok(vec![a.clone()])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let a = inputs[0].as_f32();
        let b = inputs[1].as_f32();
        let out = outputs[0].as_f32_mut();
        match self.op {
            BinaryOp::Add => {
                for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
                    *o = x + y;
                }
            }
            BinaryOp::Sub => {
                for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
                    *o = x - y;
                }
            }
            BinaryOp::Mul => {
                for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
                    *o = x * y;
                }
            }
        }
        Ok(())
    }
}
