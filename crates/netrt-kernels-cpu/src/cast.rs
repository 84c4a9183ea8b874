//! Precision cast between f32 and f16 storage.

use half::f16;

use netrt::graph::OperatorDef;
use netrt::ops::{Operator, RunContext};
use netrt::{DType, EngineError, EngineResult, ShapeInferenceError, TensorMeta};

/// Converts element storage to the dtype named by the `to` string attribute
/// (`"f32"` or `"f16"`). Casting to the input's own dtype is a copy.
pub struct Cast {
    to: DType,
}

impl Cast {
    pub fn from_def(def: &OperatorDef) -> EngineResult<Self> {
        let to = match def.str_attr("to") {
            Some("f32") => DType::F32,
            Some("f16") => DType::F16,
            Some(other) => {
                return Err(EngineError::UnresolvableShape {
                    op: def.name.clone(),
                    reason: format!("unsupported cast target `{other}`"),
                })
            }
            None => {
                return Err(EngineError::UnresolvableShape {
                    op: def.name.clone(),
                    reason: "cast requires a `to` string attribute".into(),
                })
            }
        };
        Ok(Cast { to })
    }
}

impl Operator for Cast {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 1 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 1 input, got {}",
                inputs.len()
            )));
        }
        if !matches!(inputs[0].dtype, DType::F32 | DType::F16) {
            return Err(ShapeInferenceError::msg(
                "cast supports float storage dtypes only",
            ));
        }
        Ok(vec![TensorMeta::new(self.to, inputs[0].shape.clone())])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        match (inputs[0].dtype(), self.to) {
            (DType::F32, DType::F16) => {
                let src = inputs[0].as_f32();
                let dst = outputs[0].as_slice_mut::<f16>();
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = f16::from_f32(s);
                }
            }
            (DType::F16, DType::F32) => {
                let src = inputs[0].as_slice::<f16>();
                let dst = outputs[0].as_f32_mut();
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = s.to_f32();
                }
            }
            _ => {
                let src = inputs[0].bytes();
                outputs[0].bytes_mut().copy_from_slice(src);
            }
        }
        Ok(())
    }
}
