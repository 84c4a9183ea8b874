//! Affine quantization between f32 and u8.
//!
//! `value = (quantized - zero_point) * scale`, with `scale` and
//! `zero_point` supplied as operator attributes by the model converter.

use netrt::graph::OperatorDef;
use netrt::ops::{Operator, RunContext};
use netrt::{DType, EngineError, EngineResult, ShapeInferenceError, TensorMeta};

fn affine_params(def: &OperatorDef) -> EngineResult<(f32, i32)> {
    let scale = def
        .float_attr("scale")
        .ok_or_else(|| EngineError::UnresolvableShape {
            op: def.name.clone(),
            reason: "quantization requires a `scale` float attribute".into(),
        })?;
    if !(scale.is_finite() && scale > 0.0) {
        return Err(EngineError::UnresolvableShape {
            op: def.name.clone(),
            reason: format!("quantization scale must be positive and finite, got {scale}"),
        });
    }
    let zero_point = def.int_attr("zero_point").unwrap_or(0) as i32;
    Ok((scale, zero_point))
}

pub struct Quantize {
    scale: f32,
    zero_point: i32,
}

impl Quantize {
    pub fn from_def(def: &OperatorDef) -> EngineResult<Self> {
        let (scale, zero_point) = affine_params(def)?;
        Ok(Quantize { scale, zero_point })
    }
}

impl Operator for Quantize {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 1 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 1 input, got {}",
                inputs.len()
            )));
        }
        if inputs[0].dtype != DType::F32 {
            return Err(ShapeInferenceError::msg("quantize consumes f32"));
        }
        Ok(vec![TensorMeta::new(DType::U8, inputs[0].shape.clone())])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let x = inputs[0].as_f32();
        let out = outputs[0].as_slice_mut::<u8>();
        for (q, v) in out.iter_mut().zip(x) {
            let scaled = (v / self.scale).round() + self.zero_point as f32;
            *q = scaled.clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }
}

pub struct Dequantize {
    scale: f32,
    zero_point: i32,
}

impl Dequantize {
    pub fn from_def(def: &OperatorDef) -> EngineResult<Self> {
        let (scale, zero_point) = affine_params(def)?;
        Ok(Dequantize { scale, zero_point })
    }
}

impl Operator for Dequantize {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 1 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 1 input, got {}",
                inputs.len()
            )));
        }
        if inputs[0].dtype != DType::U8 {
            return Err(ShapeInferenceError::msg("dequantize consumes u8"));
        }
        Ok(vec![TensorMeta::new(DType::F32, inputs[0].shape.clone())])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let q = inputs[0].as_slice::<u8>();
        let out = outputs[0].as_f32_mut();
        for (o, &v) in out.iter_mut().zip(q) {
            *o = (v as i32 - self.zero_point) as f32 * self.scale;
        }
        Ok(())
    }
}
