//! Layout kernels: reshape and axis concatenation.

use netrt::graph::OperatorDef;
use netrt::ops::{Operator, RunContext};
use netrt::tensor::Shape;
use netrt::{EngineError, EngineResult, ShapeInferenceError, TensorMeta};

/// Reinterprets the input under a new shape from the `shape` attribute.
/// One entry may be `-1` and is inferred from the element count.
pub struct Reshape {
    target: Vec<i64>,
}

impl Reshape {
    pub fn from_def(def: &OperatorDef) -> EngineResult<Self> {
        let target = def
            .int_list_attr("shape")
            .ok_or_else(|| EngineError::UnresolvableShape {
                op: def.name.clone(),
                reason: "reshape requires a `shape` int-list attribute".into(),
            })?
            .to_vec();
        if target.is_empty() || target.iter().any(|&d| d == 0 || d < -1) {
            return Err(EngineError::UnresolvableShape {
                op: def.name.clone(),
                reason: format!("invalid reshape target {target:?}"),
            });
        }
        if target.iter().filter(|&&d| d == -1).count() > 1 {
            return Err(EngineError::UnresolvableShape {
                op: def.name.clone(),
                reason: format!("reshape target {target:?} has more than one wildcard"),
            });
        }
        Ok(Reshape { target })
    }
}

impl Operator for Reshape {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.len() != 1 {
            return Err(ShapeInferenceError::msg(format!(
                "expected 1 input, got {}",
                inputs.len()
            )));
        }
        let total = inputs[0]
            .shape
            .num_elements()
            .ok_or_else(|| ShapeInferenceError::msg("input element count overflows"))?;
        let known: usize = self
            .target
            .iter()
            .filter(|&&d| d != -1)
            .map(|&d| d as usize)
            .product();
        let mut dims = Vec::with_capacity(self.target.len());
        for &d in &self.target {
            if d == -1 {
                if known == 0 || total % known != 0 {
                    return Err(ShapeInferenceError::msg(format!(
                        "cannot infer wildcard: {total} elements do not divide by {known}"
                    )));
                }
                dims.push(total / known);
            } else {
                dims.push(d as usize);
            }
        }
        let shape = Shape::new(dims);
        if shape.num_elements() != Some(total) {
            return Err(ShapeInferenceError::msg(format!(
                "reshape target {shape} does not preserve {total} elements"
            )));
        }
        Ok(vec![TensorMeta::new(inputs[0].dtype, shape)])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let src = inputs[0].bytes();
        outputs[0].bytes_mut().copy_from_slice(src);
        Ok(())
    }
}

/// Concatenates same-rank inputs along the `axis` attribute (negative axes
/// count from the back).
pub struct Concat {
    axis: i64,
}

impl Concat {
    pub fn from_def(def: &OperatorDef) -> EngineResult<Self> {
        let axis = def
            .int_attr("axis")
            .ok_or_else(|| EngineError::UnresolvableShape {
                op: def.name.clone(),
                reason: "concat requires an `axis` int attribute".into(),
            })?;
        Ok(Concat { axis })
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

impl Operator for Concat {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        if inputs.is_empty() {
            return Err(ShapeInferenceError::msg("concat needs at least one input"));
        }
        let first = &inputs[0];
        let rank = first.shape.rank();
        let axis = self.resolve_axis(rank)?;
        let mut axis_sum = 0usize;
        for meta in inputs {
            if meta.dtype != first.dtype {
                return Err(ShapeInferenceError::msg("concat inputs must share a dtype"));
            }
            if meta.shape.rank() != rank {
                return Err(ShapeInferenceError::msg(format!(
                    "concat inputs must share a rank: {} vs {}",
                    first.shape, meta.shape
                )));
            }
            for (d, (&a, &b)) in first.shape.dims().iter().zip(meta.shape.dims()).enumerate() {
                if d != axis && a != b {
                    return Err(ShapeInferenceError::msg(format!(
                        "concat inputs differ outside axis {axis}: {} vs {}",
                        first.shape, meta.shape
                    )));
                }
            }
            axis_sum += meta.shape.dims()[axis];
        }
        let mut dims = first.shape.dims().to_vec();
        dims[axis] = axis_sum;
        Ok(vec![TensorMeta::new(first.dtype, Shape::new(dims))])
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()> {
        let (inputs, outputs) = ctx.io();
        let rank = inputs[0].shape().rank();
        // Checked during shape inference.
        let axis = self.resolve_axis(rank).unwrap_or(rank - 1);
        let elem = inputs[0].dtype().size_in_bytes();
        let outer: usize = inputs[0].shape().dims()[..axis].iter().product();

        // Per-input bytes contributed to each outer block.
        let chunk_bytes: Vec<usize> = inputs
            .iter()
            .map(|view| view.shape().dims()[axis..].iter().product::<usize>() * elem)
            .collect();
        let out_stride: usize = chunk_bytes.iter().sum();

        let out = outputs[0].bytes_mut();
        for o in 0..outer {
            let mut dst = o * out_stride;
            for (view, &chunk) in inputs.iter().zip(&chunk_bytes) {
                let src = &view.bytes()[o * chunk..(o + 1) * chunk];
                out[dst..dst + chunk].copy_from_slice(src);
                dst += chunk;
            }
        }
        Ok(())
    }
}
