//! Tensor views handed to a kernel for one `run` invocation.
//!
//! Views borrow pool slot buffers through the per-slot locks; the
//! allocation plan and the executor's slot-reuse ordering guarantee that
//! concurrently running operators touch disjoint slots, so acquiring the
//! guards never blocks. Constant tensors are served straight from the
//! workspace's persistent storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use bytemuck::Pod;

use crate::error::{EngineError, EngineResult};
use crate::graph::{DeviceType, OperatorDef};
use crate::memory::Pool;
use crate::planner::AllocationPlan;
use crate::tensor::aligned::AlignedBytes;
use crate::tensor::{DType, HostTensor, Shape, TensorMeta};

enum InputSource<'a> {
    Pooled {
        guard: RwLockReadGuard<'a, AlignedBytes>,
        offset: usize,
        byte_len: usize,
    },
    Constant(&'a HostTensor),
}

/// Read-only view of one input tensor.
pub struct InputView<'a> {
    meta: &'a TensorMeta,
    source: InputSource<'a>,
}

impl<'a> InputView<'a> {
    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.meta.shape
    }

    pub fn meta(&self) -> &TensorMeta {
        self.meta
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.source {
            InputSource::Pooled {
                guard,
                offset,
                byte_len,
            } => &guard.as_bytes()[*offset..offset + byte_len],
            InputSource::Constant(tensor) => tensor.bytes(),
        }
    }

    /// Typed element view. Panics on dtype/width mismatch, which indicates
    /// a kernel reading a tensor against its declared dtype.
    pub fn as_slice<T: Pod>(&self) -> &[T] {
        bytemuck::try_cast_slice(self.bytes())
            .unwrap_or_else(|err| panic!("typed input view mismatch for {:?}: {err}", self.dtype()))
    }

    pub fn as_f32(&self) -> &[f32] {
        self.as_slice()
    }
}

/// Write view of one pre-allocated output tensor.
pub struct OutputView<'a> {
    meta: &'a TensorMeta,
    guard: RwLockWriteGuard<'a, AlignedBytes>,
    offset: usize,
    byte_len: usize,
}

impl<'a> OutputView<'a> {
    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.meta.shape
    }

    pub fn meta(&self) -> &TensorMeta {
        self.meta
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let end = self.offset + self.byte_len;
        &mut self.guard.as_bytes_mut()[self.offset..end]
    }

    /// Typed mutable element view. Panics on dtype/width mismatch.
    pub fn as_slice_mut<T: Pod>(&mut self) -> &mut [T] {
        let dtype = self.dtype();
        bytemuck::try_cast_slice_mut(self.bytes_mut())
            .unwrap_or_else(|err| panic!("typed output view mismatch for {dtype:?}: {err}"))
    }

    pub fn as_f32_mut(&mut self) -> &mut [f32] {
        self.as_slice_mut()
    }
}

/// Everything a kernel sees during one `run` call: its definition (for
/// attributes), bound input views, and bound output views.
pub struct RunContext<'a> {
    def: &'a OperatorDef,
    inputs: Vec<InputView<'a>>,
    outputs: Vec<OutputView<'a>>,
}

impl<'a> RunContext<'a> {
    /// Binds the context for one operator against reserved pool storage.
    ///
    /// Acquires read guards for inputs and write guards for outputs; the
    /// plan's disjointness and the executor's slot-reuse ordering make this
    /// deadlock-free.
    pub(crate) fn bind(
        def: &'a OperatorDef,
        plan: &'a AllocationPlan,
        pool: &'a Pool,
        constants: &'a HashMap<String, Arc<HostTensor>>,
    ) -> EngineResult<RunContext<'a>> {
        let mut inputs = Vec::with_capacity(def.inputs.len());
        for name in &def.inputs {
            if let Some(tensor) = constants.get(name) {
                inputs.push(InputView {
                    meta: tensor.meta(),
                    source: InputSource::Constant(tensor),
                });
                continue;
            }
            let alloc = plan
                .tensor(name)
                .ok_or_else(|| EngineError::CyclicOrUnresolvedDependency {
                    op: def.name.clone(),
                    tensor: name.clone(),
                })?;
            inputs.push(InputView {
                meta: &alloc.meta,
                source: InputSource::Pooled {
                    guard: pool.read_slot(alloc.slot),
                    offset: alloc.offset,
                    byte_len: alloc.byte_len,
                },
            });
        }

        let mut outputs = Vec::with_capacity(def.outputs.len());
        for name in &def.outputs {
            let alloc = plan
                .tensor(name)
                .ok_or_else(|| EngineError::CyclicOrUnresolvedDependency {
                    op: def.name.clone(),
                    tensor: name.clone(),
                })?;
            outputs.push(OutputView {
                meta: &alloc.meta,
                guard: pool.write_slot(alloc.slot),
                offset: alloc.offset,
                byte_len: alloc.byte_len,
            });
        }

        Ok(RunContext {
            def,
            inputs,
            outputs,
        })
    }

    /// The operator's graph-level name, for diagnostics.
    pub fn op_name(&self) -> &str {
        &self.def.name
    }

    /// The device this kernel variant was resolved for.
    pub fn device(&self) -> DeviceType {
        self.def.device
    }

    /// The operator definition, including loader-supplied attributes.
    pub fn op_def(&self) -> &OperatorDef {
        self.def
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, index: usize) -> &InputView<'a> {
        &self.inputs[index]
    }

    /// Splits the context into input and output views so kernels can read
    /// and write simultaneously.
    pub fn io(&mut self) -> (&[InputView<'a>], &mut [OutputView<'a>]) {
        (&self.inputs, &mut self.outputs)
    }
}
