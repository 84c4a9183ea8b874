//! Operator abstraction: the polymorphic unit of computation.
//!
//! An operator owns no tensors. It declares a pure shape-inference function
//! used by the planner before any buffer exists, and a `run` contract that
//! writes into pre-allocated output views. Backend variants (CPU, GPU,
//! quantized paths) are resolved once at graph load time through the
//! process-wide registry; the executor never dispatches per call.

mod context;
mod registry;

pub use context::{InputView, OutputView, RunContext};
pub use registry::{
    create_operator, has_operator, register_operator, registered_operators, OperatorFactory,
};

use crate::error::{EngineResult, ShapeInferenceError};
use crate::tensor::TensorMeta;

/// One computation step, polymorphic over backend capability.
pub trait Operator: Send + Sync {
    /// Derives output metadata from input metadata.
    ///
    /// Pure: no side effects, no allocation of graph-level memory. Called by
    /// the memory planner during the pre-run inference pass; a refusal is
    /// wrapped into [`crate::EngineError::UnresolvableShape`] with the
    /// operator's graph-level identity attached.
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError>;

    /// Executes the transformation against bound tensor views.
    ///
    /// Inputs and outputs are pre-allocated by the pool; kernels may use
    /// transient scratch memory scoped to the call but must never allocate
    /// graph-level storage. Failures surface as
    /// [`crate::EngineError::KernelExecution`] and abort the run.
    fn run(&self, ctx: &mut RunContext<'_>) -> EngineResult<()>;
}
