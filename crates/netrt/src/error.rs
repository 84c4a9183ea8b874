//! Engine-wide error taxonomy.
//!
//! Load-time and plan-time failures are returned synchronously before any
//! kernel runs; run-time failures abort the in-flight run, release pooled
//! buffers, and surface the first error. Nothing is retried inside the
//! engine — retry policy belongs to the caller.

use thiserror::Error;

use crate::graph::DeviceType;
use crate::tensor::Shape;

/// Convenience alias for results returned by engine routines.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The operator list is malformed: an input is produced by no earlier
    /// operator and is neither a graph input nor a constant, or the graph
    /// contains a cycle. Fatal at load.
    #[error("operator {op} has an unresolved or cyclic dependency on tensor {tensor}")]
    CyclicOrUnresolvedDependency { op: String, tensor: String },

    /// Two operators claim the same output tensor name.
    #[error("tensor {tensor} is produced by both {first} and {second}")]
    DuplicateProducer {
        tensor: String,
        first: String,
        second: String,
    },

    /// A declared net output is not produced by any operator.
    #[error("declared net output {tensor} is not produced by any operator")]
    UndefinedOutput { tensor: String },

    /// An operator could not determine its output shapes from known input
    /// shapes. Signals a graph authored incorrectly; fatal for the run.
    #[error("cannot infer output shapes for operator {op}: {reason}")]
    UnresolvableShape { op: String, reason: String },

    /// The platform allocator could not satisfy a pool reservation.
    /// Recoverable: the caller may retry with a smaller graph.
    #[error("memory pool reservation of {requested} bytes failed")]
    OutOfMemory { requested: usize },

    /// No kernel factory is registered for the operator type on the
    /// requested device.
    #[error("no kernel registered for operator type {op_type} on {device:?}")]
    UnknownOperator {
        op_type: String,
        device: DeviceType,
    },

    /// An operator kernel failed during execution. Aborts the run; carries
    /// the operator identity and a backend-specific diagnostic code.
    #[error("kernel {op} failed on {device:?} (code {code}): {detail}")]
    KernelExecution {
        op: String,
        device: DeviceType,
        code: i32,
        detail: String,
    },

    /// A run input's shape diverges from the shape the active plan was
    /// computed for, and replanning was not requested.
    #[error("input {tensor} has shape {got} but the active plan expects {planned}")]
    ShapeMismatch {
        tensor: String,
        planned: Shape,
        got: Shape,
    },

    /// A declared graph input was not supplied at run time.
    #[error("run is missing a value for graph input {tensor}")]
    MissingInput { tensor: String },

    /// The run was cancelled cooperatively between operator boundaries.
    #[error("run cancelled")]
    Cancelled,
}

impl EngineError {
    /// Builds a [`EngineError::KernelExecution`] for the named operator.
    pub fn kernel(
        op: impl Into<String>,
        device: DeviceType,
        code: i32,
        detail: impl Into<String>,
    ) -> Self {
        EngineError::KernelExecution {
            op: op.into(),
            device,
            code,
            detail: detail.into(),
        }
    }
}

/// Failure reported by an operator's shape inference function.
///
/// Kernels do not know their graph-level name; the planner wraps this into
/// [`EngineError::UnresolvableShape`] with the operator identity attached.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ShapeInferenceError(pub String);

impl ShapeInferenceError {
    pub fn msg(reason: impl Into<String>) -> Self {
        ShapeInferenceError(reason.into())
    }
}
