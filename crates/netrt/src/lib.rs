//! Graph execution engine for embedded neural-network inference.
//!
//! The engine consumes a finalized operator graph from an external model
//! loader, infers tensor shapes, computes a reuse-aware allocation plan,
//! reserves pooled buffers, and dispatches operator kernels in dependency
//! order — serially or across a bounded worker pool. Kernel implementations
//! live in backend crates and register themselves through
//! [`ops::register_operator`] at process startup.

pub mod error;
pub mod executor;
pub mod graph;
pub mod memory;
pub mod ops;
pub mod planner;
pub mod profiling;
pub mod tensor;
pub mod workspace;

mod env;

pub use error::{EngineError, EngineResult, ShapeInferenceError};
pub use executor::{CancelToken, Executor, RunState};
pub use graph::{Attribute, DeviceType, Net, NetDef, OperatorDef, TensorDecl};
pub use tensor::{DType, HostTensor, Shape, TensorMeta};
pub use workspace::{RunConfig, Workspace};
