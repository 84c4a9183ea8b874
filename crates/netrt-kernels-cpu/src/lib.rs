//! Reference CPU kernels for the netrt engine.
//!
//! These are straightforward scalar implementations meant for correctness
//! testing and as the default backend on hosts; production deployments
//! substitute tuned backend crates that register the same operator types.

mod activation;
mod cast;
mod elementwise;
mod linalg;
mod quant;
mod shape_ops;

pub use activation::{Relu, Softmax};
pub use cast::Cast;
pub use elementwise::{BinaryOp, EltwiseBinary};
pub use linalg::{BiasAdd, MatMul};
pub use quant::{Dequantize, Quantize};
pub use shape_ops::{Concat, Reshape};

use std::sync::Once;

use netrt::ops::{register_operator, Operator};
use netrt::DeviceType;

static REGISTER: Once = Once::new();

/// Registers every reference kernel with the global operator registry.
///
/// Idempotent; call once at process initialization before constructing any
/// workspace.
pub fn register() {
    REGISTER.call_once(|| {
        register_operator("Add", DeviceType::Cpu, |_| {
            Ok(Box::new(EltwiseBinary::new(BinaryOp::Add)) as Box<dyn Operator>)
        });
        register_operator("Sub", DeviceType::Cpu, |_| {
            Ok(Box::new(EltwiseBinary::new(BinaryOp::Sub)) as Box<dyn Operator>)
        });
        register_operator("Mul", DeviceType::Cpu, |_| {
            Ok(Box::new(EltwiseBinary::new(BinaryOp::Mul)) as Box<dyn Operator>)
        });
        register_operator("Relu", DeviceType::Cpu, |_| {
            Ok(Box::new(Relu) as Box<dyn Operator>)
        });
        register_operator("Softmax", DeviceType::Cpu, |def| {
            Ok(Box::new(Softmax::from_def(def)) as Box<dyn Operator>)
        });
        register_operator("MatMul", DeviceType::Cpu, |_| {
            Ok(Box::new(MatMul) as Box<dyn Operator>)
        });
        register_operator("BiasAdd", DeviceType::Cpu, |_| {
            Ok(Box::new(BiasAdd) as Box<dyn Operator>)
        });
        register_operator("Reshape", DeviceType::Cpu, |def| {
            Ok(Box::new(Reshape::from_def(def)?) as Box<dyn Operator>)
        });
        register_operator("Concat", DeviceType::Cpu, |def| {
            Ok(Box::new(Concat::from_def(def)?) as Box<dyn Operator>)
        });
        register_operator("Cast", DeviceType::Cpu, |def| {
            Ok(Box::new(Cast::from_def(def)?) as Box<dyn Operator>)
        });
        register_operator("Quantize", DeviceType::Cpu, |def| {
            Ok(Box::new(Quantize::from_def(def)?) as Box<dyn Operator>)
        });
        register_operator("Dequantize", DeviceType::Cpu, |def| {
            Ok(Box::new(Dequantize::from_def(def)?) as Box<dyn Operator>)
        });
    });
}
