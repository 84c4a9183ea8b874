//! Loader-facing graph definitions.
//!
//! The engine does not parse any serialized model format; the external code
//! generator / model loader constructs these structs directly (they derive
//! serde so loaders may also move them across process boundaries).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tensor::{DType, Shape};

/// Compute target an operator variant executes on. Resolved once at graph
/// load time; the executor is agnostic to which variant an operator is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum DeviceType {
    #[default]
    Cpu,
    Gpu,
    Dsp,
}

/// Typed operator attribute supplied by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Int(i64),
    Float(f32),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f32>),
}

/// One operator instance in a net definition: a unique name, the registered
/// kernel type, named tensor dependencies, device affinity, and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub device: DeviceType,
    #[serde(default)]
    pub attrs: BTreeMap<String, Attribute>,
}

impl OperatorDef {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        OperatorDef {
            name: name.into(),
            op_type: op_type.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            device: DeviceType::default(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_device(mut self, device: DeviceType) -> Self {
        self.device = device;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Attribute) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn int_attr(&self, key: &str) -> Option<i64> {
        match self.attrs.get(key) {
            Some(Attribute::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn float_attr(&self, key: &str) -> Option<f32> {
        match self.attrs.get(key) {
            Some(Attribute::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn str_attr(&self, key: &str) -> Option<&str> {
        match self.attrs.get(key) {
            Some(Attribute::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn int_list_attr(&self, key: &str) -> Option<&[i64]> {
        match self.attrs.get(key) {
            Some(Attribute::IntList(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// Declaration of a graph input tensor with the shape the net is planned
/// for. Runs may supply differently shaped inputs only through replanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDecl {
    pub name: String,
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorDecl {
    pub fn new(name: impl Into<String>, dtype: DType, shape: Shape) -> Self {
        TensorDecl {
            name: name.into(),
            dtype,
            shape,
        }
    }
}

/// Mutable, pre-finalize net definition assembled by the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetDef {
    pub name: String,
    pub operators: Vec<OperatorDef>,
    pub inputs: Vec<TensorDecl>,
    pub outputs: Vec<String>,
}

impl NetDef {
    pub fn new(name: impl Into<String>) -> Self {
        NetDef {
            name: name.into(),
            ..NetDef::default()
        }
    }

    pub fn add_input(&mut self, decl: TensorDecl) -> &mut Self {
        self.inputs.push(decl);
        self
    }

    pub fn add_operator(&mut self, op: OperatorDef) -> &mut Self {
        self.operators.push(op);
        self
    }

    pub fn add_output(&mut self, name: impl Into<String>) -> &mut Self {
        self.outputs.push(name.into());
        self
    }
}
