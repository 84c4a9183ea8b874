//! Process-wide operator kernel registry.
//!
//! Backend kernel crates call [`register_operator`] at process
//! initialization; the engine consumes the registry at graph load time to
//! resolve `(operator type, device)` pairs into callable [`Operator`]
//! instances. After startup the registry is effectively read-only, so
//! concurrent lookup is cheap.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::error::{EngineError, EngineResult};
use crate::graph::{DeviceType, OperatorDef};
use crate::ops::Operator;

/// Factory that builds a configured kernel from its operator definition.
pub type OperatorFactory = Box<dyn Fn(&OperatorDef) -> EngineResult<Box<dyn Operator>> + Send + Sync>;

struct OperatorRegistry {
    factories: RwLock<HashMap<(String, DeviceType), OperatorFactory>>,
}

impl OperatorRegistry {
    fn new() -> Self {
        OperatorRegistry {
            factories: RwLock::new(HashMap::new()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<OperatorRegistry> = OnceLock::new();

fn global_registry() -> &'static OperatorRegistry {
    GLOBAL_REGISTRY.get_or_init(OperatorRegistry::new)
}

/// Registers a kernel factory for an operator type on a device.
///
/// The registry is write-once per `(op_type, device)` pair: the first
/// registration wins and later calls are ignored, so the kernel a loaded
/// workspace resolved can never change underneath it.
pub fn register_operator<F>(op_type: impl Into<String>, device: DeviceType, factory: F)
where
    F: Fn(&OperatorDef) -> EngineResult<Box<dyn Operator>> + Send + Sync + 'static,
{
    global_registry()
        .factories
        .write()
        .expect("operator registry poisoned")
        .entry((op_type.into(), device))
        .or_insert_with(|| Box::new(factory));
}

/// Resolves an operator definition into a concrete kernel instance.
pub fn create_operator(def: &OperatorDef) -> EngineResult<Box<dyn Operator>> {
    let registry = global_registry()
        .factories
        .read()
        .expect("operator registry poisoned");
    let factory =
        registry
            .get(&(def.op_type.clone(), def.device))
            .ok_or_else(|| EngineError::UnknownOperator {
                op_type: def.op_type.clone(),
                device: def.device,
            })?;
    factory(def)
}

/// Checks whether a kernel is registered for the type/device pair.
pub fn has_operator(op_type: &str, device: DeviceType) -> bool {
    global_registry()
        .factories
        .read()
        .expect("operator registry poisoned")
        .contains_key(&(op_type.to_string(), device))
}

/// Lists all registered `(operator type, device)` pairs, sorted.
pub fn registered_operators() -> Vec<(String, DeviceType)> {
    let mut entries: Vec<(String, DeviceType)> = global_registry()
        .factories
        .read()
        .expect("operator registry poisoned")
        .keys()
        .cloned()
        .collect();
    entries.sort();
    entries
}
