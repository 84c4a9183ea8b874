//! Graph definitions handed over by the external model loader and the
//! finalized, immutable execution plan built from them.

mod def;
mod net;

pub use def::{Attribute, DeviceType, NetDef, OperatorDef, TensorDecl};
pub use net::Net;
