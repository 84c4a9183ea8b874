//! Pooled tensor storage satisfying an allocation plan.

mod pool;

pub use pool::Pool;
