//! Workspace: process of record for one loaded model instance.
//!
//! Created once per model, the workspace binds the finalized net, the
//! resolved kernels, persistent constant tensors, and the active
//! allocation plan. It is mutated only during load (populate) and run
//! (tensor contents) — never restructured mid-run. Completed runs may be
//! repeated with the plan reused as long as input shapes match; shape
//! changes either fail with `ShapeMismatch` or, when replanning is
//! allowed, resolve through an LRU cache of previously computed plans.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use lru::LruCache;

use crate::env;
use crate::error::{EngineError, EngineResult};
use crate::executor::{CancelToken, Executor, RunState};
use crate::graph::{Net, NetDef};
use crate::memory::Pool;
use crate::ops::{self, Operator};
use crate::planner::{self, AllocationPlan};
use crate::profiling;
use crate::tensor::{HostTensor, TensorMeta};

/// Execution configuration for one workspace.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Worker pool size; `0` selects one worker per available core. The
    /// `NETRT_NUM_WORKERS` environment variable overrides either setting.
    pub workers: usize,
    /// Whether an input-shape change replans instead of failing.
    pub allow_replan: bool,
    /// Retained plans per workspace before LRU eviction.
    pub plan_cache_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            workers: 1,
            allow_replan: false,
            plan_cache_capacity: 8,
        }
    }
}

impl RunConfig {
    /// One worker per available core.
    pub fn parallel() -> Self {
        RunConfig {
            workers: 0,
            ..RunConfig::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_replan(mut self) -> Self {
        self.allow_replan = true;
        self
    }

    fn effective_workers(&self) -> usize {
        if let Some(count) = env::worker_override() {
            return count;
        }
        if self.workers == 0 {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            self.workers
        }
    }
}

#[derive(PartialEq, Eq, Hash)]
struct PlanKey(Vec<(String, TensorMeta)>);

/// Runtime container binding tensors, operators, and the active plan for
/// one model instance.
pub struct Workspace {
    net: Net,
    operators: Vec<Box<dyn Operator>>,
    constants: HashMap<String, Arc<HostTensor>>,
    constant_metas: HashMap<String, TensorMeta>,
    plan: Arc<AllocationPlan>,
    plan_cache: LruCache<PlanKey, Arc<AllocationPlan>>,
    config: RunConfig,
    state: RunState,
    outputs: HashMap<String, HostTensor>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace").finish_non_exhaustive()
    }
}

impl Workspace {
    /// Loads a finalized net definition: validates and sorts the graph,
    /// resolves kernels from the registry, runs the shape-inference pass
    /// for the declared input shapes, and computes the allocation plan.
    /// Every failure here is returned before any execution begins.
    pub fn load(
        def: NetDef,
        constants: HashMap<String, HostTensor>,
        config: RunConfig,
    ) -> EngineResult<Workspace> {
        let constant_names: HashSet<String> = constants.keys().cloned().collect();
        let net = Net::finalize(def, &constant_names)?;

        let operators = net
            .operators()
            .iter()
            .map(ops::create_operator)
            .collect::<EngineResult<Vec<_>>>()?;

        let constants: HashMap<String, Arc<HostTensor>> = constants
            .into_iter()
            .map(|(name, tensor)| (name, Arc::new(tensor)))
            .collect();
        let constant_metas: HashMap<String, TensorMeta> = constants
            .iter()
            .map(|(name, tensor)| (name.clone(), tensor.meta().clone()))
            .collect();

        let declared_inputs: HashMap<String, TensorMeta> = net
            .inputs()
            .iter()
            .map(|decl| {
                (
                    decl.name.clone(),
                    TensorMeta::new(decl.dtype, decl.shape.clone()),
                )
            })
            .collect();
        let metas = planner::infer_metas(&net, &operators, &constant_metas, &declared_inputs)?;
        let plan = Arc::new(planner::plan_memory(&net, &metas)?);

        let capacity = NonZeroUsize::new(config.plan_cache_capacity.max(1))
            .expect("plan cache capacity is at least one");
        let mut plan_cache = LruCache::new(capacity);
        plan_cache.put(
            PlanKey(plan.input_signature().to_vec()),
            Arc::clone(&plan),
        );

        Ok(Workspace {
            net,
            operators,
            constants,
            constant_metas,
            plan,
            plan_cache,
            config,
            state: RunState::Planned,
            outputs: HashMap::new(),
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    /// The active allocation plan.
    pub fn plan(&self) -> &AllocationPlan {
        &self.plan
    }

    /// Output tensor from the last completed run, by name.
    pub fn output(&self, name: &str) -> Option<&HostTensor> {
        self.outputs.get(name)
    }

    /// Runs the net against the supplied input values.
    pub fn run(
        &mut self,
        inputs: &HashMap<String, HostTensor>,
    ) -> EngineResult<HashMap<String, HostTensor>> {
        self.run_with_cancel(inputs, &CancelToken::new())
    }

    /// Runs with a cooperative cancellation token. A cancelled run fails
    /// with [`EngineError::Cancelled`] and releases resources exactly like
    /// any other failure.
    pub fn run_with_cancel(
        &mut self,
        inputs: &HashMap<String, HostTensor>,
        cancel: &CancelToken,
    ) -> EngineResult<HashMap<String, HostTensor>> {
        for decl in self.net.inputs() {
            if !inputs.contains_key(&decl.name) {
                return Err(EngineError::MissingInput {
                    tensor: decl.name.clone(),
                });
            }
        }
        self.ensure_plan(inputs)?;

        let pool = Pool::reserve(&self.plan)?;
        for decl in self.net.inputs() {
            let tensor = &inputs[&decl.name];
            let alloc = self
                .plan
                .tensor(&decl.name)
                .expect("every graph input is planned");
            let mut slot = pool.write_slot(alloc.slot);
            slot.as_bytes_mut()[alloc.offset..alloc.offset + alloc.byte_len]
                .copy_from_slice(tensor.bytes());
        }

        self.state = RunState::Running;
        let executor = Executor::new(self.config.effective_workers());
        if let Err(err) = executor.run(
            &self.net,
            &self.operators,
            &self.plan,
            &pool,
            &self.constants,
            cancel,
        ) {
            // Failed runs never commit partial outputs into the workspace.
            self.state = RunState::Failed;
            pool.release();
            return Err(err);
        }

        let mut outputs = HashMap::with_capacity(self.net.outputs().len());
        for name in self.net.outputs() {
            if let Some(constant) = self.constants.get(name) {
                outputs.insert(name.clone(), HostTensor::clone(constant));
                continue;
            }
            let alloc = self
                .plan
                .tensor(name)
                .expect("every declared output is planned");
            let slot = pool.read_slot(alloc.slot);
            let bytes = &slot.as_bytes()[alloc.offset..alloc.offset + alloc.byte_len];
            outputs.insert(name.clone(), HostTensor::from_raw(alloc.meta.clone(), bytes));
            drop(slot);
        }
        pool.release();
        self.state = RunState::Completed;
        self.outputs = outputs.clone();
        Ok(outputs)
    }

    /// Reuses the active plan when the run's input metadata matches it;
    /// otherwise replans (through the plan cache) or fails with
    /// [`EngineError::ShapeMismatch`].
    fn ensure_plan(&mut self, inputs: &HashMap<String, HostTensor>) -> EngineResult<()> {
        let mut signature: Vec<(String, TensorMeta)> = self
            .net
            .inputs()
            .iter()
            .map(|decl| (decl.name.clone(), inputs[&decl.name].meta().clone()))
            .collect();
        signature.sort_by(|a, b| a.0.cmp(&b.0));

        if signature == self.plan.input_signature() {
            return Ok(());
        }

        if !self.config.allow_replan {
            self.state = RunState::Idle;
            let (tensor, planned, got) = signature
                .iter()
                .zip(self.plan.input_signature())
                .find(|(got, planned)| got != planned)
                .map(|(got, planned)| {
                    (
                        got.0.clone(),
                        planned.1.shape.clone(),
                        got.1.shape.clone(),
                    )
                })
                .expect("diverging signatures contain a differing entry");
            return Err(EngineError::ShapeMismatch {
                tensor,
                planned,
                got,
            });
        }

        self.state = RunState::Idle;
        let key = PlanKey(signature.clone());
        if let Some(plan) = self.plan_cache.get(&key) {
            profiling::cache_event("plan_cache_hit");
            self.plan = Arc::clone(plan);
        } else {
            profiling::cache_event("plan_cache_replan");
            let input_metas: HashMap<String, TensorMeta> = signature.into_iter().collect();
            let metas = planner::infer_metas(
                &self.net,
                &self.operators,
                &self.constant_metas,
                &input_metas,
            )?;
            let plan = Arc::new(planner::plan_memory(&self.net, &metas)?);
            self.plan_cache.put(key, Arc::clone(&plan));
            self.plan = plan;
        }
        self.state = RunState::Planned;
        Ok(())
    }
}
