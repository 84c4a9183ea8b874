//! Scheduler/executor: walks the finalized net in dependency order and
//! invokes each operator against planned pool storage.
//!
//! Single-threaded execution follows topological order directly, so no
//! runtime dependency checking is needed. The parallel path keeps a
//! per-operator counter of unresolved predecessors; each completion
//! decrements its successors and dispatches any operator that reaches
//! zero onto a bounded worker pool. The parallel schedule honours the
//! net's data edges plus anti-dependency edges for pool slot reuse, so
//! output values are deterministic and independent of worker count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::env;
use crate::error::{EngineError, EngineResult};
use crate::graph::Net;
use crate::memory::Pool;
use crate::ops::{Operator, RunContext};
use crate::planner::{AllocationPlan, TensorAlloc};
use crate::profiling;
use crate::tensor::HostTensor;

/// Lifecycle of one workspace run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No plan computed yet (or invalidated by a shape change).
    Idle,
    /// Plan computed and reusable; buffers not yet reserved.
    Planned,
    /// Operators executing.
    Running,
    /// All operators finished; outputs are valid for reading.
    Completed,
    /// A run aborted; pooled buffers were released and no outputs were
    /// committed.
    Failed,
}

/// Cooperative cancellation handle, checked between operator boundaries
/// (never mid-kernel).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Executes a finalized net over reserved pool storage.
pub struct Executor {
    workers: usize,
}

impl Executor {
    /// `workers` is clamped to at least one; one worker selects the serial
    /// path.
    pub fn new(workers: usize) -> Self {
        Executor {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs every operator once. On the first failure remaining operators
    /// are abandoned (in-flight parallel operators finish, their results
    /// are discarded with the pool) and the error is surfaced; the caller
    /// owns the pool and releases it on every exit path.
    pub fn run(
        &self,
        net: &Net,
        operators: &[Box<dyn Operator>],
        plan: &AllocationPlan,
        pool: &Pool,
        constants: &HashMap<String, Arc<HostTensor>>,
        cancel: &CancelToken,
    ) -> EngineResult<()> {
        debug_assert_eq!(net.operators().len(), operators.len());
        if self.workers == 1 || net.operators().len() <= 1 {
            self.run_serial(net, operators, plan, pool, constants, cancel)
        } else {
            self.run_parallel(net, operators, plan, pool, constants, cancel)
        }
    }

    fn run_serial(
        &self,
        net: &Net,
        operators: &[Box<dyn Operator>],
        plan: &AllocationPlan,
        pool: &Pool,
        constants: &HashMap<String, Arc<HostTensor>>,
        cancel: &CancelToken,
    ) -> EngineResult<()> {
        for (def, op) in net.operators().iter().zip(operators) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let started = Instant::now();
            let mut ctx = RunContext::bind(def, plan, pool, constants)?;
            op.run(&mut ctx)?;
            if env::profile_enabled() {
                profiling::record_op(&def.name, started.elapsed());
            }
        }
        Ok(())
    }

    fn run_parallel(
        &self,
        net: &Net,
        operators: &[Box<dyn Operator>],
        plan: &AllocationPlan,
        pool: &Pool,
        constants: &HashMap<String, Arc<HostTensor>>,
        cancel: &CancelToken,
    ) -> EngineResult<()> {
        let op_count = net.operators().len();
        let (successors, mut pending) = schedule_edges(net, plan);

        let run_one = |idx: usize| -> EngineResult<()> {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let def = &net.operators()[idx];
            let started = Instant::now();
            let mut ctx = RunContext::bind(def, plan, pool, constants)?;
            operators[idx].run(&mut ctx)?;
            if env::profile_enabled() {
                profiling::record_op(&def.name, started.elapsed());
            }
            Ok(())
        };
        let run_one = &run_one;

        let (task_tx, task_rx) = mpsc::channel::<usize>();
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (done_tx, done_rx) = mpsc::channel::<(usize, EngineResult<()>)>();

        thread::scope(|scope| {
            for _ in 0..self.workers.min(op_count) {
                let task_rx = Arc::clone(&task_rx);
                let done_tx = done_tx.clone();
                scope.spawn(move || loop {
                    let task = {
                        let rx = task_rx.lock().expect("task queue lock poisoned");
                        rx.recv()
                    };
                    let Ok(idx) = task else { break };
                    if done_tx.send((idx, run_one(idx))).is_err() {
                        break;
                    }
                });
            }
            drop(done_tx);

            let mut in_flight = 0usize;
            for (idx, &count) in pending.iter().enumerate() {
                if count == 0 {
                    task_tx.send(idx).expect("worker pool hung up");
                    in_flight += 1;
                }
            }

            let mut first_error: Option<EngineError> = None;
            while in_flight > 0 {
                let (idx, result) = done_rx.recv().expect("worker pool hung up");
                in_flight -= 1;
                match result {
                    Ok(()) if first_error.is_none() => {
                        for &succ in &successors[idx] {
                            pending[succ] -= 1;
                            if pending[succ] == 0 {
                                task_tx.send(succ).expect("worker pool hung up");
                                in_flight += 1;
                            }
                        }
                    }
                    // After a failure in-flight operators drain but nothing
                    // new is dispatched; their outputs die with the pool.
                    Ok(()) => {}
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
            drop(task_tx);

            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}

/// Successor lists and initial pending counts for the parallel schedule.
///
/// Starts from the net's data-dependency edges and adds an anti-dependency
/// edge for every pool slot handover: when a later operator's output takes
/// over a slot from an earlier tensor, the reusing operator must wait for
/// the previous tenant's producer and every one of its consumers.
/// Lifetimes in a slot are disjoint, so the added edges always point
/// forward in topological order and can never create a cycle.
fn schedule_edges(net: &Net, plan: &AllocationPlan) -> (Vec<Vec<usize>>, Vec<usize>) {
    let op_count = net.operators().len();
    let mut successors: Vec<Vec<usize>> = (0..op_count)
        .map(|idx| net.successors(idx).to_vec())
        .collect();
    let mut pending: Vec<usize> = (0..op_count)
        .map(|idx| net.predecessors(idx).len())
        .collect();

    let mut consumers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, def) in net.operators().iter().enumerate() {
        for input in &def.inputs {
            consumers.entry(input.as_str()).or_default().push(idx);
        }
    }

    let mut tenants: HashMap<usize, Vec<(&str, &TensorAlloc)>> = HashMap::new();
    for (name, alloc) in plan.tensors() {
        tenants
            .entry(alloc.slot)
            .or_default()
            .push((name.as_str(), alloc));
    }
    for slot_tenants in tenants.values_mut() {
        slot_tenants.sort_by_key(|(_, alloc)| alloc.live.first_use);
        for pair in slot_tenants.windows(2) {
            let (prev_name, prev_alloc) = pair[0];
            let (_, next_alloc) = pair[1];
            if prev_alloc.live.overlaps(&next_alloc.live) {
                // Overlapping tenants occupy disjoint byte ranges and need
                // no ordering.
                continue;
            }
            // A reusing tensor is always an operator output, so its first
            // use is the producing operator's index.
            let reuser = next_alloc.live.first_use;
            let touchers = consumers
                .get(prev_name)
                .map(Vec::as_slice)
                .unwrap_or(&[])
                .iter()
                .copied()
                .chain(net.producer(prev_name));
            for src in touchers {
                if src != reuser && !successors[src].contains(&reuser) {
                    successors[src].push(reuser);
                    pending[reuser] += 1;
                }
            }
        }
    }
    (successors, pending)
}
