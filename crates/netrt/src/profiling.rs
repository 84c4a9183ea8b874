//! Lightweight process-wide execution statistics.
//!
//! Aggregates per-operator call counts and wall time plus named cache
//! events (plan cache hits, replans). Reports are drained with
//! [`take_report`], which tests and embedding tools use to observe engine
//! behaviour without a logging framework.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpStat {
    pub calls: u64,
    pub total: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileReport {
    pub ops: BTreeMap<String, OpStat>,
    pub events: BTreeMap<String, u64>,
}

#[derive(Default)]
struct ProfilerState {
    ops: BTreeMap<String, OpStat>,
    events: BTreeMap<String, u64>,
}

static PROFILER: Lazy<Mutex<ProfilerState>> = Lazy::new(|| Mutex::new(ProfilerState::default()));

/// Records one completed operator invocation.
pub fn record_op(name: &str, elapsed: Duration) {
    let mut state = PROFILER.lock().expect("profiler poisoned");
    let stat = state.ops.entry(name.to_string()).or_default();
    stat.calls += 1;
    stat.total += elapsed;
}

/// Bumps a named counter (e.g. `"plan_cache_hit"`).
pub fn cache_event(name: &str) {
    let mut state = PROFILER.lock().expect("profiler poisoned");
    *state.events.entry(name.to_string()).or_default() += 1;
}

/// Drains and returns the accumulated statistics.
pub fn take_report() -> ProfileReport {
    let mut state = PROFILER.lock().expect("profiler poisoned");
    ProfileReport {
        ops: std::mem::take(&mut state.ops),
        events: std::mem::take(&mut state.events),
    }
}
