//! Finalized, immutable execution plan.
//!
//! `Net::finalize` validates that every operator input is resolvable,
//! rejects cycles and duplicate producers, and fixes a deterministic
//! topological operator order. After finalize the net never mutates; any
//! change requires constructing a new net from a fresh [`NetDef`].

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, EngineResult};
use crate::graph::def::{NetDef, OperatorDef, TensorDecl};

/// Immutable, topologically ordered operator graph.
#[derive(Debug)]
pub struct Net {
    name: String,
    operators: Vec<OperatorDef>,
    inputs: Vec<TensorDecl>,
    outputs: Vec<String>,
    constants: HashSet<String>,
    /// Tensor name -> index of the producing operator in `operators`.
    producers: HashMap<String, usize>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
}

impl Net {
    /// Validates and topologically sorts an operator list.
    ///
    /// `constants` names the persistent tensors (weights) the workspace
    /// binds outside the reuse pool; operators may consume them like any
    /// other tensor. The resulting order is deterministic: among operators
    /// that are simultaneously ready, definition order wins.
    pub fn finalize(def: NetDef, constants: &HashSet<String>) -> EngineResult<Net> {
        let mut producer_names: HashMap<&str, &str> = HashMap::new();
        for input in &def.inputs {
            producer_names.insert(input.name.as_str(), "<graph input>");
        }
        for name in constants {
            producer_names.insert(name.as_str(), "<constant>");
        }
        for op in &def.operators {
            for output in &op.outputs {
                if let Some(first) = producer_names.insert(output.as_str(), op.name.as_str()) {
                    return Err(EngineError::DuplicateProducer {
                        tensor: output.clone(),
                        first: first.to_string(),
                        second: op.name.clone(),
                    });
                }
            }
        }
        for output in &def.outputs {
            if !producer_names.contains_key(output.as_str()) {
                return Err(EngineError::UndefinedOutput {
                    tensor: output.clone(),
                });
            }
        }

        let mut available: HashSet<&str> = def
            .inputs
            .iter()
            .map(|decl| decl.name.as_str())
            .chain(constants.iter().map(String::as_str))
            .collect();

        // Stable Kahn sort: repeatedly sweep the remaining operators in
        // definition order and place every operator whose inputs are all
        // available. O(n^2) worst case, which is fine at graph scale.
        let mut remaining: Vec<Option<&OperatorDef>> = def.operators.iter().map(Some).collect();
        let mut order: Vec<usize> = Vec::with_capacity(def.operators.len());
        let mut placed = 0usize;
        while placed < def.operators.len() {
            let mut progressed = false;
            for (idx, slot) in remaining.iter_mut().enumerate() {
                let Some(op) = slot else { continue };
                if op
                    .inputs
                    .iter()
                    .all(|input| available.contains(input.as_str()))
                {
                    for output in &op.outputs {
                        available.insert(output.as_str());
                    }
                    order.push(idx);
                    *slot = None;
                    placed += 1;
                    progressed = true;
                }
            }
            if !progressed {
                // Every remaining operator is blocked; report the first one
                // together with its first unresolved input.
                let blocked = remaining
                    .iter()
                    .flatten()
                    .next()
                    .expect("unplaced operator must remain when no progress is made");
                let missing = blocked
                    .inputs
                    .iter()
                    .find(|input| !available.contains(input.as_str()))
                    .expect("blocked operator must have an unavailable input");
                return Err(EngineError::CyclicOrUnresolvedDependency {
                    op: blocked.name.clone(),
                    tensor: missing.clone(),
                });
            }
        }

        let operators: Vec<OperatorDef> = {
            let mut defs: Vec<Option<OperatorDef>> = def.operators.into_iter().map(Some).collect();
            order
                .iter()
                .map(|&idx| defs[idx].take().expect("operator placed exactly once"))
                .collect()
        };

        let mut producers: HashMap<String, usize> = HashMap::new();
        for (idx, op) in operators.iter().enumerate() {
            for output in &op.outputs {
                producers.insert(output.clone(), idx);
            }
        }

        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); operators.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); operators.len()];
        for (idx, op) in operators.iter().enumerate() {
            for input in &op.inputs {
                if let Some(&producer) = producers.get(input) {
                    if !predecessors[idx].contains(&producer) {
                        predecessors[idx].push(producer);
                        successors[producer].push(idx);
                    }
                }
            }
        }

        Ok(Net {
            name: def.name,
            operators,
            inputs: def.inputs,
            outputs: def.outputs,
            constants: constants.clone(),
            producers,
            predecessors,
            successors,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read-only ordered operator sequence for iteration by the executor.
    pub fn operators(&self) -> &[OperatorDef] {
        &self.operators
    }

    pub fn inputs(&self) -> &[TensorDecl] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn is_constant(&self, tensor: &str) -> bool {
        self.constants.contains(tensor)
    }

    /// Index of the operator producing `tensor`, if any operator does.
    pub fn producer(&self, tensor: &str) -> Option<usize> {
        self.producers.get(tensor).copied()
    }

    /// Topological predecessors of the operator at `idx`.
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        &self.predecessors[idx]
    }

    /// Topological successors of the operator at `idx`.
    pub fn successors(&self, idx: usize) -> &[usize] {
        &self.successors[idx]
    }
}
