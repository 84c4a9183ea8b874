//! Shape inference and allocation planning over finalized nets.

use std::collections::{HashMap, HashSet};

use netrt::ops::{Operator, RunContext};
use netrt::planner::{infer_metas, plan_memory};
use netrt::{
    DType, EngineError, EngineResult, Net, NetDef, OperatorDef, Shape, ShapeInferenceError,
    TensorDecl, TensorMeta,
};

struct PassThrough;

impl Operator for PassThrough {
    fn infer_shapes(&self, inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        Ok(vec![inputs[0].clone()])
    }

    fn run(&self, _ctx: &mut RunContext<'_>) -> EngineResult<()> {
        Ok(())
    }
}

struct RefuseShapes;

impl Operator for RefuseShapes {
    fn infer_shapes(&self, _inputs: &[TensorMeta]) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
        Err(ShapeInferenceError::msg("unsupported layout"))
    }

    fn run(&self, _ctx: &mut RunContext<'_>) -> EngineResult<()> {
        Ok(())
    }
}

fn chain_net(len: usize) -> Net {
    let mut def = NetDef::new("chain");
    def.add_input(TensorDecl::new("t0", DType::F32, Shape::new([4])));
    for i in 0..len {
        def.add_operator(
            OperatorDef::new(format!("op{i}"), "PassThrough")
                .with_inputs([format!("t{i}")])
                .with_outputs([format!("t{}", i + 1)]),
        );
    }
    def.add_output(format!("t{len}"));
    Net::finalize(def, &HashSet::new()).unwrap()
}

fn meta_f32(dims: impl IntoIterator<Item = usize>) -> TensorMeta {
    TensorMeta::new(DType::F32, Shape::new(dims))
}

fn declared_inputs(net: &Net) -> HashMap<String, TensorMeta> {
    net.inputs()
        .iter()
        .map(|d| (d.name.clone(), TensorMeta::new(d.dtype, d.shape.clone())))
        .collect()
}

#[test]
fn chain_reuses_two_slots() {
    let net = chain_net(3);
    let operators: Vec<Box<dyn Operator>> =
        (0..3).map(|_| Box::new(PassThrough) as Box<dyn Operator>).collect();
    let metas = infer_metas(&net, &operators, &HashMap::new(), &declared_inputs(&net)).unwrap();
    let plan = plan_memory(&net, &metas).unwrap();

    // Four equally sized tensors in a straight line ping-pong between two
    // slots: a tensor dies as soon as the next operator consumes it.
    assert_eq!(plan.slots().len(), 2);
    assert_eq!(plan.peak_bytes(), 32);
    assert_eq!(plan.validate(), Ok(()));

    // Alternating slot assignment down the chain.
    let slots: Vec<usize> = (0..=3)
        .map(|i| plan.tensor(&format!("t{i}")).unwrap().slot)
        .collect();
    assert_eq!(slots, [0, 1, 0, 1]);
}

#[test]
fn net_outputs_stay_live_past_the_final_operator() {
    let net = chain_net(2);
    let operators: Vec<Box<dyn Operator>> =
        (0..2).map(|_| Box::new(PassThrough) as Box<dyn Operator>).collect();
    let metas = infer_metas(&net, &operators, &HashMap::new(), &declared_inputs(&net)).unwrap();
    let plan = plan_memory(&net, &metas).unwrap();

    let out = plan.tensor("t2").unwrap();
    assert_eq!(out.live.last_use, net.operators().len());
    let input = plan.tensor("t0").unwrap();
    assert_eq!(input.live.first_use, 0);
}

#[test]
fn constants_are_not_pooled() {
    let mut def = NetDef::new("with-weights");
    def.add_input(TensorDecl::new("x", DType::F32, Shape::new([4])));
    def.add_operator(
        OperatorDef::new("mul", "PassThrough")
            .with_inputs(["x"])
            .with_outputs(["y"]),
    );
    def.add_output("y");
    let constants: HashSet<String> = ["w".to_string()].into();
    let net = Net::finalize(def, &constants).unwrap();

    let operators: Vec<Box<dyn Operator>> = vec![Box::new(PassThrough)];
    let constant_metas: HashMap<String, TensorMeta> =
        [("w".to_string(), meta_f32([4, 4]))].into();
    let metas = infer_metas(&net, &operators, &constant_metas, &declared_inputs(&net)).unwrap();
    let plan = plan_memory(&net, &metas).unwrap();

    assert!(plan.tensor("w").is_none());
    assert!(plan.tensor("x").is_some());
    assert!(plan.tensor("y").is_some());
}

#[test]
fn shape_refusal_names_the_operator() {
    let net = chain_net(1);
    let operators: Vec<Box<dyn Operator>> = vec![Box::new(RefuseShapes)];
    let err =
        infer_metas(&net, &operators, &HashMap::new(), &declared_inputs(&net)).unwrap_err();
    assert_eq!(
        err,
        EngineError::UnresolvableShape {
            op: "op0".into(),
            reason: "unsupported layout".into(),
        }
    );
}

#[test]
fn inference_rejects_arity_drift() {
    struct TwoOutputs;
    impl Operator for TwoOutputs {
        fn infer_shapes(
            &self,
            inputs: &[TensorMeta],
        ) -> Result<Vec<TensorMeta>, ShapeInferenceError> {
            Ok(vec![inputs[0].clone(), inputs[0].clone()])
        }
        fn run(&self, _ctx: &mut RunContext<'_>) -> EngineResult<()> {
            Ok(())
        }
    }

    let net = chain_net(1);
    let operators: Vec<Box<dyn Operator>> = vec![Box::new(TwoOutputs)];
    let err =
        infer_metas(&net, &operators, &HashMap::new(), &declared_inputs(&net)).unwrap_err();
    assert!(matches!(err, EngineError::UnresolvableShape { op, .. } if op == "op0"));
}

#[test]
fn overlapping_branches_get_distinct_slots() {
    // Both branch results are alive when `join` runs, so they must not
    // share storage.
    let mut def = NetDef::new("branches");
    def.add_input(TensorDecl::new("x", DType::F32, Shape::new([4])));
    def.add_operator(
        OperatorDef::new("left", "PassThrough")
            .with_inputs(["x"])
            .with_outputs(["l"]),
    );
    def.add_operator(
        OperatorDef::new("right", "PassThrough")
            .with_inputs(["x"])
            .with_outputs(["r"]),
    );
    def.add_operator(
        OperatorDef::new("join", "PassThrough")
            .with_inputs(["l", "r"])
            .with_outputs(["y"]),
    );
    def.add_output("y");
    let net = Net::finalize(def, &HashSet::new()).unwrap();

    let operators: Vec<Box<dyn Operator>> = vec![
        Box::new(PassThrough),
        Box::new(PassThrough),
        Box::new(PassThrough),
    ];
    let metas = infer_metas(&net, &operators, &HashMap::new(), &declared_inputs(&net)).unwrap();
    let plan = plan_memory(&net, &metas).unwrap();

    let l = plan.tensor("l").unwrap();
    let r = plan.tensor("r").unwrap();
    assert_ne!(l.slot, r.slot);
    assert_eq!(plan.validate(), Ok(()));
}
