//! End-to-end graph runs through the reference CPU kernels.

use std::collections::HashMap;

use half::f16;

use netrt::{
    Attribute, DType, HostTensor, NetDef, OperatorDef, RunConfig, Shape, TensorDecl, Workspace,
};

fn load(
    def: NetDef,
    constants: HashMap<String, HostTensor>,
    config: RunConfig,
) -> Workspace {
    netrt_kernels_cpu::register();
    Workspace::load(def, constants, config).unwrap()
}

fn assert_close(got: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(got.len(), expected.len());
    for (i, (g, e)) in got.iter().zip(expected).enumerate() {
        assert!(
            (g - e).abs() <= tol,
            "element {i}: got {g}, expected {e} (tolerance {tol})"
        );
    }
}

#[test]
fn mlp_forward_matches_reference_arithmetic() {
    // x[2,3] @ w[3,4] + b[4], relu, softmax over the last axis.
    let x_data = [0.5f32, -1.0, 2.0, 1.5, 0.0, -0.5];
    let w_data = [
        0.1f32, -0.2, 0.3, 0.4, //
        0.5, 0.6, -0.7, 0.8, //
        -0.9, 1.0, 1.1, -1.2,
    ];
    let b_data = [0.05f32, -0.05, 0.1, 0.0];

    let mut def = NetDef::new("mlp");
    def.add_input(TensorDecl::new("x", DType::F32, Shape::new([2, 3])));
    def.add_operator(
        OperatorDef::new("fc", "MatMul")
            .with_inputs(["x", "w"])
            .with_outputs(["fc_out"]),
    );
    def.add_operator(
        OperatorDef::new("bias", "BiasAdd")
            .with_inputs(["fc_out", "b"])
            .with_outputs(["bias_out"]),
    );
    def.add_operator(
        OperatorDef::new("act", "Relu")
            .with_inputs(["bias_out"])
            .with_outputs(["act_out"]),
    );
    def.add_operator(
        OperatorDef::new("prob", "Softmax")
            .with_inputs(["act_out"])
            .with_outputs(["y"]),
    );
    def.add_output("y");

    let constants: HashMap<String, HostTensor> = [
        ("w".to_string(), HostTensor::from_f32(Shape::new([3, 4]), &w_data)),
        ("b".to_string(), HostTensor::from_f32(Shape::new([4]), &b_data)),
    ]
    .into();
    let mut ws = load(def, constants, RunConfig::default());

    let inputs: HashMap<String, HostTensor> =
        [("x".to_string(), HostTensor::from_f32(Shape::new([2, 3]), &x_data))].into();
    let outputs = ws.run(&inputs).unwrap();
    let y = outputs["y"].as_f32();

    // Reference computation with the same operation order.
    let mut expected = [0.0f32; 8];
    for i in 0..2 {
        for j in 0..4 {
            let mut acc = 0.0f32;
            for p in 0..3 {
                acc += x_data[i * 3 + p] * w_data[p * 4 + j];
            }
            expected[i * 4 + j] = (acc + b_data[j]).max(0.0);
        }
    }
    for row in expected.chunks_mut(4) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }

    assert_close(y, &expected, 1e-6);
    for row in y.chunks(4) {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}

#[test]
fn concat_then_reshape_preserves_row_layout() {
    let mut def = NetDef::new("layout");
    def.add_input(TensorDecl::new("a", DType::F32, Shape::new([2, 2])));
    def.add_input(TensorDecl::new("b", DType::F32, Shape::new([2, 2])));
    def.add_operator(
        OperatorDef::new("cat", "Concat")
            .with_inputs(["a", "b"])
            .with_outputs(["stacked"])
            .with_attr("axis", Attribute::Int(0)),
    );
    def.add_operator(
        OperatorDef::new("flat", "Reshape")
            .with_inputs(["stacked"])
            .with_outputs(["y"])
            .with_attr("shape", Attribute::IntList(vec![2, -1])),
    );
    def.add_output("y");

    let mut ws = load(def, HashMap::new(), RunConfig::default());
    let inputs: HashMap<String, HostTensor> = [
        (
            "a".to_string(),
            HostTensor::from_f32(Shape::new([2, 2]), &[1.0, 2.0, 3.0, 4.0]),
        ),
        (
            "b".to_string(),
            HostTensor::from_f32(Shape::new([2, 2]), &[5.0, 6.0, 7.0, 8.0]),
        ),
    ]
    .into();
    let outputs = ws.run(&inputs).unwrap();

    let y = &outputs["y"];
    assert_eq!(y.shape(), &Shape::new([2, 4]));
    assert_eq!(y.as_f32(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
}

#[test]
fn concat_along_trailing_axis_interleaves_rows() {
    let mut def = NetDef::new("cat-last");
    def.add_input(TensorDecl::new("a", DType::F32, Shape::new([2, 1])));
    def.add_input(TensorDecl::new("b", DType::F32, Shape::new([2, 2])));
    def.add_operator(
        OperatorDef::new("cat", "Concat")
            .with_inputs(["a", "b"])
            .with_outputs(["y"])
            .with_attr("axis", Attribute::Int(-1)),
    );
    def.add_output("y");

    let mut ws = load(def, HashMap::new(), RunConfig::default());
    let inputs: HashMap<String, HostTensor> = [
        (
            "a".to_string(),
            HostTensor::from_f32(Shape::new([2, 1]), &[10.0, 20.0]),
        ),
        (
            "b".to_string(),
            HostTensor::from_f32(Shape::new([2, 2]), &[1.0, 2.0, 3.0, 4.0]),
        ),
    ]
    .into();
    let outputs = ws.run(&inputs).unwrap();

    let y = &outputs["y"];
    assert_eq!(y.shape(), &Shape::new([2, 3]));
    assert_eq!(y.as_f32(), &[10.0, 1.0, 2.0, 20.0, 3.0, 4.0]);
}

#[test]
fn quantize_dequantize_round_trips_within_one_step() {
    let scale = 0.1f32;
    let mut def = NetDef::new("quant");
    def.add_input(TensorDecl::new("x", DType::F32, Shape::new([4])));
    def.add_operator(
        OperatorDef::new("q", "Quantize")
            .with_inputs(["x"])
            .with_outputs(["qx"])
            .with_attr("scale", Attribute::Float(scale))
            .with_attr("zero_point", Attribute::Int(128)),
    );
    def.add_operator(
        OperatorDef::new("dq", "Dequantize")
            .with_inputs(["qx"])
            .with_outputs(["y"])
            .with_attr("scale", Attribute::Float(scale))
            .with_attr("zero_point", Attribute::Int(128)),
    );
    def.add_output("y");

    let mut ws = load(def, HashMap::new(), RunConfig::default());
    let data = [-3.2f32, 0.0, 0.07, 5.9];
    let inputs: HashMap<String, HostTensor> =
        [("x".to_string(), HostTensor::from_f32(Shape::new([4]), &data))].into();
    let outputs = ws.run(&inputs).unwrap();

    for (got, original) in outputs["y"].as_f32().iter().zip(&data) {
        assert!(
            (got - original).abs() <= scale / 2.0 + f32::EPSILON,
            "round trip drifted: {original} -> {got}"
        );
    }
}

#[test]
fn cast_to_f16_and_back_quantizes_precision() {
    let mut def = NetDef::new("cast");
    def.add_input(TensorDecl::new("x", DType::F32, Shape::new([3])));
    def.add_operator(
        OperatorDef::new("down", "Cast")
            .with_inputs(["x"])
            .with_outputs(["hx"])
            .with_attr("to", Attribute::Str("f16".into())),
    );
    def.add_operator(
        OperatorDef::new("up", "Cast")
            .with_inputs(["hx"])
            .with_outputs(["y"])
            .with_attr("to", Attribute::Str("f32".into())),
    );
    def.add_output("y");

    let mut ws = load(def, HashMap::new(), RunConfig::default());
    let data = [1.0f32, -0.333, 1024.5];
    let inputs: HashMap<String, HostTensor> =
        [("x".to_string(), HostTensor::from_f32(Shape::new([3]), &data))].into();
    let outputs = ws.run(&inputs).unwrap();

    let expected: Vec<f32> = data.iter().map(|&v| f16::from_f32(v).to_f32()).collect();
    assert_eq!(outputs["y"].as_f32(), expected.as_slice());
}

#[test]
fn branchy_arithmetic_is_worker_count_invariant() {
    // (x + c) * (x - c) evaluated with both branches eligible to run
    // concurrently.
    let build = || {
        let mut def = NetDef::new("branches");
        def.add_input(TensorDecl::new("x", DType::F32, Shape::new([16])));
        def.add_operator(
            OperatorDef::new("plus", "Add")
                .with_inputs(["x", "c"])
                .with_outputs(["p"]),
        );
        def.add_operator(
            OperatorDef::new("minus", "Sub")
                .with_inputs(["x", "c"])
                .with_outputs(["m"]),
        );
        def.add_operator(
            OperatorDef::new("prod", "Mul")
                .with_inputs(["p", "m"])
                .with_outputs(["y"]),
        );
        def.add_output("y");
        def
    };
    let constants = || -> HashMap<String, HostTensor> {
        let c: Vec<f32> = (0..16).map(|i| (i as f32).sin()).collect();
        [("c".to_string(), HostTensor::from_f32(Shape::new([16]), &c))].into()
    };
    let data: Vec<f32> = (0..16).map(|i| i as f32 * 0.25).collect();
    let inputs: HashMap<String, HostTensor> =
        [("x".to_string(), HostTensor::from_f32(Shape::new([16]), &data))].into();

    let mut reference: Option<HostTensor> = None;
    for workers in [1usize, 2, 4] {
        let config = RunConfig::default().with_workers(workers);
        let mut ws = load(build(), constants(), config);
        let outputs = ws.run(&inputs).unwrap();
        match &reference {
            None => reference = Some(outputs["y"].clone()),
            Some(expected) => assert_eq!(outputs["y"].bytes(), expected.bytes()),
        }
    }
}

#[test]
fn json_defined_net_loads_and_runs() -> anyhow::Result<()> {
    // Model loaders hand the engine serialized definitions; exercise the
    // whole path from JSON to outputs.
    let json = r#"{
        "name": "from-json",
        "inputs": [{ "name": "x", "dtype": "F32", "shape": { "dims": [4] } }],
        "operators": [
            {
                "name": "act",
                "op_type": "Relu",
                "inputs": ["x"],
                "outputs": ["y"]
            }
        ],
        "outputs": ["y"]
    }"#;
    let def: NetDef = serde_json::from_str(json)?;

    let mut ws = load(def, HashMap::new(), RunConfig::default());
    let inputs: HashMap<String, HostTensor> = [(
        "x".to_string(),
        HostTensor::from_f32(Shape::new([4]), &[-1.0, 2.0, -3.0, 4.0]),
    )]
    .into();
    let outputs = ws.run(&inputs)?;
    assert_eq!(outputs["y"].as_f32(), &[0.0, 2.0, 0.0, 4.0]);
    Ok(())
}

#[test]
fn reshape_requires_its_shape_attribute() {
    let mut def = NetDef::new("bad-reshape");
    def.add_input(TensorDecl::new("x", DType::F32, Shape::new([4])));
    def.add_operator(
        OperatorDef::new("flat", "Reshape")
            .with_inputs(["x"])
            .with_outputs(["y"]),
    );
    def.add_output("y");

    netrt_kernels_cpu::register();
    let err = Workspace::load(def, HashMap::new(), RunConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        netrt::EngineError::UnresolvableShape { op, .. } if op == "flat"
    ));
}
