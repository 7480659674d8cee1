//! End-to-end simulation scenarios driving the full pipeline: plan →
//! propagate → run.

use std::collections::HashMap;

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use serde_json::json;
use signalflow_engine::run;
use signalflow_model::value::SignalValue;
use signalflow_model::Model;

fn model(json: serde_json::Value) -> Model {
    serde_json::from_value(json).unwrap()
}

fn scalar(value: &SignalValue) -> f64 {
    match value {
        SignalValue::Scalar(x) => *x,
        other => panic!("expected a scalar, got {other:?}"),
    }
}

#[test]
fn test_simple_gain() {
    let m = model(json!({
        "name": "simple_gain",
        "globalSettings": {"simulationDuration": 1.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "in", "kind": "input_port", "name": "In",
                 "parameters": {"portName": "Input", "dataType": "double"}},
                {"id": "gain", "kind": "scale", "name": "Gain", "parameters": {"gain": 3.0}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "in", "sourcePort": 0, "targetBlock": "gain", "targetPort": 0},
                {"sourceBlock": "gain", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let mut inputs = HashMap::new();
    inputs.insert("Input".to_string(), SignalValue::Scalar(5.0));
    let results = run(&m, &inputs).unwrap();
    assert_eq!(scalar(&results.outputs["Output"]), 15.0);
    assert_relative_eq!(results.final_time, 1.0);
}

#[test]
fn test_sum_subtract() {
    let m = model(json!({
        "name": "sum_subtract",
        "globalSettings": {"simulationDuration": 0.1, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "a", "kind": "source", "name": "A",
                 "parameters": {"signalType": "constant", "value": 10.0}},
                {"id": "b", "kind": "source", "name": "B",
                 "parameters": {"signalType": "constant", "value": 3.0}},
                {"id": "c", "kind": "source", "name": "C",
                 "parameters": {"signalType": "constant", "value": 2.0}},
                {"id": "sum", "kind": "sum", "name": "Sum", "parameters": {"signs": "+--"}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "a", "sourcePort": 0, "targetBlock": "sum", "targetPort": 0},
                {"sourceBlock": "b", "sourcePort": 0, "targetBlock": "sum", "targetPort": 1},
                {"sourceBlock": "c", "sourcePort": 0, "targetBlock": "sum", "targetPort": 2},
                {"sourceBlock": "sum", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert_eq!(scalar(&results.outputs["Output"]), 5.0);
}

#[test]
fn test_vector_scale() {
    let m = model(json!({
        "name": "vector_scale",
        "globalSettings": {"simulationDuration": 0.1, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "in", "kind": "input_port", "name": "In",
                 "parameters": {"portName": "Vec", "dataType": "double[4]",
                                "defaultValue": [1.0, 2.0, 3.0, 4.0]}},
                {"id": "gain", "kind": "scale", "name": "Gain", "parameters": {"gain": 2.5}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "in", "sourcePort": 0, "targetBlock": "gain", "targetPort": 0},
                {"sourceBlock": "gain", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert_eq!(
        results.outputs["Output"],
        SignalValue::Vector(DVector::from_vec(vec![2.5, 5.0, 7.5, 10.0]))
    );
}

#[test]
fn test_matrix_multiply_2x2() {
    let m = model(json!({
        "name": "matmul",
        "globalSettings": {"simulationDuration": 0.1, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "a", "kind": "input_port", "name": "A",
                 "parameters": {"portName": "A", "dataType": "double[2][2]",
                                "defaultValue": [[1.0, 2.0], [3.0, 4.0]]}},
                {"id": "b", "kind": "input_port", "name": "B",
                 "parameters": {"portName": "B", "dataType": "double[2][2]",
                                "defaultValue": [[5.0, 6.0], [7.0, 8.0]]}},
                {"id": "mm", "kind": "matrix_multiply", "name": "MM", "parameters": {}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "a", "sourcePort": 0, "targetBlock": "mm", "targetPort": 0},
                {"sourceBlock": "b", "sourcePort": 0, "targetBlock": "mm", "targetPort": 1},
                {"sourceBlock": "mm", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert_eq!(
        results.outputs["Output"],
        SignalValue::Matrix(DMatrix::from_row_slice(2, 2, &[19.0, 22.0, 43.0, 50.0]))
    );
}

fn first_order_model(method: &str) -> Model {
    model(json!({
        "name": "first_order",
        "globalSettings": {
            "simulationDuration": 5.0,
            "simulationTimeStep": 0.01,
            "integrationMethod": method
        },
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "u", "kind": "source", "name": "U",
                 "parameters": {"signalType": "constant", "value": 1.0}},
                {"id": "tf", "kind": "transfer_function", "name": "TF",
                 "parameters": {"numerator": [1.0], "denominator": [1.0, 1.0]}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "u", "sourcePort": 0, "targetBlock": "tf", "targetPort": 0},
                {"sourceBlock": "tf", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }))
}

#[test]
fn test_first_order_step_response_rk4() {
    let results = run(&first_order_model("rk4"), &()).unwrap();
    let expected = 1.0 - (-5.0f64).exp();
    assert_relative_eq!(scalar(&results.outputs["Output"]), expected, epsilon = 1e-4);
}

#[test]
fn test_first_order_step_response_euler() {
    let results = run(&first_order_model("euler"), &()).unwrap();
    let expected = 1.0 - (-5.0f64).exp();
    // Euler at h = τ/100 is good to ~1e-2
    assert_relative_eq!(scalar(&results.outputs["Output"]), expected, epsilon = 5e-2);
}

#[test]
fn test_determinism_bit_equal_runs() {
    let m = first_order_model("rk4");
    let a = run(&m, &()).unwrap();
    let b = run(&m, &()).unwrap();
    assert_eq!(a.outputs, b.outputs);
    assert_eq!(a.time_points, b.time_points);
}

fn gain_subsystem_model() -> Model {
    let m = json!({
        "name": "sub_gain",
        "globalSettings": {"simulationDuration": 2.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "src", "kind": "source", "name": "Src",
                 "parameters": {"signalType": "constant", "value": 5.0}},
                {"id": "sub", "kind": "subsystem", "name": "Sub", "parameters": {
                    "inputPorts": ["u"],
                    "outputPorts": ["y"],
                    "showEnableInput": true,
                    "sheets": [{
                        "id": "inner", "name": "Inner",
                        "blocks": [
                            {"id": "in_u", "kind": "input_port", "name": "U",
                             "parameters": {"portName": "u"}},
                            {"id": "g", "kind": "scale", "name": "G", "parameters": {"gain": 3.0}},
                            {"id": "out_y", "kind": "output_port", "name": "Y",
                             "parameters": {"portName": "y"}}
                        ],
                        "connections": [
                            {"sourceBlock": "in_u", "sourcePort": 0, "targetBlock": "g", "targetPort": 0},
                            {"sourceBlock": "g", "sourcePort": 0, "targetBlock": "out_y", "targetPort": 0}
                        ]
                    }]
                }},
                {"id": "disp", "kind": "signal_display", "name": "Disp", "parameters": {}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "src", "sourcePort": 0, "targetBlock": "sub", "targetPort": 0},
                {"sourceBlock": "sub", "sourcePort": 0, "targetBlock": "disp", "targetPort": 0},
                {"sourceBlock": "sub", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    });
    model(m)
}

#[test]
fn test_subsystem_transparency() {
    // the consumer observes the internal output-port value at every step
    let m = gain_subsystem_model();
    let results = run(&m, &()).unwrap();
    assert_eq!(scalar(&results.outputs["Output"]), 15.0);
    let samples = &results.signal_data["disp"];
    assert_eq!(samples.len(), results.time_points.len());
    for sample in samples {
        assert_eq!(scalar(sample), 15.0);
    }
}

#[test]
fn test_disabled_subsystem_freezes_outputs() {
    // a ramp inside the subsystem; the enable goes false at t = 1
    // (step(1) -> condition "< 0.5"), freezing the output at ramp(1) = 1
    let m = model(json!({
        "name": "freeze",
        "globalSettings": {"simulationDuration": 2.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "stepper", "kind": "source", "name": "Stepper",
                 "parameters": {"signalType": "step", "stepTime": 1.0, "stepValue": 1.0}},
                {"id": "cond", "kind": "condition", "name": "Cond",
                 "parameters": {"condition": "< 0.5"}},
                {"id": "sub", "kind": "subsystem", "name": "Sub", "parameters": {
                    "inputPorts": [],
                    "outputPorts": ["y"],
                    "showEnableInput": true,
                    "sheets": [{
                        "id": "inner", "name": "Inner",
                        "blocks": [
                            {"id": "ramp", "kind": "source", "name": "Ramp",
                             "parameters": {"signalType": "ramp", "slope": 1.0, "startTime": 0.0}},
                            {"id": "out_y", "kind": "output_port", "name": "Y",
                             "parameters": {"portName": "y"}}
                        ],
                        "connections": [
                            {"sourceBlock": "ramp", "sourcePort": 0,
                             "targetBlock": "out_y", "targetPort": 0}
                        ]
                    }]
                }},
                {"id": "disp", "kind": "signal_display", "name": "Disp", "parameters": {}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "stepper", "sourcePort": 0, "targetBlock": "cond", "targetPort": 0},
                {"sourceBlock": "cond", "sourcePort": 0, "targetBlock": "sub", "targetPort": -1},
                {"sourceBlock": "sub", "sourcePort": 0, "targetBlock": "disp", "targetPort": 0},
                {"sourceBlock": "sub", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    // frozen at the value it had when the subsystem was disabled, not the
    // final ramp value of 2.0
    assert_relative_eq!(scalar(&results.outputs["Output"]), 1.0, epsilon = 1e-9);
    let samples = &results.signal_data["disp"];
    // while enabled, the consumer tracked the ramp
    assert_relative_eq!(scalar(&samples[5]), 0.5, epsilon = 1e-9);
    // bitwise-equal across consecutive disabled steps
    let last = scalar(samples.last().unwrap());
    assert_eq!(last.to_bits(), scalar(&samples[samples.len() - 2]).to_bits());
}

#[test]
fn test_sheet_label_scoping() {
    // a sink at root feeds a root source; a second source with no sink in
    // its scope reads zero
    let m = model(json!({
        "name": "labels",
        "globalSettings": {"simulationDuration": 0.2, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "src", "kind": "source", "name": "Src",
                 "parameters": {"signalType": "constant", "value": 7.0}},
                {"id": "sink", "kind": "sheet_label_sink", "name": "Sink",
                 "parameters": {"signalName": "x"}},
                {"id": "tap", "kind": "sheet_label_source", "name": "Tap",
                 "parameters": {"signalName": "x"}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "src", "sourcePort": 0, "targetBlock": "sink", "targetPort": 0},
                {"sourceBlock": "tap", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert_eq!(scalar(&results.outputs["Output"]), 7.0);
}

#[test]
fn test_algebraic_loop_breaks_with_previous_value() {
    // out = in + 0.5*out converges toward 2 when iterated once per step
    let m = model(json!({
        "name": "loopy",
        "globalSettings": {"simulationDuration": 5.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "u", "kind": "source", "name": "U",
                 "parameters": {"signalType": "constant", "value": 1.0}},
                {"id": "sum", "kind": "sum", "name": "Sum", "parameters": {"signs": "++"}},
                {"id": "half", "kind": "scale", "name": "Half", "parameters": {"gain": 0.5}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "u", "sourcePort": 0, "targetBlock": "sum", "targetPort": 0},
                {"sourceBlock": "half", "sourcePort": 0, "targetBlock": "sum", "targetPort": 1},
                {"sourceBlock": "sum", "sourcePort": 0, "targetBlock": "half", "targetPort": 0},
                {"sourceBlock": "sum", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert!(results
        .diagnostics
        .iter()
        .any(|d| d.message.contains("algebraic loop")));
    // fixed point of x = 1 + x/2
    assert_relative_eq!(scalar(&results.outputs["Output"]), 2.0, epsilon = 1e-6);
}

#[test]
fn test_unstable_system_reports_instability() {
    let m = model(json!({
        "name": "unstable",
        "globalSettings": {"simulationDuration": 20.0, "simulationTimeStep": 0.01},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "u", "kind": "source", "name": "U",
                 "parameters": {"signalType": "constant", "value": 1.0}},
                // pole at +10: states grow like e^(10t)
                {"id": "tf", "kind": "transfer_function", "name": "TF",
                 "parameters": {"numerator": [1.0], "denominator": [1.0, -10.0]}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "u", "sourcePort": 0, "targetBlock": "tf", "targetPort": 0},
                {"sourceBlock": "tf", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert!(results
        .diagnostics
        .iter()
        .any(|d| d.message.contains("numerical instability")));
    // the run stopped early but kept the partial trajectory
    assert!(results.final_time < 20.0);
    assert!(!results.time_points.is_empty());
}

#[test]
fn test_missing_external_input_uses_default() {
    let m = model(json!({
        "name": "default_input",
        "globalSettings": {"simulationDuration": 0.1, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "in", "kind": "input_port", "name": "In",
                 "parameters": {"portName": "u", "dataType": "double", "defaultValue": 42.0}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "in", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert_eq!(scalar(&results.outputs["Output"]), 42.0);
}

#[test]
fn test_bad_settings_rejected() {
    let mut m = first_order_model("euler");
    m.global_settings.simulation_time_step = 0.0;
    assert!(run(&m, &()).is_err());
}

#[test]
fn test_trig_and_evaluate_chain() {
    // evaluate(sin²+cos²) == 1 regardless of the ramp input
    let m = model(json!({
        "name": "pythagoras",
        "globalSettings": {"simulationDuration": 1.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "ramp", "kind": "source", "name": "Ramp",
                 "parameters": {"signalType": "ramp", "slope": 1.0, "startTime": 0.0}},
                {"id": "sc", "kind": "trig", "name": "SinCos",
                 "parameters": {"function": "sincos"}},
                {"id": "ev", "kind": "evaluate", "name": "Ev",
                 "parameters": {"expression": "in0 * in0 + in1 * in1", "numInputs": 2}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Output"}}
            ],
            "connections": [
                {"sourceBlock": "ramp", "sourcePort": 0, "targetBlock": "sc", "targetPort": 0},
                {"sourceBlock": "sc", "sourcePort": 0, "targetBlock": "ev", "targetPort": 0},
                {"sourceBlock": "sc", "sourcePort": 1, "targetBlock": "ev", "targetPort": 1},
                {"sourceBlock": "ev", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert_relative_eq!(scalar(&results.outputs["Output"]), 1.0, epsilon = 1e-12);
}

#[test]
fn test_mux_demux_round_trip() {
    let m = model(json!({
        "name": "mux_demux",
        "globalSettings": {"simulationDuration": 0.1, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "a", "kind": "source", "name": "A",
                 "parameters": {"signalType": "constant", "value": 1.0}},
                {"id": "b", "kind": "source", "name": "B",
                 "parameters": {"signalType": "constant", "value": 2.0}},
                {"id": "mux", "kind": "mux", "name": "Mux",
                 "parameters": {"rows": 1, "cols": 2, "baseType": "double"}},
                {"id": "dx", "kind": "demux", "name": "Dx", "parameters": {}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "Second"}}
            ],
            "connections": [
                {"sourceBlock": "a", "sourcePort": 0, "targetBlock": "mux", "targetPort": 0},
                {"sourceBlock": "b", "sourcePort": 0, "targetBlock": "mux", "targetPort": 1},
                {"sourceBlock": "mux", "sourcePort": 0, "targetBlock": "dx", "targetPort": 0},
                {"sourceBlock": "dx", "sourcePort": 1, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let results = run(&m, &()).unwrap();
    assert_eq!(scalar(&results.outputs["Second"]), 2.0);
}
