//! Structural checks over the generated C: the statement set, struct
//! layout and harness must reflect the plan exactly. Compile-and-diff
//! against the interpreter is the job of the external cross-validation
//! harness.

use serde_json::json;
use signalflow_codegen::generate;
use signalflow_model::Model;

fn model(json: serde_json::Value) -> Model {
    serde_json::from_value(json).unwrap()
}

fn gain_model() -> Model {
    model(json!({
        "name": "demo model",
        "globalSettings": {"simulationDuration": 1.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "in", "kind": "input_port", "name": "In",
                 "parameters": {"portName": "u", "dataType": "double", "defaultValue": 5.0}},
                {"id": "gain", "kind": "scale", "name": "Gain", "parameters": {"gain": 3.0}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "y"}}
            ],
            "connections": [
                {"sourceBlock": "in", "sourcePort": 0, "targetBlock": "gain", "targetPort": 0},
                {"sourceBlock": "gain", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }))
}

#[test]
fn test_header_shape() {
    let code = generate(&gain_model(), false).unwrap();
    assert_eq!(code.header_name, "demo_model.h");
    assert!(code.header.contains("#ifndef DEMO_MODEL_H"));
    assert!(code.header.contains("typedef struct"));
    assert!(code.header.contains("double u;"));
    assert!(code.header.contains("double y;"));
    assert!(code.header.contains("void model_init(model_t *model);"));
    assert!(code.header.contains("void model_evaluate_algebraic(model_t *model);"));
    assert!(code
        .header
        .contains("void model_derivatives(const model_t *model, model_states_t *derivs);"));
    assert!(code.header.contains("void model_step(model_t *model);"));
}

#[test]
fn test_source_statements_follow_plan_order() {
    let code = generate(&gain_model(), false).unwrap();
    let gain_stmt = code
        .source
        .find("model->signals.Gain_out = 3.0 * model->signals.In_out;")
        .expect("gain statement missing");
    let input_stmt = code
        .source
        .find("model->signals.In_out = model->inputs.u;")
        .expect("input routing statement missing");
    let output_stmt = code
        .source
        .find("model->outputs.y = model->signals.Out_out;")
        .expect("output publish statement missing");
    assert!(input_stmt < gain_stmt);
    assert!(gain_stmt < output_stmt);
    // default value survives into init
    assert!(code.source.contains("model->inputs.u = 5.0;"));
}

#[test]
fn test_main_harness_prints_outputs() {
    let code = generate(&gain_model(), true).unwrap();
    let main = code.main.unwrap();
    assert!(main.contains("model_init(&model);"));
    assert!(main.contains("model_step(&model);"));
    assert!(main.contains("printf(\" y=%.17g\""));
}

fn transfer_function_model(method: &str) -> Model {
    model(json!({
        "name": "tf_model",
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
                {"id": "tf", "kind": "transfer_function", "name": "Plant",
                 "parameters": {"numerator": [1.0], "denominator": [2.0, 1.0]}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "y"}}
            ],
            "connections": [
                {"sourceBlock": "u", "sourcePort": 0, "targetBlock": "tf", "targetPort": 0},
                {"sourceBlock": "tf", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }))
}

#[test]
fn test_stateful_block_layout_and_euler_step() {
    let code = generate(&transfer_function_model("euler"), false).unwrap();
    assert!(code.header.contains("double Plant_states[1][1];"));
    assert!(code.source.contains("model_derivatives(model, &k1);"));
    assert!(code
        .source
        .contains("model->states.Plant_states[e][j] += model->dt * k1.Plant_states[e][j];"));
    // first-order realization: y = 0.5 * x, dx = u - 0.5 * x
    assert!(code
        .source
        .contains("model->signals.Plant_out = 0.5 * model->states.Plant_states[0][0];"));
    assert!(code.source.contains(
        "derivs->Plant_states[0][0] = model->signals.U_out - (0.5 * model->states.Plant_states[0][0]);"
    ));
}

#[test]
fn test_rk4_step_has_four_stages() {
    let code = generate(&transfer_function_model("rk4"), false).unwrap();
    assert!(code.source.contains("model_states_t x0 = model->states;"));
    for k in ["k1", "k2", "k3", "k4"] {
        assert!(
            code.source.contains(&format!("model_derivatives(model, &{k});")),
            "missing stage {k}"
        );
    }
    // mid-stage re-evaluation of the algebraic layer
    assert_eq!(
        code.source.matches("model_evaluate_algebraic(model);").count(),
        4,
        "three stage sweeps plus the step entry sweep... found a different count"
    );
}

#[test]
fn test_enable_gating_and_freeze() {
    let m = model(json!({
        "name": "gated",
        "globalSettings": {"simulationDuration": 1.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "en", "kind": "source", "name": "En",
                 "parameters": {"signalType": "constant", "dataType": "bool", "value": 1}},
                {"id": "sub", "kind": "subsystem", "name": "Box", "parameters": {
                    "inputPorts": [],
                    "outputPorts": ["y"],
                    "showEnableInput": true,
                    "sheets": [{
                        "id": "inner", "name": "Inner",
                        "blocks": [
                            {"id": "ramp", "kind": "source", "name": "Ramp",
                             "parameters": {"signalType": "ramp", "slope": 1.0}},
                            {"id": "out_y", "kind": "output_port", "name": "Y",
                             "parameters": {"portName": "y"}}
                        ],
                        "connections": [
                            {"sourceBlock": "ramp", "sourcePort": 0,
                             "targetBlock": "out_y", "targetPort": 0}
                        ]
                    }]
                }},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "y_out"}}
            ],
            "connections": [
                {"sourceBlock": "en", "sourcePort": 0, "targetBlock": "sub", "targetPort": -1},
                {"sourceBlock": "sub", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let code = generate(&m, false).unwrap();
    assert!(code.header.contains("bool Box_enabled;"));
    // inner blocks are gated on the enable flag; signals freeze by simply
    // not being reassigned
    assert!(code.source.contains("if (model->enable_states.Box_enabled) {"));
    assert!(code
        .source
        .contains("model->enable_states.Box_enabled = model->signals.En_out;"));
    assert!(code.source.contains("model->enable_states.Box_enabled = true;"));
}

#[test]
fn test_lookup_tables_are_static_data() {
    let m = model(json!({
        "name": "lut",
        "globalSettings": {"simulationDuration": 1.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "u", "kind": "source", "name": "U",
                 "parameters": {"signalType": "ramp", "slope": 1.0}},
                {"id": "lut", "kind": "lookup_1d", "name": "Table",
                 "parameters": {"inputValues": [0.0, 1.0, 2.0],
                                "outputValues": [0.0, 10.0, 40.0],
                                "extrapolation": "clamp"}},
                {"id": "out", "kind": "output_port", "name": "Out",
                 "parameters": {"portName": "y"}}
            ],
            "connections": [
                {"sourceBlock": "u", "sourcePort": 0, "targetBlock": "lut", "targetPort": 0},
                {"sourceBlock": "lut", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let code = generate(&m, false).unwrap();
    assert!(code
        .source
        .contains("static const double Table_xs[3] = {0.0, 1.0, 2.0};"));
    assert!(code
        .source
        .contains("static const double Table_ys[3] = {0.0, 10.0, 40.0};"));
    assert!(code.source.contains("static double sf_lookup_1d"));
    assert!(code
        .source
        .contains("model->signals.Table_out = sf_lookup_1d(Table_xs, Table_ys, 3, 0, model->signals.U_out);"));
}

#[test]
fn test_type_errors_block_generation() {
    // sum over mismatched shapes cannot be emitted
    let m = model(json!({
        "name": "broken",
        "globalSettings": {"simulationDuration": 1.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "a", "kind": "source", "name": "A",
                 "parameters": {"signalType": "constant", "dataType": "double", "value": 1.0}},
                {"id": "b", "kind": "source", "name": "B",
                 "parameters": {"signalType": "constant", "dataType": "double[2]", "value": 1.0}},
                {"id": "sum", "kind": "sum", "name": "Sum", "parameters": {"signs": "++"}}
            ],
            "connections": [
                {"sourceBlock": "a", "sourcePort": 0, "targetBlock": "sum", "targetPort": 0},
                {"sourceBlock": "b", "sourcePort": 0, "targetBlock": "sum", "targetPort": 1}
            ]
        }]
    }));
    assert!(generate(&m, false).is_err());
}

#[test]
fn test_vector_signals_emit_arrays() {
    let m = model(json!({
        "name": "vec",
        "globalSettings": {"simulationDuration": 1.0, "simulationTimeStep": 0.1},
        "sheets": [{
            "id": "root", "name": "Main",
            "blocks": [
                {"id": "in", "kind": "input_port", "name": "In",
                 "parameters": {"portName": "v", "dataType": "double[3]",
                                "defaultValue": [1.0, 2.0, 3.0]}},
                {"id": "gain", "kind": "scale", "name": "Gain", "parameters": {"gain": 2.0}},
                {"id": "out", "kind": "output_port", "name": "Out", "parameters": {"portName": "y"}}
            ],
            "connections": [
                {"sourceBlock": "in", "sourcePort": 0, "targetBlock": "gain", "targetPort": 0},
                {"sourceBlock": "gain", "sourcePort": 0, "targetBlock": "out", "targetPort": 0}
            ]
        }]
    }));
    let code = generate(&m, true).unwrap();
    assert!(code.header.contains("double v[3];"));
    assert!(code.header.contains("double Gain_out[3];"));
    assert!(code
        .source
        .contains("model->signals.Gain_out[2] = 2.0 * model->signals.In_out[2];"));
    let main = code.main.unwrap();
    assert!(main.contains("printf(\" y=[\");"));
}
