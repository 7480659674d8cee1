//! Signal-type propagation over the flattened plan.
//!
//! A single forward sweep in execution order: declarative sources seed the
//! map, every other block's module infers its output types from the types
//! arriving at its input ports. Undetermined ports are omitted rather than
//! guessed; findings accumulate as diagnostics and never abort.

use std::collections::HashMap;

use signalflow_model::diag::Diagnostic;
use signalflow_model::params::BlockParams;
use signalflow_model::types::{BaseType, SignalType};
use signalflow_model::BlockKind;

use crate::plan::{BlockIdx, ExecutionPlan};

#[derive(Clone, Debug, Default)]
pub struct TypeMap {
    /// `(block, output port) → type` for every port that could be
    /// determined.
    pub ports: HashMap<(BlockIdx, usize), SignalType>,
    /// Resolved output arity per block (demux follows its input shape).
    pub output_counts: Vec<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TypeMap {
    pub fn output_type(&self, block: BlockIdx, port: usize) -> Option<SignalType> {
        self.ports.get(&(block, port)).copied()
    }

    /// The type arriving at an input port, following subsystem routing.
    pub fn input_type(
        &self,
        plan: &ExecutionPlan,
        block: BlockIdx,
        port: usize,
    ) -> Option<SignalType> {
        let (source, source_port) = resolve_source(plan, block, port)?;
        self.output_type(source, source_port)
    }
}

/// The producing `(block, port)` feeding an input port, with subsystem
/// outputs redirected to their internal output-port block and routed
/// input ports redirected to the parent-side source.
pub fn resolve_source(
    plan: &ExecutionPlan,
    block: BlockIdx,
    port: usize,
) -> Option<(BlockIdx, usize)> {
    if plan.blocks[block].kind == BlockKind::InputPort {
        if let Some(&(source, source_port)) = plan.input_routing.get(&block) {
            return redirect(plan, source, source_port);
        }
        return None;
    }
    let wire = (*plan.input_wires.get(block)?.get(port)?)?;
    redirect(plan, wire.source, wire.source_port)
}

fn redirect(plan: &ExecutionPlan, source: BlockIdx, port: usize) -> Option<(BlockIdx, usize)> {
    if plan.blocks[source].kind == BlockKind::Subsystem {
        let inner = *plan.output_routing.get(&(source, port))?;
        Some((inner, 0))
    } else {
        Some((source, port))
    }
}

pub fn propagate(plan: &ExecutionPlan) -> TypeMap {
    let mut map = TypeMap {
        ports: HashMap::new(),
        output_counts: vec![0; plan.blocks.len()],
        diagnostics: Vec::new(),
    };
    let mut label_types: HashMap<(Option<BlockIdx>, String), SignalType> = HashMap::new();

    for &idx in &plan.order {
        let block = &plan.blocks[idx];
        let module = signalflow_blocks::module(block.kind);

        // gather the types arriving on each input port
        let input_types: Vec<Option<SignalType>> = (0..block.input_count)
            .map(|port| map.input_type(plan, idx, port))
            .collect();

        let inferred = match block.kind {
            BlockKind::SheetLabelSource => {
                let name = match &block.params {
                    BlockParams::SheetLabel(p) => p.signal_name.clone(),
                    _ => String::new(),
                };
                match label_types.get(&(block.scope, name)) {
                    Some(ty) => Ok(vec![*ty]),
                    None => Err(
                        "Cannot determine output type: no matching sheet label sink in scope"
                            .to_string(),
                    ),
                }
            }
            BlockKind::SheetLabelSink => {
                if let (Some(ty), BlockParams::SheetLabel(p)) =
                    (input_types.first().copied().flatten(), &block.params)
                {
                    label_types.insert((block.scope, p.signal_name.clone()), ty);
                }
                Ok(Vec::new())
            }
            _ => module.infer_output_types(&input_types, &block.params),
        };

        match inferred {
            Ok(types) => {
                map.output_counts[idx] = types.len();
                for (port, ty) in types.into_iter().enumerate() {
                    map.ports.insert((idx, port), ty);
                }
            }
            Err(message) => {
                // fall back to the declared arity so downstream state
                // allocation still has slots
                map.output_counts[idx] = module.port_counts(&block.params).outputs.unwrap_or(0);
                map.diagnostics
                    .push(Diagnostic::error(block.id.clone(), message));
            }
        }
    }

    // subsystem output slots mirror their internal output-port blocks
    for (&(subsystem, port), &inner) in &plan.output_routing {
        if let Some(ty) = map.output_type(inner, 0) {
            map.ports.insert((subsystem, port), ty);
        }
    }

    check_wires(plan, &mut map);
    map
}

/// P1: for every determined wire, source and target types must agree.
/// Enable wires additionally require a scalar bool (I3).
fn check_wires(plan: &ExecutionPlan, map: &mut TypeMap) {
    let mut diagnostics = Vec::new();
    for wire in plan.wires.iter().filter(|w| w.is_enable()) {
        let source_ty = match redirect(plan, wire.source, wire.source_port)
            .and_then(|(b, p)| map.output_type(b, p))
        {
            Some(ty) => ty,
            None => continue,
        };
        if source_ty != SignalType::Scalar(BaseType::Bool) {
            diagnostics.push(Diagnostic::error(
                plan.blocks[wire.target].id.clone(),
                format!(
                    "enable input must be a scalar bool, got {source_ty} from `{}`",
                    plan.blocks[wire.source].name
                ),
            ));
        }
    }

    // routed subsystem inputs: the value crossing the boundary must match
    // the inner port's declared type
    for (&inner, &(source, source_port)) in &plan.input_routing {
        let declared = match &plan.blocks[inner].params {
            BlockParams::InputPort(p) => p.data_type,
            _ => continue,
        };
        let actual = match redirect(plan, source, source_port).and_then(|(b, p)| map.output_type(b, p))
        {
            Some(ty) => ty,
            None => continue,
        };
        if let Some(message) = SignalType::compatibility_error(&actual, &declared) {
            diagnostics.push(Diagnostic::error(
                plan.blocks[inner].id.clone(),
                format!(
                    "subsystem input `{}`: {message}",
                    plan.blocks[inner].name
                ),
            ));
        }
    }
    map.diagnostics.append(&mut diagnostics);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use signalflow_model::Model;

    fn plan_of(json: serde_json::Value) -> ExecutionPlan {
        let model: Model = serde_json::from_value(json).unwrap();
        ExecutionPlan::build(&model).unwrap()
    }

    #[test]
    fn test_types_flow_through_chain() {
        let plan = plan_of(json!({
            "name": "chain",
            "sheets": [{
                "id": "root", "name": "Main",
                "blocks": [
                    {"id": "src", "kind": "source", "name": "Src",
                     "parameters": {"signalType": "constant", "dataType": "double[3]", "value": 1.0}},
                    {"id": "gain", "kind": "scale", "name": "Gain", "parameters": {"gain": 2.0}},
                    {"id": "mag", "kind": "mag", "name": "Mag", "parameters": {}}
                ],
                "connections": [
                    {"sourceBlock": "src", "sourcePort": 0, "targetBlock": "gain", "targetPort": 0},
                    {"sourceBlock": "gain", "sourcePort": 0, "targetBlock": "mag", "targetPort": 0}
                ]
            }]
        }));
        let map = propagate(&plan);
        let gain = plan.index_of("gain").unwrap();
        let mag = plan.index_of("mag").unwrap();
        assert_eq!(
            map.output_type(gain, 0),
            Some("double[3]".parse().unwrap())
        );
        assert_eq!(map.output_type(mag, 0), Some("double".parse().unwrap()));
        assert!(map.diagnostics.is_empty(), "{:?}", map.diagnostics);
    }

    #[test]
    fn test_sum_type_mismatch_diagnosed() {
        let plan = plan_of(json!({
            "name": "mismatch",
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
        let map = propagate(&plan);
        let sum = plan.index_of("sum").unwrap();
        assert_eq!(map.output_type(sum, 0), None);
        assert!(map
            .diagnostics
            .iter()
            .any(|d| d.message.contains("Cannot determine output type")));
    }

    #[test]
    fn test_demux_arity_follows_input() {
        let plan = plan_of(json!({
            "name": "demux",
            "sheets": [{
                "id": "root", "name": "Main",
                "blocks": [
                    {"id": "src", "kind": "source", "name": "Src",
                     "parameters": {"signalType": "constant", "dataType": "double[2][2]", "value": 1.0}},
                    {"id": "dx", "kind": "demux", "name": "Dx", "parameters": {}}
                ],
                "connections": [
                    {"sourceBlock": "src", "sourcePort": 0, "targetBlock": "dx", "targetPort": 0}
                ]
            }]
        }));
        let map = propagate(&plan);
        let dx = plan.index_of("dx").unwrap();
        assert_eq!(map.output_counts[dx], 4);
        assert_eq!(map.output_type(dx, 3), Some("double".parse().unwrap()));
    }

    #[test]
    fn test_sheet_label_types_resolve_in_scope() {
        let plan = plan_of(json!({
            "name": "labels",
            "sheets": [{
                "id": "root", "name": "Main",
                "blocks": [
                    {"id": "src", "kind": "source", "name": "Src",
                     "parameters": {"signalType": "constant", "dataType": "double[2]", "value": 1.0}},
                    {"id": "sink", "kind": "sheet_label_sink", "name": "Sink",
                     "parameters": {"signalName": "v"}},
                    {"id": "tap", "kind": "sheet_label_source", "name": "Tap",
                     "parameters": {"signalName": "v"}}
                ],
                "connections": [
                    {"sourceBlock": "src", "sourcePort": 0, "targetBlock": "sink", "targetPort": 0}
                ]
            }]
        }));
        let map = propagate(&plan);
        let tap = plan.index_of("tap").unwrap();
        assert_eq!(map.output_type(tap, 0), Some("double[2]".parse().unwrap()));
    }

    #[test]
    fn test_enable_wire_requires_scalar_bool() {
        let plan = plan_of(json!({
            "name": "en",
            "sheets": [{
                "id": "root", "name": "Main",
                "blocks": [
                    {"id": "num", "kind": "source", "name": "Num",
                     "parameters": {"signalType": "constant", "dataType": "double", "value": 1.0}},
                    {"id": "sub", "kind": "subsystem", "name": "Sub",
                     "parameters": {"inputPorts": [], "outputPorts": [], "sheets": [],
                                    "showEnableInput": true}}
                ],
                "connections": [
                    {"sourceBlock": "num", "sourcePort": 0, "targetBlock": "sub", "targetPort": -1}
                ]
            }]
        }));
        let map = propagate(&plan);
        assert!(map
            .diagnostics
            .iter()
            .any(|d| d.message.contains("enable input must be a scalar bool")));
    }
}
