//! Multi-sheet flattening and execution-order planning.
//!
//! The planner walks the sheet tree once per model, interning every block
//! into a dense arena, building the global dependency relation (dataflow
//! wires minus enable wires, subsystem boundary routing, sheet-label
//! edges) and topologically sorting it. Plans are immutable and shared by
//! the runtime, the type propagator and the code generator.

use std::collections::HashMap;

use log::warn;

use signalflow_model::diag::{Diagnostic, ModelError};
use signalflow_model::params::BlockParams;
use signalflow_model::{Block, BlockKind, Model, Sheet, Wire};

/// Arena index of a block in the flattened model.
pub type BlockIdx = usize;

/// The scope a block lives in: the enclosing subsystem, or the root.
pub type Scope = Option<BlockIdx>;

#[derive(Clone, Debug)]
pub struct PlanBlock {
    /// Wire-format id, kept for host-facing maps and diagnostics.
    pub id: String,
    pub name: String,
    pub kind: BlockKind,
    pub params: BlockParams,
    pub sheet_id: String,
    pub scope: Scope,
    pub input_count: usize,
}

/// A flattened, index-resolved wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanWire {
    pub source: BlockIdx,
    pub source_port: usize,
    pub target: BlockIdx,
    /// `-1` marks the enable wire of a subsystem.
    pub target_port: i32,
}

impl PlanWire {
    pub fn is_enable(&self) -> bool {
        self.target_port < 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExecutionPlan {
    pub blocks: Vec<PlanBlock>,
    pub wires: Vec<PlanWire>,
    /// Global topological execution order; subsystem containers excluded.
    pub order: Vec<BlockIdx>,
    /// For each block, the in-wire feeding each input port, if any.
    pub input_wires: Vec<Vec<Option<PlanWire>>>,
    /// Internal `input_port` block → (parent-side source block, port).
    pub input_routing: HashMap<BlockIdx, (BlockIdx, usize)>,
    /// (subsystem, output port) → internal `output_port` block.
    pub output_routing: HashMap<(BlockIdx, usize), BlockIdx>,
    /// Subsystem → the wire driving its enable input, if any.
    pub enable_sources: HashMap<BlockIdx, (BlockIdx, usize)>,
    /// (scope, label name) → sink block.
    pub label_sinks: HashMap<(Scope, String), BlockIdx>,
    /// Direct members of each subsystem (one level, not transitive).
    pub scope_members: HashMap<Scope, Vec<BlockIdx>>,
    /// Dependency edges that closed a cycle and were dropped from the
    /// order. The evaluator feeds these edges previous-step values.
    pub back_edges: Vec<(BlockIdx, BlockIdx)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExecutionPlan {
    pub fn build(model: &Model) -> Result<ExecutionPlan, ModelError> {
        if model.sheets.is_empty() {
            return Err(ModelError::Empty);
        }
        let mut builder = PlanBuilder::default();
        builder.collect_sheets(&model.sheets, None)?;
        builder.finish()
    }

    pub fn block(&self, idx: BlockIdx) -> &PlanBlock {
        &self.blocks[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<BlockIdx> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// All blocks inside a subsystem, transitively.
    pub fn descendants(&self, subsystem: BlockIdx) -> Vec<BlockIdx> {
        let mut out = Vec::new();
        let mut stack = vec![subsystem];
        while let Some(scope) = stack.pop() {
            if let Some(members) = self.scope_members.get(&Some(scope)) {
                for &member in members {
                    out.push(member);
                    if self.blocks[member].kind.is_subsystem() {
                        stack.push(member);
                    }
                }
            }
        }
        out
    }

}

#[derive(Default)]
struct PlanBuilder {
    blocks: Vec<PlanBlock>,
    by_id: HashMap<String, BlockIdx>,
    raw_wires: Vec<(Wire, String)>,
    diagnostics: Vec<Diagnostic>,
}

impl PlanBuilder {
    fn collect_sheets(&mut self, sheets: &[Sheet], scope: Scope) -> Result<(), ModelError> {
        for sheet in sheets {
            let mut seen_names: HashMap<&str, &str> = HashMap::new();
            for block in &sheet.blocks {
                if let Some(first) = seen_names.insert(&block.name, &block.id) {
                    return Err(ModelError::DuplicateBlockName {
                        name: block.name.clone(),
                        first: first.to_string(),
                        second: block.id.clone(),
                    });
                }
                let idx = self.add_block(block, sheet, scope)?;
                // recurse into subsystem sheets with the new scope
                if let BlockParams::Subsystem(params) = self.blocks[idx].params.clone() {
                    self.collect_sheets(&params.sheets, Some(idx))?;
                }
            }
            for wire in &sheet.connections {
                self.raw_wires.push((wire.clone(), sheet.id.clone()));
            }
        }
        Ok(())
    }

    fn add_block(
        &mut self,
        block: &Block,
        sheet: &Sheet,
        scope: Scope,
    ) -> Result<BlockIdx, ModelError> {
        if self.by_id.contains_key(&block.id) {
            return Err(ModelError::DuplicateBlockId(block.id.clone()));
        }
        let params = BlockParams::build(block.kind, &block.parameters).map_err(|source| {
            ModelError::BadParameters {
                block: block.id.clone(),
                kind: block.kind.to_string(),
                source,
            }
        })?;
        let input_count = signalflow_blocks::module(block.kind)
            .port_counts(&params)
            .inputs;
        let idx = self.blocks.len();
        self.blocks.push(PlanBlock {
            id: block.id.clone(),
            name: block.name.clone(),
            kind: block.kind,
            params,
            sheet_id: sheet.id.clone(),
            scope,
            input_count,
        });
        self.by_id.insert(block.id.clone(), idx);
        Ok(idx)
    }

    fn finish(mut self) -> Result<ExecutionPlan, ModelError> {
        let wires = self.resolve_wires()?;
        let n = self.blocks.len();

        let mut scope_members: HashMap<Scope, Vec<BlockIdx>> = HashMap::new();
        for (idx, block) in self.blocks.iter().enumerate() {
            scope_members.entry(block.scope).or_default().push(idx);
        }

        let mut label_sinks: HashMap<(Scope, String), BlockIdx> = HashMap::new();
        for (idx, block) in self.blocks.iter().enumerate() {
            if block.kind == BlockKind::SheetLabelSink {
                if let BlockParams::SheetLabel(p) = &block.params {
                    let key = (block.scope, p.signal_name.clone());
                    if let Some(existing) = label_sinks.insert(key, idx) {
                        self.diagnostics.push(Diagnostic::warning(
                            block.id.clone(),
                            format!(
                                "sheet label `{}` has more than one sink in this scope \
                                 (also `{}`)",
                                p.signal_name, self.blocks[existing].id
                            ),
                        ));
                    }
                }
            }
        }

        let (input_routing, output_routing, enable_sources) =
            self.resolve_subsystem_routing(&wires)?;

        // per-port incoming wires, with I2 (single driver) enforcement
        let mut input_wires: Vec<Vec<Option<PlanWire>>> = self
            .blocks
            .iter()
            .map(|b| vec![None; b.input_count])
            .collect();
        for wire in &wires {
            if wire.is_enable() {
                continue;
            }
            let port = wire.target_port as usize;
            if port >= input_wires[wire.target].len() {
                // demux-style dynamic arity is handled later; fixed-arity
                // blocks reject out-of-range ports during validation
                continue;
            }
            if let Some(existing) = input_wires[wire.target][port] {
                return Err(ModelError::InputAlreadyConnected {
                    target: self.blocks[wire.target].id.clone(),
                    port: wire.target_port,
                    first: self.blocks[existing.source].id.clone(),
                    second: self.blocks[wire.source].id.clone(),
                });
            }
            input_wires[wire.target][port] = Some(*wire);
        }

        // dependency edges over execution-order nodes
        let mut edges: Vec<Vec<BlockIdx>> = vec![Vec::new(); n];
        let add_edge = |edges: &mut Vec<Vec<BlockIdx>>, from: BlockIdx, to: BlockIdx| {
            if from != to {
                edges[from].push(to);
            }
        };
        for wire in &wires {
            if wire.is_enable() {
                continue;
            }
            let source = self.blocks[wire.source].kind;
            let target = self.blocks[wire.target].kind;
            let from = if source == BlockKind::Subsystem {
                // consumers depend on the internal output-port block
                match output_routing.get(&(wire.source, wire.source_port)) {
                    Some(&inner) => inner,
                    None => continue,
                }
            } else {
                wire.source
            };
            let to = if target == BlockKind::Subsystem {
                // the internal input-port block depends on the outer source
                match self.inner_input_port(wire.target, wire.target_port as usize) {
                    Some(inner) => inner,
                    None => continue,
                }
            } else {
                wire.target
            };
            add_edge(&mut edges, from, to);
        }
        for (idx, block) in self.blocks.iter().enumerate() {
            if block.kind == BlockKind::SheetLabelSource {
                if let BlockParams::SheetLabel(p) = &block.params {
                    if let Some(&sink) = label_sinks.get(&(block.scope, p.signal_name.clone())) {
                        add_edge(&mut edges, sink, idx);
                    } else {
                        self.diagnostics.push(Diagnostic::warning(
                            block.id.clone(),
                            format!("sheet label `{}` has no sink in this scope", p.signal_name),
                        ));
                    }
                }
            }
        }

        let (order, back_edges) = self.topo_sort(&edges);

        Ok(ExecutionPlan {
            blocks: self.blocks,
            wires,
            order,
            input_wires,
            input_routing,
            output_routing,
            enable_sources,
            label_sinks,
            scope_members,
            back_edges,
            diagnostics: self.diagnostics,
        })
    }

    fn resolve_wires(&mut self) -> Result<Vec<PlanWire>, ModelError> {
        let mut out = Vec::with_capacity(self.raw_wires.len());
        for (wire, _sheet) in &self.raw_wires {
            let source = *self
                .by_id
                .get(&wire.source_block)
                .ok_or_else(|| ModelError::UnknownBlock(wire.source_block.clone()))?;
            let target = *self
                .by_id
                .get(&wire.target_block)
                .ok_or_else(|| ModelError::UnknownBlock(wire.target_block.clone()))?;
            if source == target {
                return Err(ModelError::SelfConnection(wire.source_block.clone()));
            }
            if wire.target_port < -1 {
                return Err(ModelError::PortOutOfRange {
                    from_block: wire.source_block.clone(),
                    target: wire.target_block.clone(),
                    port: wire.target_port,
                });
            }
            if wire.target_port == signalflow_model::ENABLE_PORT
                && self.blocks[target].kind != BlockKind::Subsystem
            {
                return Err(ModelError::PortOutOfRange {
                    from_block: wire.source_block.clone(),
                    target: wire.target_block.clone(),
                    port: wire.target_port,
                });
            }
            // fixed-arity targets reject out-of-range data ports up front
            let target_block = &self.blocks[target];
            if wire.target_port >= 0
                && target_block.kind != BlockKind::Demux
                && wire.target_port as usize >= target_block.input_count
            {
                return Err(ModelError::PortOutOfRange {
                    from_block: wire.source_block.clone(),
                    target: wire.target_block.clone(),
                    port: wire.target_port,
                });
            }
            out.push(PlanWire {
                source,
                source_port: wire.source_port,
                target,
                target_port: wire.target_port,
            });
        }
        Ok(out)
    }

    /// Finds the internal `input_port` block matching a subsystem input by
    /// port index.
    fn inner_input_port(&self, subsystem: BlockIdx, port: usize) -> Option<BlockIdx> {
        let names = match &self.blocks[subsystem].params {
            BlockParams::Subsystem(p) => &p.input_ports,
            _ => return None,
        };
        let wanted = names.get(port)?;
        self.blocks.iter().position(|b| {
            b.scope == Some(subsystem)
                && b.kind == BlockKind::InputPort
                && matches!(&b.params, BlockParams::InputPort(p) if &p.port_name == wanted)
        })
    }

    fn inner_output_port(&self, subsystem: BlockIdx, port: usize) -> Option<BlockIdx> {
        let names = match &self.blocks[subsystem].params {
            BlockParams::Subsystem(p) => &p.output_ports,
            _ => return None,
        };
        let wanted = names.get(port)?;
        self.blocks.iter().position(|b| {
            b.scope == Some(subsystem)
                && b.kind == BlockKind::OutputPort
                && matches!(&b.params, BlockParams::OutputPort(p) if &p.port_name == wanted)
        })
    }

    #[allow(clippy::type_complexity)]
    fn resolve_subsystem_routing(
        &mut self,
        wires: &[PlanWire],
    ) -> Result<
        (
            HashMap<BlockIdx, (BlockIdx, usize)>,
            HashMap<(BlockIdx, usize), BlockIdx>,
            HashMap<BlockIdx, (BlockIdx, usize)>,
        ),
        ModelError,
    > {
        let mut input_routing = HashMap::new();
        let mut output_routing = HashMap::new();
        let mut enable_sources = HashMap::new();

        for (idx, block) in self.blocks.iter().enumerate() {
            let params = match &block.params {
                BlockParams::Subsystem(p) => p,
                _ => continue,
            };
            for port in 0..params.output_ports.len() {
                match self.inner_output_port(idx, port) {
                    Some(inner) => {
                        output_routing.insert((idx, port), inner);
                    }
                    None => self.diagnostics.push(Diagnostic::warning(
                        block.id.clone(),
                        format!(
                            "subsystem output `{}` has no matching output_port block",
                            params.output_ports[port]
                        ),
                    )),
                }
            }
        }

        for wire in wires {
            let target_kind = self.blocks[wire.target].kind;
            if wire.is_enable() {
                if target_kind == BlockKind::Subsystem {
                    enable_sources.insert(wire.target, (wire.source, wire.source_port));
                }
                continue;
            }
            if target_kind == BlockKind::Subsystem {
                if let Some(inner) = self.inner_input_port(wire.target, wire.target_port as usize)
                {
                    input_routing.insert(inner, (wire.source, wire.source_port));
                } else {
                    let names = match &self.blocks[wire.target].params {
                        BlockParams::Subsystem(p) => p.input_ports.clone(),
                        _ => Vec::new(),
                    };
                    self.diagnostics.push(Diagnostic::warning(
                        self.blocks[wire.target].id.clone(),
                        format!(
                            "subsystem input port {} ({}) has no matching input_port block",
                            wire.target_port,
                            names
                                .get(wire.target_port as usize)
                                .map(String::as_str)
                                .unwrap_or("?")
                        ),
                    ));
                }
            }
        }

        Ok((input_routing, output_routing, enable_sources))
    }

    /// DFS topological sort over the dependency edges. Back-edges are
    /// dropped with a warning; the resulting order is still usable, the
    /// runtime breaks the loop with previous-step values.
    fn topo_sort(&mut self, edges: &[Vec<BlockIdx>]) -> (Vec<BlockIdx>, Vec<(BlockIdx, BlockIdx)>) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }
        let n = self.blocks.len();
        let mut marks = vec![Mark::White; n];
        let mut order = Vec::with_capacity(n);
        let mut back_edges = Vec::new();

        // iterative DFS, post-order reversed
        for root in 0..n {
            if marks[root] != Mark::White {
                continue;
            }
            let mut stack: Vec<(BlockIdx, usize)> = vec![(root, 0)];
            marks[root] = Mark::Grey;
            while let Some(&(node, next)) = stack.last() {
                if next < edges[node].len() {
                    stack.last_mut().unwrap().1 += 1;
                    let child = edges[node][next];
                    match marks[child] {
                        Mark::White => {
                            marks[child] = Mark::Grey;
                            stack.push((child, 0));
                        }
                        Mark::Grey => {
                            warn!(
                                "execution order: cycle through `{}` -> `{}`, breaking edge",
                                self.blocks[node].id, self.blocks[child].id
                            );
                            self.diagnostics.push(Diagnostic::warning(
                                self.blocks[child].id.clone(),
                                format!(
                                    "algebraic loop detected through `{}`",
                                    self.blocks[node].name
                                ),
                            ));
                            back_edges.push((node, child));
                        }
                        Mark::Black => {}
                    }
                } else {
                    marks[node] = Mark::Black;
                    order.push(node);
                    stack.pop();
                }
            }
        }
        order.reverse();
        let order = order
            .into_iter()
            .filter(|&idx| !self.blocks[idx].kind.is_subsystem())
            .collect();
        (order, back_edges)
    }
}
