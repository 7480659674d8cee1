use serde::{Deserialize, Serialize};

/// Every block kind the catalog knows about.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockKind {
    Source,
    InputPort,
    OutputPort,
    Sum,
    Multiply,
    Scale,
    Abs,
    Uminus,
    Trig,
    Evaluate,
    TransferFunction,
    // the case conversions turn `Lookup1d` into `lookup1d`; the wire
    // format spells these with an underscore
    #[serde(rename = "lookup_1d")]
    #[strum(serialize = "lookup_1d")]
    Lookup1d,
    #[serde(rename = "lookup_2d")]
    #[strum(serialize = "lookup_2d")]
    Lookup2d,
    MatrixMultiply,
    Transpose,
    Mux,
    Demux,
    Mag,
    Dot,
    Cross,
    If,
    Condition,
    SignalDisplay,
    SignalLogger,
    SheetLabelSink,
    SheetLabelSource,
    Subsystem,
}

impl BlockKind {
    /// Container blocks never appear in the execution order.
    pub fn is_subsystem(&self) -> bool {
        matches!(self, BlockKind::Subsystem)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One node of a sheet. `parameters` stays as raw JSON until the typed
/// per-kind parameter record is built (see `params`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// A directed connection `(source block, source port) -> (target block,
/// target port)`. `target_port == -1` is the subsystem enable input and is
/// excluded from dataflow dependencies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wire {
    pub source_block: String,
    pub source_port: usize,
    pub target_block: String,
    pub target_port: i32,
}

pub const ENABLE_PORT: i32 = -1;

impl Wire {
    pub fn is_enable(&self) -> bool {
        self.target_port == ENABLE_PORT
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetExtents {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub connections: Vec<Wire>,
    #[serde(default)]
    pub extents: SheetExtents,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IntegrationMethod {
    #[default]
    Euler,
    Rk4,
}

/// What the runtime does when the planner finds an algebraic cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlgebraicLoopPolicy {
    /// Break the cycle by feeding one edge its previous-step value and warn.
    #[default]
    BreakWithPrevious,
    /// Report a diagnostic and leave the looped signals at their defaults.
    DiagnoseOnly,
}

fn default_duration() -> f64 {
    10.0
}

fn default_timestep() -> f64 {
    0.01
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default = "default_duration")]
    pub simulation_duration: f64,
    #[serde(default = "default_timestep")]
    pub simulation_time_step: f64,
    #[serde(default)]
    pub integration_method: IntegrationMethod,
    #[serde(default)]
    pub algebraic_loop_policy: AlgebraicLoopPolicy,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            simulation_duration: default_duration(),
            simulation_time_step: default_timestep(),
            integration_method: IntegrationMethod::default(),
            algebraic_loop_policy: AlgebraicLoopPolicy::default(),
        }
    }
}

/// The full model handed to the core: an ordered list of sheets (first is
/// the root) plus global simulation settings. Immutable for the duration of
/// a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub name: String,
    pub sheets: Vec<Sheet>,
    #[serde(default)]
    pub global_settings: GlobalSettings,
}

impl Model {
    pub fn root_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_block_kind_string_forms() {
        assert_eq!(
            "transfer_function".parse::<BlockKind>().unwrap(),
            BlockKind::TransferFunction
        );
        assert_eq!(BlockKind::SheetLabelSink.to_string(), "sheet_label_sink");
        assert_eq!("lookup_1d".parse::<BlockKind>().unwrap(), BlockKind::Lookup1d);
    }

    #[test]
    fn test_model_deserializes_with_defaults() {
        let model: Model = serde_json::from_str(
            r#"{
                "name": "demo",
                "sheets": [{
                    "id": "s1",
                    "name": "Main",
                    "blocks": [{
                        "id": "b1",
                        "kind": "source",
                        "name": "Const",
                        "parameters": {"signalType": "constant", "dataType": "double", "value": 5}
                    }],
                    "connections": []
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(model.global_settings.simulation_duration, 10.0);
        assert_eq!(model.global_settings.simulation_time_step, 0.01);
        assert_eq!(model.global_settings.integration_method, IntegrationMethod::Euler);
        assert_eq!(model.sheets[0].blocks[0].kind, BlockKind::Source);
    }

    #[test]
    fn test_enable_wire() {
        let wire: Wire = serde_json::from_str(
            r#"{"sourceBlock": "a", "sourcePort": 0, "targetBlock": "b", "targetPort": -1}"#,
        )
        .unwrap();
        assert!(wire.is_enable());
    }

    #[test]
    fn test_integration_method_parsing() {
        let settings: GlobalSettings =
            serde_json::from_str(r#"{"integrationMethod": "rk4"}"#).unwrap();
        assert_eq!(settings.integration_method, IntegrationMethod::Rk4);
    }
}
