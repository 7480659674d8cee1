//! Typed, validated parameter records per block kind.
//!
//! Blocks arrive with a raw JSON parameter map; [`BlockParams::build`] turns
//! that into the kind's typed record, rejecting out-of-range values with a
//! field-specific [`ParameterError`]. The closed key set per kind is the
//! wire contract; unknown keys are ignored.

use serde_json::{Map, Value};

use crate::diag::ParameterError;
use crate::expr::{self, CompareOp, Expr};
use crate::model::{BlockKind, Sheet};
use crate::types::{BaseType, SignalType};
use crate::value::SignalValue;

/// Waveform family of a `source` block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SignalShape {
    #[default]
    Constant,
    Step,
    Ramp,
    Sine,
    Square,
    Triangle,
    Chirp,
    Noise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TrigFunction {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sincos,
    Atan2,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Extrapolation {
    #[default]
    Clamp,
    Extrapolate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceParams {
    pub shape: SignalShape,
    pub data_type: SignalType,
    pub value: f64,
    pub step_time: f64,
    pub step_value: f64,
    pub slope: f64,
    pub start_time: f64,
    pub frequency: f64,
    pub amplitude: f64,
    pub phase: f64,
    pub offset: f64,
    pub f0: f64,
    pub f1: f64,
    pub duration: f64,
    pub mean: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputPortParams {
    pub port_name: String,
    pub data_type: SignalType,
    pub default_value: SignalValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputPortParams {
    pub port_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SumParams {
    /// One `+1.0` / `-1.0` per input, from the `signs` string.
    pub signs: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultiplyParams {
    pub num_inputs: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleParams {
    pub gain: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrigParams {
    pub function: TrigFunction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluateParams {
    pub expression: Expr,
    pub num_inputs: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunctionParams {
    pub numerator: Vec<f64>,
    pub denominator: Vec<f64>,
}

impl TransferFunctionParams {
    /// Denominator order; the block owns this many states per element.
    pub fn order(&self) -> usize {
        self.denominator.len() - 1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lookup1dParams {
    pub input_values: Vec<f64>,
    pub output_values: Vec<f64>,
    pub extrapolation: Extrapolation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lookup2dParams {
    pub input1_values: Vec<f64>,
    pub input2_values: Vec<f64>,
    /// `output_table[row][col]`, rows follow `input2_values`, columns follow
    /// `input1_values`.
    pub output_table: Vec<Vec<f64>>,
    pub extrapolation: Extrapolation,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MuxParams {
    pub rows: usize,
    pub cols: usize,
    pub base_type: BaseType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConditionParams {
    pub op: CompareOp,
    pub rhs: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SheetLabelParams {
    pub signal_name: String,
}

#[derive(Clone, Debug)]
pub struct SubsystemParams {
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
    pub sheets: Vec<Sheet>,
    pub show_enable_input: bool,
}

/// The kind-tagged parameter record of one block.
#[derive(Clone, Debug)]
pub enum BlockParams {
    Source(SourceParams),
    InputPort(InputPortParams),
    OutputPort(OutputPortParams),
    Sum(SumParams),
    Multiply(MultiplyParams),
    Scale(ScaleParams),
    Trig(TrigParams),
    Evaluate(EvaluateParams),
    TransferFunction(TransferFunctionParams),
    Lookup1d(Lookup1dParams),
    Lookup2d(Lookup2dParams),
    Mux(MuxParams),
    Condition(ConditionParams),
    SheetLabel(SheetLabelParams),
    Subsystem(SubsystemParams),
    /// Kinds whose behavior is fully determined by their wiring.
    None,
}

impl BlockParams {
    pub fn build(kind: BlockKind, raw: &Map<String, Value>) -> Result<BlockParams, ParameterError> {
        let p = ParamMap(raw);
        match kind {
            BlockKind::Source => Ok(BlockParams::Source(build_source(&p)?)),
            BlockKind::InputPort => Ok(BlockParams::InputPort(build_input_port(&p)?)),
            BlockKind::OutputPort => Ok(BlockParams::OutputPort(OutputPortParams {
                port_name: p.string("portName")?,
            })),
            BlockKind::Sum => Ok(BlockParams::Sum(build_sum(&p)?)),
            BlockKind::Multiply => {
                let num_inputs = p.usize_or("numInputs", 2)?;
                if !(2..=10).contains(&num_inputs) {
                    return Err(ParameterError::new(
                        "numInputs",
                        format!("must be between 2 and 10, got {num_inputs}"),
                    ));
                }
                Ok(BlockParams::Multiply(MultiplyParams { num_inputs }))
            }
            BlockKind::Scale => {
                // `factor` is the historical alias for `gain`
                let gain = match p.f64_opt("gain")? {
                    Some(g) => g,
                    None => p.f64_or("factor", 1.0)?,
                };
                Ok(BlockParams::Scale(ScaleParams { gain }))
            }
            BlockKind::Trig => {
                let function = p.parse_enum::<TrigFunction>("function")?;
                Ok(BlockParams::Trig(TrigParams { function }))
            }
            BlockKind::Evaluate => Ok(BlockParams::Evaluate(build_evaluate(&p)?)),
            BlockKind::TransferFunction => {
                Ok(BlockParams::TransferFunction(build_transfer_function(&p)?))
            }
            BlockKind::Lookup1d => Ok(BlockParams::Lookup1d(build_lookup_1d(&p)?)),
            BlockKind::Lookup2d => Ok(BlockParams::Lookup2d(build_lookup_2d(&p)?)),
            BlockKind::Mux => Ok(BlockParams::Mux(build_mux(&p)?)),
            BlockKind::Condition => {
                let text = p.string("condition")?;
                let (op, rhs) = expr::parse_predicate(&text).map_err(|e| {
                    ParameterError::new("condition", format!("invalid predicate `{text}`: {e}"))
                })?;
                Ok(BlockParams::Condition(ConditionParams { op, rhs }))
            }
            BlockKind::SheetLabelSink | BlockKind::SheetLabelSource => {
                Ok(BlockParams::SheetLabel(SheetLabelParams {
                    signal_name: p.string("signalName")?,
                }))
            }
            BlockKind::Subsystem => Ok(BlockParams::Subsystem(build_subsystem(&p)?)),
            BlockKind::Abs
            | BlockKind::Uminus
            | BlockKind::MatrixMultiply
            | BlockKind::Transpose
            | BlockKind::Demux
            | BlockKind::Mag
            | BlockKind::Dot
            | BlockKind::Cross
            | BlockKind::If
            | BlockKind::SignalDisplay
            | BlockKind::SignalLogger => Ok(BlockParams::None),
        }
    }
}

fn build_source(p: &ParamMap) -> Result<SourceParams, ParameterError> {
    let shape = match p.string_opt("signalType")? {
        Some(text) => text.parse::<SignalShape>().map_err(|_| {
            ParameterError::new("signalType", format!("unknown signal shape `{text}`"))
        })?,
        None => SignalShape::Constant,
    };
    Ok(SourceParams {
        shape,
        data_type: p.signal_type_or("dataType", SignalType::Scalar(BaseType::Double))?,
        value: p.f64_or("value", 0.0)?,
        step_time: p.f64_or("stepTime", 0.0)?,
        step_value: p.f64_or("stepValue", 1.0)?,
        slope: p.f64_or("slope", 1.0)?,
        start_time: p.f64_or("startTime", 0.0)?,
        frequency: p.f64_or("frequency", 1.0)?,
        amplitude: p.f64_or("amplitude", 1.0)?,
        phase: p.f64_or("phase", 0.0)?,
        offset: p.f64_or("offset", 0.0)?,
        f0: p.f64_or("f0", 0.0)?,
        f1: p.f64_or("f1", 1.0)?,
        duration: p.f64_or("duration", 1.0)?,
        mean: p.f64_or("mean", 0.0)?,
    })
}

fn build_input_port(p: &ParamMap) -> Result<InputPortParams, ParameterError> {
    let data_type = p.signal_type_or("dataType", SignalType::Scalar(BaseType::Double))?;
    let default_value = match p.0.get("defaultValue") {
        Some(json) => SignalValue::from_json(json, data_type.base())
            .filter(|v| v.is_valid_for(&data_type) || v.element_count() == 1)
            .ok_or_else(|| {
                ParameterError::new("defaultValue", format!("does not fit type {data_type}"))
            })
            .map(|v| match v.as_scalar() {
                // a scalar default broadcasts to the declared shape
                Some(x) if !data_type.is_scalar() => SignalValue::broadcast(x, &data_type),
                _ => v,
            })?,
        None => SignalValue::default_for(&data_type),
    };
    Ok(InputPortParams {
        port_name: p.string("portName")?,
        data_type,
        default_value,
    })
}

fn build_sum(p: &ParamMap) -> Result<SumParams, ParameterError> {
    let signs: Vec<f64> = match p.string_opt("signs")? {
        Some(signs) => signs
            .chars()
            .map(|c| match c {
                '+' => Ok(1.0),
                '-' => Ok(-1.0),
                other => Err(ParameterError::new(
                    "signs",
                    format!("invalid sign character `{other}` (expected `+` or `-`)"),
                )),
            })
            .collect::<Result<_, _>>()?,
        None => vec![1.0; p.usize_or("numInputs", 2)?],
    };
    if !(2..=10).contains(&signs.len()) {
        return Err(ParameterError::new(
            "signs",
            format!("sum takes 2 to 10 inputs, got {}", signs.len()),
        ));
    }
    Ok(SumParams { signs })
}

fn build_evaluate(p: &ParamMap) -> Result<EvaluateParams, ParameterError> {
    let text = p.string("expression")?;
    let expression = Expr::parse(&text)
        .map_err(|e| ParameterError::new("expression", format!("`{text}`: {e}")))?;
    let min_inputs = expression.max_input().map(|i| i + 1).unwrap_or(0);
    let num_inputs = p.usize_or("numInputs", min_inputs.max(1))?;
    if num_inputs < min_inputs {
        return Err(ParameterError::new(
            "numInputs",
            format!("expression references in{}, but numInputs is {num_inputs}", min_inputs - 1),
        ));
    }
    Ok(EvaluateParams {
        expression,
        num_inputs,
    })
}

fn build_transfer_function(p: &ParamMap) -> Result<TransferFunctionParams, ParameterError> {
    let numerator = p.vec_f64("numerator")?;
    let denominator = p.vec_f64("denominator")?;
    if numerator.is_empty() {
        return Err(ParameterError::new("numerator", "must not be empty"));
    }
    if denominator.is_empty() {
        return Err(ParameterError::new("denominator", "must not be empty"));
    }
    if denominator[0] == 0.0 {
        return Err(ParameterError::new(
            "denominator",
            "leading coefficient must be non-zero",
        ));
    }
    if numerator.len() > denominator.len() {
        return Err(ParameterError::new(
            "numerator",
            "order must not exceed denominator order (improper transfer function)",
        ));
    }
    Ok(TransferFunctionParams {
        numerator,
        denominator,
    })
}

fn check_monotone(field: &str, values: &[f64]) -> Result<(), ParameterError> {
    if values.len() < 2 {
        return Err(ParameterError::new(field, "needs at least 2 breakpoints"));
    }
    if values.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ParameterError::new(
            field,
            "breakpoints must be strictly increasing",
        ));
    }
    Ok(())
}

fn build_lookup_1d(p: &ParamMap) -> Result<Lookup1dParams, ParameterError> {
    let input_values = p.vec_f64("inputValues")?;
    let output_values = p.vec_f64("outputValues")?;
    check_monotone("inputValues", &input_values)?;
    if output_values.len() != input_values.len() {
        return Err(ParameterError::new(
            "outputValues",
            format!(
                "length {} does not match inputValues length {}",
                output_values.len(),
                input_values.len()
            ),
        ));
    }
    Ok(Lookup1dParams {
        input_values,
        output_values,
        extrapolation: p.parse_enum_or("extrapolation", Extrapolation::Clamp)?,
    })
}

fn build_lookup_2d(p: &ParamMap) -> Result<Lookup2dParams, ParameterError> {
    let input1_values = p.vec_f64("input1Values")?;
    let input2_values = p.vec_f64("input2Values")?;
    check_monotone("input1Values", &input1_values)?;
    check_monotone("input2Values", &input2_values)?;
    let output_table = p.table_f64("outputTable")?;
    if output_table.len() != input2_values.len() {
        return Err(ParameterError::new(
            "outputTable",
            format!(
                "has {} rows but input2Values has {} entries",
                output_table.len(),
                input2_values.len()
            ),
        ));
    }
    for (i, row) in output_table.iter().enumerate() {
        if row.len() != input1_values.len() {
            return Err(ParameterError::new(
                "outputTable",
                format!(
                    "row {i} has {} columns but input1Values has {} entries",
                    row.len(),
                    input1_values.len()
                ),
            ));
        }
    }
    Ok(Lookup2dParams {
        input1_values,
        input2_values,
        output_table,
        extrapolation: p.parse_enum_or("extrapolation", Extrapolation::Clamp)?,
    })
}

fn build_mux(p: &ParamMap) -> Result<MuxParams, ParameterError> {
    let rows = p.usize_or("rows", 1)?;
    let cols = p.usize_or("cols", 1)?;
    if rows == 0 || cols == 0 {
        return Err(ParameterError::new(
            if rows == 0 { "rows" } else { "cols" },
            "must be at least 1",
        ));
    }
    let base_type = match p.string_opt("baseType")? {
        Some(text) => text
            .parse::<BaseType>()
            .map_err(|_| ParameterError::new("baseType", format!("unknown base type `{text}`")))?,
        None => BaseType::Double,
    };
    Ok(MuxParams {
        rows,
        cols,
        base_type,
    })
}

fn build_subsystem(p: &ParamMap) -> Result<SubsystemParams, ParameterError> {
    let string_list = |field: &str| -> Result<Vec<String>, ParameterError> {
        match p.0.get(field) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ParameterError::new(field, "expected an array of strings"))
                })
                .collect(),
            Some(_) => Err(ParameterError::new(field, "expected an array of strings")),
        }
    };
    let sheets: Vec<Sheet> = match p.0.get("sheets") {
        None => Vec::new(),
        Some(json) => serde_json::from_value(json.clone())
            .map_err(|e| ParameterError::new("sheets", e.to_string()))?,
    };
    Ok(SubsystemParams {
        input_ports: string_list("inputPorts")?,
        output_ports: string_list("outputPorts")?,
        sheets,
        show_enable_input: p.bool_or("showEnableInput", false)?,
    })
}

/// Lightweight accessor over the raw JSON parameter map.
struct ParamMap<'a>(&'a Map<String, Value>);

impl ParamMap<'_> {
    fn f64_opt(&self, key: &str) -> Result<Option<f64>, ParameterError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| ParameterError::new(key, "not representable as f64")),
            Some(Value::Bool(b)) => Ok(Some(*b as u8 as f64)),
            Some(other) => Err(ParameterError::new(
                key,
                format!("expected a number, got {other}"),
            )),
        }
    }

    fn f64_or(&self, key: &str, default: f64) -> Result<f64, ParameterError> {
        Ok(self.f64_opt(key)?.unwrap_or(default))
    }

    fn usize_or(&self, key: &str, default: usize) -> Result<usize, ParameterError> {
        match self.f64_opt(key)? {
            None => Ok(default),
            Some(x) if x >= 0.0 && x.fract() == 0.0 => Ok(x as usize),
            Some(x) => Err(ParameterError::new(
                key,
                format!("expected a non-negative integer, got {x}"),
            )),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ParameterError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(ParameterError::new(
                key,
                format!("expected a bool, got {other}"),
            )),
        }
    }

    fn string_opt(&self, key: &str) -> Result<Option<String>, ParameterError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ParameterError::new(
                key,
                format!("expected a string, got {other}"),
            )),
        }
    }

    fn string(&self, key: &str) -> Result<String, ParameterError> {
        self.string_opt(key)?
            .ok_or_else(|| ParameterError::new(key, "missing required parameter"))
    }

    fn vec_f64(&self, key: &str) -> Result<Vec<f64>, ParameterError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_f64()
                        .ok_or_else(|| ParameterError::new(key, "expected an array of numbers"))
                })
                .collect(),
            Some(other) => Err(ParameterError::new(
                key,
                format!("expected an array of numbers, got {other}"),
            )),
        }
    }

    fn table_f64(&self, key: &str) -> Result<Vec<Vec<f64>>, ParameterError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(rows)) => rows
                .iter()
                .map(|row| match row {
                    Value::Array(items) => items
                        .iter()
                        .map(|v| {
                            v.as_f64().ok_or_else(|| {
                                ParameterError::new(key, "expected a 2-D array of numbers")
                            })
                        })
                        .collect(),
                    _ => Err(ParameterError::new(key, "expected a 2-D array of numbers")),
                })
                .collect(),
            Some(other) => Err(ParameterError::new(
                key,
                format!("expected a 2-D array of numbers, got {other}"),
            )),
        }
    }

    fn signal_type_or(&self, key: &str, default: SignalType) -> Result<SignalType, ParameterError> {
        match self.string_opt(key)? {
            None => Ok(default),
            Some(text) => text
                .parse::<SignalType>()
                .map_err(|e| ParameterError::new(key, e.to_string())),
        }
    }

    fn parse_enum<T: core::str::FromStr>(&self, key: &str) -> Result<T, ParameterError> {
        let text = self.string(key)?;
        text.parse::<T>()
            .map_err(|_| ParameterError::new(key, format!("unknown value `{text}`")))
    }

    fn parse_enum_or<T: core::str::FromStr>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ParameterError> {
        match self.string_opt(key)? {
            None => Ok(default),
            Some(text) => text
                .parse::<T>()
                .map_err(|_| ParameterError::new(key, format!("unknown value `{text}`"))),
        }
    }
}
