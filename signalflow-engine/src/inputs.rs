use std::collections::HashMap;

use signalflow_model::value::SignalValue;

/// Host-supplied values for root-level `input_port` blocks, looked up by
/// port name once per evaluation. A missing port falls back to the block's
/// declared default value.
pub trait ExternalInputs {
    fn get(&self, port: &str) -> Option<SignalValue>;
}

/// No external inputs.
impl ExternalInputs for () {
    fn get(&self, _port: &str) -> Option<SignalValue> {
        None
    }
}

impl ExternalInputs for HashMap<String, SignalValue> {
    fn get(&self, port: &str) -> Option<SignalValue> {
        HashMap::get(self, port).cloned()
    }
}
