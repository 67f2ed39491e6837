//! The configuration constructor: raw mapping to normalized model.
//!
//! [`build_config`] walks the raw [`serde_json::Value`] with full key-path
//! tracking and aggregates every structural problem it finds before
//! failing, so one pass reports everything. Accepted shorthand is
//! normalized here: ports given as a `[controller, port]` pair or as a
//! `{controller, port}` object, legacy `hold_offset` sticky fields, the
//! legacy `digital_waveform` pulse key, flat integration-weight sample
//! lists, and explicitly empty loopback lists.

use indexmap::IndexMap;
use serde_json::Value;

use carillon_core::chunk::run_lengths;
use carillon_core::config::{
    AnalogInput, AnalogOutput, Config, Controller, DigitalOutput, DigitalSample, DigitalWaveform,
    Element, ElementInput, IntegrationWeights, Loopback, Mixer, MixerCorrection, Octave,
    OctaveRfOutput, OperationKind, PortRef, Pulse, Sticky, Waveform, WeightEntry,
};

use super::{ConfigStructuralError, Problem};

/// Length in nanoseconds of one flat integration-weight sample.
const WEIGHT_SAMPLE_NS: u32 = 4;

/// Build the normalized configuration model from a raw mapping.
///
/// Fails with every structural problem found, each carrying the key path
/// it refers to.
pub fn build_config(raw: &Value) -> Result<Config, ConfigStructuralError> {
    let mut builder = Builder {
        problems: Vec::new(),
    };
    let mut config = Config::default();
    if let Some(map) = builder.object(raw, "configuration") {
        for (key, value) in map {
            match key.as_str() {
                "controllers" => config.controllers = builder.controllers(value),
                "elements" => config.elements = builder.elements(value),
                "pulses" => config.pulses = builder.pulses(value),
                "waveforms" => config.waveforms = builder.waveforms(value),
                "integration_weights" => {
                    config.integration_weights = builder.integration_weights(value);
                }
                "mixers" => config.mixers = builder.mixers(value),
                "digital_waveforms" => config.digital_waveforms = builder.digital_waveforms(value),
                "octaves" => config.octaves = builder.octaves(value),
                _ => builder.problem(key, "unknown top-level key"),
            }
        }
    }
    if builder.problems.is_empty() {
        Ok(config)
    } else {
        Err(ConfigStructuralError::new(builder.problems))
    }
}

struct Builder {
    problems: Vec<Problem>,
}

impl Builder {
    fn problem(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.problems.push(Problem::new(path, message));
    }

    // -----------------------------------------------------------------
    // Shape helpers
    // -----------------------------------------------------------------

    fn object<'a>(
        &mut self,
        value: &'a Value,
        path: &str,
    ) -> Option<&'a serde_json::Map<String, Value>> {
        match value.as_object() {
            Some(map) => Some(map),
            None => {
                self.problem(path, "expected a mapping");
                None
            }
        }
    }

    fn number(&mut self, value: &Value, path: &str) -> Option<f64> {
        match value.as_f64() {
            Some(number) => Some(number),
            None => {
                self.problem(path, "expected a number");
                None
            }
        }
    }

    fn unsigned(&mut self, value: &Value, path: &str) -> Option<u32> {
        match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(number) => Some(number),
            None => {
                self.problem(path, "expected an unsigned integer");
                None
            }
        }
    }

    fn boolean(&mut self, value: &Value, path: &str) -> Option<bool> {
        match value.as_bool() {
            Some(flag) => Some(flag),
            None => {
                self.problem(path, "expected a boolean");
                None
            }
        }
    }

    fn string(&mut self, value: &Value, path: &str) -> Option<String> {
        match value.as_str() {
            Some(text) => Some(text.to_string()),
            None => {
                self.problem(path, "expected a string");
                None
            }
        }
    }

    fn port_number(&mut self, key: &str, path: &str) -> Option<u32> {
        match key.parse::<u32>() {
            Ok(port) => Some(port),
            Err(_) => {
                self.problem(path, "port keys must be unsigned integers");
                None
            }
        }
    }

    /// A controller port reference: either a `[controller, port]` pair or a
    /// `{"controller": …, "port": …}` object. Both normalize identically.
    fn port_ref(&mut self, value: &Value, path: &str) -> Option<PortRef> {
        match value {
            Value::Array(entries) => {
                if entries.len() != 2 {
                    self.problem(path, "expected a [controller, port] pair");
                    return None;
                }
                let controller = self.string(&entries[0], path)?;
                let port = self.unsigned(&entries[1], path)?;
                Some(PortRef { controller, port })
            }
            Value::Object(map) => {
                let mut controller = None;
                let mut port = None;
                for (key, entry) in map {
                    match key.as_str() {
                        "controller" => {
                            controller = self.string(entry, &format!("{path}.controller"));
                        }
                        "port" => port = self.unsigned(entry, &format!("{path}.port")),
                        _ => self.problem(format!("{path}.{key}"), "unknown key"),
                    }
                }
                match (controller, port) {
                    (Some(controller), Some(port)) => Some(PortRef { controller, port }),
                    _ => {
                        self.problem(path, "port reference needs controller and port");
                        None
                    }
                }
            }
            _ => {
                self.problem(path, "expected a [controller, port] pair");
                None
            }
        }
    }

    // -----------------------------------------------------------------
    // Controllers
    // -----------------------------------------------------------------

    fn controllers(&mut self, value: &Value) -> IndexMap<String, Controller> {
        let mut controllers = IndexMap::new();
        let Some(map) = self.object(value, "controllers") else {
            return controllers;
        };
        for (name, entry) in map {
            let path = format!("controllers.{name}");
            if let Some(controller) = self.controller(entry, &path) {
                controllers.insert(name.clone(), controller);
            }
        }
        controllers
    }

    fn controller(&mut self, value: &Value, path: &str) -> Option<Controller> {
        let map = self.object(value, path)?;
        let mut controller = Controller::default();
        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "analog_outputs" => {
                    controller.analog_outputs =
                        self.analog_outputs(entry, &key_path);
                }
                "analog_inputs" => {
                    controller.analog_inputs = self.analog_inputs(entry, &key_path);
                }
                "digital_outputs" => {
                    controller.digital_outputs = self.digital_outputs(entry, &key_path);
                }
                _ => self.problem(key_path, "unknown key"),
            }
        }
        Some(controller)
    }

    fn analog_outputs(&mut self, value: &Value, path: &str) -> IndexMap<u32, AnalogOutput> {
        let mut ports = IndexMap::new();
        let Some(map) = self.object(value, path) else {
            return ports;
        };
        for (key, entry) in map {
            let port_path = format!("{path}.{key}");
            let Some(port) = self.port_number(key, &port_path) else {
                continue;
            };
            if ports.contains_key(&port) {
                self.problem(port_path, "duplicate port after normalization");
                continue;
            }
            let Some(entry_map) = self.object(entry, &port_path) else {
                continue;
            };
            let mut output = AnalogOutput { offset: 0.0 };
            for (field, field_value) in entry_map {
                let field_path = format!("{port_path}.{field}");
                match field.as_str() {
                    "offset" => {
                        if let Some(offset) = self.number(field_value, &field_path) {
                            output.offset = offset;
                        }
                    }
                    _ => self.problem(field_path, "unknown key"),
                }
            }
            ports.insert(port, output);
        }
        ports
    }

    fn analog_inputs(&mut self, value: &Value, path: &str) -> IndexMap<u32, AnalogInput> {
        let mut ports = IndexMap::new();
        let Some(map) = self.object(value, path) else {
            return ports;
        };
        for (key, entry) in map {
            let port_path = format!("{path}.{key}");
            let Some(port) = self.port_number(key, &port_path) else {
                continue;
            };
            if ports.contains_key(&port) {
                self.problem(port_path, "duplicate port after normalization");
                continue;
            }
            let Some(entry_map) = self.object(entry, &port_path) else {
                continue;
            };
            let mut input = AnalogInput {
                offset: 0.0,
                gain_db: 0,
            };
            for (field, field_value) in entry_map {
                let field_path = format!("{port_path}.{field}");
                match field.as_str() {
                    "offset" => {
                        if let Some(offset) = self.number(field_value, &field_path) {
                            input.offset = offset;
                        }
                    }
                    "gain_db" => match field_value.as_i64().and_then(|n| i32::try_from(n).ok()) {
                        Some(gain) => input.gain_db = gain,
                        None => self.problem(field_path, "expected an integer"),
                    },
                    _ => self.problem(field_path, "unknown key"),
                }
            }
            ports.insert(port, input);
        }
        ports
    }

    fn digital_outputs(&mut self, value: &Value, path: &str) -> IndexMap<u32, DigitalOutput> {
        let mut ports = IndexMap::new();
        let Some(map) = self.object(value, path) else {
            return ports;
        };
        for (key, entry) in map {
            let port_path = format!("{path}.{key}");
            let Some(port) = self.port_number(key, &port_path) else {
                continue;
            };
            if ports.contains_key(&port) {
                self.problem(port_path, "duplicate port after normalization");
                continue;
            }
            let Some(entry_map) = self.object(entry, &port_path) else {
                continue;
            };
            let mut output = DigitalOutput { inverted: false };
            for (field, field_value) in entry_map {
                let field_path = format!("{port_path}.{field}");
                match field.as_str() {
                    "inverted" => {
                        if let Some(inverted) = self.boolean(field_value, &field_path) {
                            output.inverted = inverted;
                        }
                    }
                    _ => self.problem(field_path, "unknown key"),
                }
            }
            ports.insert(port, output);
        }
        ports
    }

    // -----------------------------------------------------------------
    // Elements
    // -----------------------------------------------------------------

    fn elements(&mut self, value: &Value) -> IndexMap<String, Element> {
        let mut elements = IndexMap::new();
        let Some(map) = self.object(value, "elements") else {
            return elements;
        };
        for (name, entry) in map {
            let path = format!("elements.{name}");
            if let Some(element) = self.element(entry, &path) {
                elements.insert(name.clone(), element);
            }
        }
        elements
    }

    fn element(&mut self, value: &Value, path: &str) -> Option<Element> {
        let map = self.object(value, path)?;

        let mut single = None;
        let mut mixed = None;
        let mut intermediate_frequency = None;
        let mut operations = IndexMap::new();
        let mut sticky = None;
        let mut hold_offset = None;
        let mut time_of_flight = None;
        let mut smearing = None;
        let mut outputs = IndexMap::new();

        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "singleInput" => single = self.single_input(entry, &key_path),
                "mixInputs" => mixed = self.mix_inputs(entry, &key_path),
                "intermediate_frequency" => {
                    // Integer or float, sign stored exactly as supplied.
                    intermediate_frequency = self.number(entry, &key_path);
                }
                "operations" => operations = self.string_map(entry, &key_path),
                "sticky" => sticky = self.sticky(entry, &key_path),
                "hold_offset" => hold_offset = self.hold_offset(entry, &key_path),
                "time_of_flight" => time_of_flight = self.unsigned(entry, &key_path),
                "smearing" => smearing = self.unsigned(entry, &key_path),
                "outputs" => {
                    let Some(out_map) = self.object(entry, &key_path) else {
                        continue;
                    };
                    for (out_name, out_value) in out_map {
                        let out_path = format!("{key_path}.{out_name}");
                        if let Some(port) = self.port_ref(out_value, &out_path) {
                            outputs.insert(out_name.clone(), port);
                        }
                    }
                }
                _ => self.problem(key_path, "unknown key"),
            }
        }

        if sticky.is_some() && hold_offset.is_some() {
            self.problem(
                format!("{path}.hold_offset"),
                "hold_offset is superseded by sticky; give only one",
            );
        } else if let Some(legacy) = hold_offset {
            sticky = Some(legacy);
        }

        let input = match (single, mixed) {
            (Some(port), None) => ElementInput::Single { port },
            (None, Some(mixed)) => mixed,
            (Some(_), Some(_)) => {
                self.problem(path, "singleInput and mixInputs are mutually exclusive");
                return None;
            }
            (None, None) => {
                self.problem(path, "element needs singleInput or mixInputs");
                return None;
            }
        };

        Some(Element {
            input,
            intermediate_frequency,
            operations,
            sticky,
            time_of_flight,
            smearing,
            outputs,
        })
    }

    fn single_input(&mut self, value: &Value, path: &str) -> Option<PortRef> {
        let map = self.object(value, path)?;
        let mut port = None;
        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "port" => port = self.port_ref(entry, &key_path),
                _ => self.problem(key_path, "unknown key"),
            }
        }
        if port.is_none() {
            self.problem(path, "singleInput needs a port");
        }
        port
    }

    fn mix_inputs(&mut self, value: &Value, path: &str) -> Option<ElementInput> {
        let map = self.object(value, path)?;
        let mut i = None;
        let mut q = None;
        let mut lo_frequency = 0.0;
        let mut mixer = None;
        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "I" => i = self.port_ref(entry, &key_path),
                "Q" => q = self.port_ref(entry, &key_path),
                "lo_frequency" => {
                    if let Some(frequency) = self.number(entry, &key_path) {
                        lo_frequency = frequency;
                    }
                }
                "mixer" => mixer = self.string(entry, &key_path),
                _ => self.problem(key_path, "unknown key"),
            }
        }
        match (i, q) {
            (Some(i), Some(q)) => Some(ElementInput::Mixed {
                i,
                q,
                lo_frequency,
                mixer,
            }),
            _ => {
                self.problem(path, "mixInputs needs both I and Q ports");
                None
            }
        }
    }

    fn sticky(&mut self, value: &Value, path: &str) -> Option<Sticky> {
        let map = self.object(value, path)?;
        let mut analog = None;
        let mut digital = false;
        let mut duration = 4;
        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "analog" => analog = self.boolean(entry, &key_path),
                "digital" => {
                    if let Some(flag) = self.boolean(entry, &key_path) {
                        digital = flag;
                    }
                }
                "duration" => {
                    if let Some(value) = self.unsigned(entry, &key_path) {
                        duration = value;
                    }
                }
                _ => self.problem(key_path, "unknown key"),
            }
        }
        let Some(analog) = analog else {
            self.problem(path, "sticky needs an analog flag");
            return None;
        };
        Some(Sticky {
            analog,
            digital,
            duration,
        })
    }

    /// Legacy form of sticky: `hold_offset: { duration }` means an analog
    /// hold with no digital component.
    fn hold_offset(&mut self, value: &Value, path: &str) -> Option<Sticky> {
        let map = self.object(value, path)?;
        let mut duration = None;
        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "duration" => duration = self.unsigned(entry, &key_path),
                _ => self.problem(key_path, "unknown key"),
            }
        }
        let Some(duration) = duration else {
            self.problem(path, "hold_offset needs a duration");
            return None;
        };
        Some(Sticky {
            analog: true,
            digital: false,
            duration,
        })
    }

    fn string_map(&mut self, value: &Value, path: &str) -> IndexMap<String, String> {
        let mut entries = IndexMap::new();
        let Some(map) = self.object(value, path) else {
            return entries;
        };
        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            if let Some(text) = self.string(entry, &key_path) {
                entries.insert(key.clone(), text);
            }
        }
        entries
    }

    // -----------------------------------------------------------------
    // Pulses
    // -----------------------------------------------------------------

    fn pulses(&mut self, value: &Value) -> IndexMap<String, Pulse> {
        let mut pulses = IndexMap::new();
        let Some(map) = self.object(value, "pulses") else {
            return pulses;
        };
        for (name, entry) in map {
            let path = format!("pulses.{name}");
            if let Some(pulse) = self.pulse(entry, &path) {
                pulses.insert(name.clone(), pulse);
            }
        }
        pulses
    }

    fn pulse(&mut self, value: &Value, path: &str) -> Option<Pulse> {
        let map = self.object(value, path)?;
        let mut operation = None;
        let mut length = None;
        let mut waveforms = IndexMap::new();
        let mut integration_weights = IndexMap::new();
        let mut digital_marker = None;
        let mut legacy_marker = None;

        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "operation" => match entry.as_str() {
                    Some("control") => operation = Some(OperationKind::Control),
                    Some("measurement") => operation = Some(OperationKind::Measurement),
                    _ => self.problem(key_path, "expected \"control\" or \"measurement\""),
                },
                "length" => length = self.unsigned(entry, &key_path),
                "waveforms" => waveforms = self.string_map(entry, &key_path),
                "integration_weights" => {
                    integration_weights = self.string_map(entry, &key_path);
                }
                "digital_marker" => digital_marker = self.string(entry, &key_path),
                "digital_waveform" => legacy_marker = self.string(entry, &key_path),
                _ => self.problem(key_path, "unknown key"),
            }
        }

        if digital_marker.is_some() && legacy_marker.is_some() {
            self.problem(
                format!("{path}.digital_waveform"),
                "digital_waveform is superseded by digital_marker; give only one",
            );
        } else if legacy_marker.is_some() {
            digital_marker = legacy_marker;
        }

        let operation = match operation {
            Some(operation) => operation,
            None => {
                self.problem(path, "pulse needs an operation kind");
                return None;
            }
        };
        let length = match length {
            Some(length) => length,
            None => {
                self.problem(path, "pulse needs a length");
                return None;
            }
        };

        Some(Pulse {
            operation,
            length,
            waveforms,
            integration_weights,
            digital_marker,
        })
    }

    // -----------------------------------------------------------------
    // Waveforms and integration weights
    // -----------------------------------------------------------------

    fn waveforms(&mut self, value: &Value) -> IndexMap<String, Waveform> {
        let mut waveforms = IndexMap::new();
        let Some(map) = self.object(value, "waveforms") else {
            return waveforms;
        };
        for (name, entry) in map {
            let path = format!("waveforms.{name}");
            if let Some(waveform) = self.waveform(entry, &path) {
                waveforms.insert(name.clone(), waveform);
            }
        }
        waveforms
    }

    fn waveform(&mut self, value: &Value, path: &str) -> Option<Waveform> {
        let map = self.object(value, path)?;
        let kind = match map.get("type").and_then(Value::as_str) {
            Some(kind) => kind,
            None => {
                self.problem(
                    format!("{path}.type"),
                    "expected \"constant\" or \"arbitrary\"",
                );
                return None;
            }
        };
        match kind {
            "constant" => {
                let mut sample = None;
                for (key, entry) in map {
                    let key_path = format!("{path}.{key}");
                    match key.as_str() {
                        "type" => {}
                        "sample" => sample = self.number(entry, &key_path),
                        _ => self.problem(key_path, "unknown key"),
                    }
                }
                let Some(sample) = sample else {
                    self.problem(path, "constant waveform needs a sample");
                    return None;
                };
                Some(Waveform::Constant { sample })
            }
            "arbitrary" => {
                let mut samples = None;
                for (key, entry) in map {
                    let key_path = format!("{path}.{key}");
                    match key.as_str() {
                        "type" => {}
                        "samples" => samples = self.number_list(entry, &key_path),
                        _ => self.problem(key_path, "unknown key"),
                    }
                }
                let Some(samples) = samples else {
                    self.problem(path, "arbitrary waveform needs samples");
                    return None;
                };
                Some(Waveform::Arbitrary { samples })
            }
            _ => {
                self.problem(
                    format!("{path}.type"),
                    "expected \"constant\" or \"arbitrary\"",
                );
                None
            }
        }
    }

    fn number_list(&mut self, value: &Value, path: &str) -> Option<Vec<f64>> {
        let Some(entries) = value.as_array() else {
            self.problem(path, "expected a list of numbers");
            return None;
        };
        let mut numbers = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            numbers.push(self.number(entry, &format!("{path}[{index}]"))?);
        }
        Some(numbers)
    }

    fn integration_weights(&mut self, value: &Value) -> IndexMap<String, IntegrationWeights> {
        let mut weights = IndexMap::new();
        let Some(map) = self.object(value, "integration_weights") else {
            return weights;
        };
        for (name, entry) in map {
            let path = format!("integration_weights.{name}");
            let Some(entry_map) = self.object(entry, &path) else {
                continue;
            };
            let mut cosine = Vec::new();
            let mut sine = Vec::new();
            for (key, field_value) in entry_map {
                let key_path = format!("{path}.{key}");
                match key.as_str() {
                    "cosine" => cosine = self.weight_entries(field_value, &key_path),
                    "sine" => sine = self.weight_entries(field_value, &key_path),
                    _ => self.problem(key_path, "unknown key"),
                }
            }
            weights.insert(name.clone(), IntegrationWeights { cosine, sine });
        }
        weights
    }

    /// Integration weights come in two shapes: `[value, length]` pairs pass
    /// through, and a flat list of per-sample values is run-length
    /// compressed, each sample covering one 4 ns clock cycle.
    fn weight_entries(&mut self, value: &Value, path: &str) -> Vec<WeightEntry> {
        let Some(entries) = value.as_array() else {
            self.problem(path, "expected a list of weights");
            return Vec::new();
        };
        if entries.iter().all(Value::is_number) {
            let mut samples = Vec::with_capacity(entries.len());
            for (index, entry) in entries.iter().enumerate() {
                if let Some(sample) = self.number(entry, &format!("{path}[{index}]")) {
                    samples.push(sample);
                }
            }
            return run_lengths(&samples)
                .into_iter()
                .map(|(value, count)| WeightEntry {
                    value,
                    length: count as u32 * WEIGHT_SAMPLE_NS,
                })
                .collect();
        }
        let mut weights = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let entry_path = format!("{path}[{index}]");
            let Some(pair) = entry.as_array() else {
                self.problem(entry_path, "expected a [value, length] pair");
                continue;
            };
            if pair.len() != 2 {
                self.problem(entry_path, "expected a [value, length] pair");
                continue;
            }
            let value = self.number(&pair[0], &entry_path);
            let length = self.unsigned(&pair[1], &entry_path);
            if let (Some(value), Some(length)) = (value, length) {
                weights.push(WeightEntry { value, length });
            }
        }
        weights
    }

    // -----------------------------------------------------------------
    // Mixers, digital waveforms, octaves
    // -----------------------------------------------------------------

    fn mixers(&mut self, value: &Value) -> IndexMap<String, Mixer> {
        let mut mixers = IndexMap::new();
        let Some(map) = self.object(value, "mixers") else {
            return mixers;
        };
        for (name, entry) in map {
            let path = format!("mixers.{name}");
            let Some(rows) = entry.as_array() else {
                self.problem(path, "expected a list of corrections");
                continue;
            };
            let mut corrections = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                let row_path = format!("{path}[{index}]");
                if let Some(correction) = self.mixer_correction(row, &row_path) {
                    corrections.push(correction);
                }
            }
            mixers.insert(name.clone(), Mixer { corrections });
        }
        mixers
    }

    fn mixer_correction(&mut self, value: &Value, path: &str) -> Option<MixerCorrection> {
        let map = self.object(value, path)?;
        let mut intermediate_frequency = None;
        let mut lo_frequency = None;
        let mut correction = None;
        for (key, entry) in map {
            let key_path = format!("{path}.{key}");
            match key.as_str() {
                "intermediate_frequency" => {
                    intermediate_frequency = self.number(entry, &key_path);
                }
                "lo_frequency" => lo_frequency = self.number(entry, &key_path),
                "correction" => {
                    let Some(values) = self.number_list(entry, &key_path) else {
                        continue;
                    };
                    match <[f64; 4]>::try_from(values) {
                        Ok(matrix) => correction = Some(matrix),
                        Err(_) => {
                            self.problem(key_path, "correction matrix needs exactly 4 entries");
                        }
                    }
                }
                _ => self.problem(key_path, "unknown key"),
            }
        }
        match (intermediate_frequency, lo_frequency, correction) {
            (Some(intermediate_frequency), Some(lo_frequency), Some(correction)) => {
                Some(MixerCorrection {
                    intermediate_frequency,
                    lo_frequency,
                    correction,
                })
            }
            _ => {
                self.problem(
                    path,
                    "correction needs intermediate_frequency, lo_frequency, and correction",
                );
                None
            }
        }
    }

    fn digital_waveforms(&mut self, value: &Value) -> IndexMap<String, DigitalWaveform> {
        let mut waveforms = IndexMap::new();
        let Some(map) = self.object(value, "digital_waveforms") else {
            return waveforms;
        };
        for (name, entry) in map {
            let path = format!("digital_waveforms.{name}");
            let Some(entry_map) = self.object(entry, &path) else {
                continue;
            };
            let mut samples = Vec::new();
            for (key, field_value) in entry_map {
                let key_path = format!("{path}.{key}");
                match key.as_str() {
                    "samples" => {
                        let Some(pairs) = field_value.as_array() else {
                            self.problem(key_path, "expected a list of [level, length] pairs");
                            continue;
                        };
                        for (index, pair_value) in pairs.iter().enumerate() {
                            let pair_path = format!("{key_path}[{index}]");
                            let Some(pair) = pair_value.as_array() else {
                                self.problem(pair_path, "expected a [level, length] pair");
                                continue;
                            };
                            if pair.len() != 2 {
                                self.problem(pair_path, "expected a [level, length] pair");
                                continue;
                            }
                            let level = self.unsigned(&pair[0], &pair_path);
                            let length = self.unsigned(&pair[1], &pair_path);
                            if let (Some(level), Some(length)) = (level, length) {
                                match u8::try_from(level) {
                                    Ok(level) => samples.push(DigitalSample { level, length }),
                                    Err(_) => {
                                        self.problem(pair_path, "digital level out of range");
                                    }
                                }
                            }
                        }
                    }
                    _ => self.problem(key_path, "unknown key"),
                }
            }
            waveforms.insert(name.clone(), DigitalWaveform { samples });
        }
        waveforms
    }

    fn octaves(&mut self, value: &Value) -> IndexMap<String, Octave> {
        let mut octaves = IndexMap::new();
        let Some(map) = self.object(value, "octaves") else {
            return octaves;
        };
        for (name, entry) in map {
            let path = format!("octaves.{name}");
            let Some(entry_map) = self.object(entry, &path) else {
                continue;
            };
            let mut octave = Octave::default();
            for (key, field_value) in entry_map {
                let key_path = format!("{path}.{key}");
                match key.as_str() {
                    "rf_outputs" => octave.rf_outputs = self.rf_outputs(field_value, &key_path),
                    "loopbacks" => octave.loopbacks = self.loopbacks(field_value, &key_path),
                    _ => self.problem(key_path, "unknown key"),
                }
            }
            octaves.insert(name.clone(), octave);
        }
        octaves
    }

    fn rf_outputs(&mut self, value: &Value, path: &str) -> IndexMap<u32, OctaveRfOutput> {
        let mut outputs = IndexMap::new();
        let Some(map) = self.object(value, path) else {
            return outputs;
        };
        for (key, entry) in map {
            let port_path = format!("{path}.{key}");
            let Some(port) = self.port_number(key, &port_path) else {
                continue;
            };
            let Some(entry_map) = self.object(entry, &port_path) else {
                continue;
            };
            let mut output = OctaveRfOutput {
                lo_frequency: 0.0,
                gain: 0.0,
            };
            for (field, field_value) in entry_map {
                let field_path = format!("{port_path}.{field}");
                match field.as_str() {
                    "lo_frequency" => {
                        if let Some(frequency) = self.number(field_value, &field_path) {
                            output.lo_frequency = frequency;
                        }
                    }
                    "gain" => {
                        if let Some(gain) = self.number(field_value, &field_path) {
                            output.gain = gain;
                        }
                    }
                    _ => self.problem(field_path, "unknown key"),
                }
            }
            outputs.insert(port, output);
        }
        outputs
    }

    /// Loopback routes: `[[source_octave, source_port], destination_port]`
    /// entries. An explicitly empty list normalizes the same as an absent
    /// field.
    fn loopbacks(&mut self, value: &Value, path: &str) -> Vec<Loopback> {
        let Some(entries) = value.as_array() else {
            self.problem(path, "expected a list of loopback routes");
            return Vec::new();
        };
        let mut loopbacks = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let entry_path = format!("{path}[{index}]");
            let Some(pair) = entry.as_array() else {
                self.problem(entry_path, "expected a [[octave, port], port] route");
                continue;
            };
            if pair.len() != 2 {
                self.problem(entry_path, "expected a [[octave, port], port] route");
                continue;
            }
            let Some(source) = pair[0].as_array() else {
                self.problem(entry_path, "expected a [[octave, port], port] route");
                continue;
            };
            if source.len() != 2 {
                self.problem(entry_path, "expected a [[octave, port], port] route");
                continue;
            }
            let source_octave = self.string(&source[0], &entry_path);
            let source_port = self.string(&source[1], &entry_path);
            let destination_port = self.string(&pair[1], &entry_path);
            if let (Some(source_octave), Some(source_port), Some(destination_port)) =
                (source_octave, source_port, destination_port)
            {
                loopbacks.push(Loopback {
                    source_octave,
                    source_port,
                    destination_port,
                });
            }
        }
        loopbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn build(value: serde_json::Value) -> Result<Config, ConfigStructuralError> {
        build_config(&value)
    }

    #[test]
    fn test_minimal_config() {
        let config = build(json!({
            "controllers": {
                "con1": {
                    "analog_outputs": { "1": { "offset": 0.0 } }
                }
            },
            "elements": {
                "qubit": {
                    "singleInput": { "port": ["con1", 1] },
                    "intermediate_frequency": 50e6,
                    "operations": { "x90": "x90_pulse" }
                }
            },
            "pulses": {
                "x90_pulse": {
                    "operation": "control",
                    "length": 40,
                    "waveforms": { "single": "gauss" }
                }
            },
            "waveforms": {
                "gauss": { "type": "arbitrary", "samples": [0.1, 0.2, 0.1] }
            }
        }))
        .unwrap();

        assert_eq!(config.controllers["con1"].analog_outputs[&1].offset, 0.0);
        assert_eq!(config.elements["qubit"].intermediate_frequency, Some(50e6));
        assert_eq!(config.pulses["x90_pulse"].length, 40);
        assert_eq!(
            config.waveforms["gauss"],
            Waveform::Arbitrary {
                samples: vec![0.1, 0.2, 0.1]
            }
        );
    }

    #[test]
    fn test_port_pair_and_object_normalize_identically() {
        let pair = build(json!({
            "elements": {
                "qubit": { "singleInput": { "port": ["con1", 2] } }
            }
        }))
        .unwrap();
        let object = build(json!({
            "elements": {
                "qubit": { "singleInput": { "port": { "controller": "con1", "port": 2 } } }
            }
        }))
        .unwrap();
        assert_eq!(pair, object);
    }

    #[test]
    fn test_negative_frequency_sign_preserved() {
        let config = build(json!({
            "elements": {
                "qubit": {
                    "singleInput": { "port": ["con1", 1] },
                    "intermediate_frequency": -50e6
                }
            }
        }))
        .unwrap();
        assert_eq!(config.elements["qubit"].intermediate_frequency, Some(-50e6));
    }

    #[test]
    fn test_integer_frequency_accepted() {
        let config = build(json!({
            "elements": {
                "qubit": {
                    "singleInput": { "port": ["con1", 1] },
                    "intermediate_frequency": 50_000_000
                }
            }
        }))
        .unwrap();
        assert_eq!(
            config.elements["qubit"].intermediate_frequency,
            Some(50_000_000.0)
        );
    }

    #[test]
    fn test_hold_offset_normalizes_to_sticky() {
        let config = build(json!({
            "elements": {
                "qubit": {
                    "singleInput": { "port": ["con1", 1] },
                    "hold_offset": { "duration": 16 }
                }
            }
        }))
        .unwrap();
        assert_eq!(
            config.elements["qubit"].sticky,
            Some(Sticky {
                analog: true,
                digital: false,
                duration: 16
            })
        );
    }

    #[test]
    fn test_sticky_and_hold_offset_together_rejected() {
        let err = build(json!({
            "elements": {
                "qubit": {
                    "singleInput": { "port": ["con1", 1] },
                    "sticky": { "analog": true, "duration": 16 },
                    "hold_offset": { "duration": 16 }
                }
            }
        }))
        .unwrap_err();
        assert!(
            err.problems()
                .iter()
                .any(|p| p.path == "elements.qubit.hold_offset")
        );
    }

    #[test]
    fn test_unknown_key_reports_full_path() {
        let err = build(json!({
            "elements": {
                "qubit": {
                    "singleInput": { "port": ["con1", 1] },
                    "colour": "blue"
                }
            }
        }))
        .unwrap_err();
        assert_eq!(err.problems()[0].path, "elements.qubit.colour");
        assert_eq!(err.problems()[0].message, "unknown key");
    }

    #[test]
    fn test_problems_aggregate() {
        let err = build(json!({
            "bogus": {},
            "pulses": {
                "p": { "operation": "teleport", "length": 40 }
            }
        }))
        .unwrap_err();
        assert!(err.problems().len() >= 2);
    }

    #[test]
    fn test_flat_weights_compressed() {
        let config = build(json!({
            "integration_weights": {
                "cos": {
                    "cosine": [1.0, 1.0, 1.0, 0.5],
                    "sine": [[0.0, 16]]
                }
            }
        }))
        .unwrap();
        let weights = &config.integration_weights["cos"];
        assert_eq!(
            weights.cosine,
            vec![
                WeightEntry {
                    value: 1.0,
                    length: 12
                },
                WeightEntry {
                    value: 0.5,
                    length: 4
                },
            ]
        );
        assert_eq!(
            weights.sine,
            vec![WeightEntry {
                value: 0.0,
                length: 16
            }]
        );
    }

    #[test]
    fn test_empty_loopbacks_same_as_absent() {
        let explicit = build(json!({
            "octaves": { "oct1": { "rf_outputs": {}, "loopbacks": [] } }
        }))
        .unwrap();
        let absent = build(json!({
            "octaves": { "oct1": { "rf_outputs": {} } }
        }))
        .unwrap();
        assert_eq!(explicit, absent);
    }

    #[test]
    fn test_loopback_route_parsed() {
        let config = build(json!({
            "octaves": {
                "oct1": {
                    "loopbacks": [[["oct1", "Synth1"], "Dmd1LO"]]
                }
            }
        }))
        .unwrap();
        assert_eq!(
            config.octaves["oct1"].loopbacks,
            vec![Loopback {
                source_octave: "oct1".to_string(),
                source_port: "Synth1".to_string(),
                destination_port: "Dmd1LO".to_string(),
            }]
        );
    }

    #[test]
    fn test_legacy_digital_waveform_key() {
        let config = build(json!({
            "pulses": {
                "ro": {
                    "operation": "measurement",
                    "length": 100,
                    "digital_waveform": "ON"
                }
            }
        }))
        .unwrap();
        assert_eq!(
            config.pulses["ro"].digital_marker,
            Some("ON".to_string())
        );
    }

    #[test]
    fn test_mixer_correction_arity_checked() {
        let err = build(json!({
            "mixers": {
                "m1": [{
                    "intermediate_frequency": 50e6,
                    "lo_frequency": 5e9,
                    "correction": [1.0, 0.0, 0.0]
                }]
            }
        }))
        .unwrap_err();
        assert!(
            err.problems()
                .iter()
                .any(|p| p.path == "mixers.m1[0].correction")
        );
    }

    #[test]
    fn test_digital_waveform_samples() {
        let config = build(json!({
            "digital_waveforms": {
                "ON": { "samples": [[1, 100], [0, 20]] }
            }
        }))
        .unwrap();
        assert_eq!(
            config.digital_waveforms["ON"].samples,
            vec![
                DigitalSample {
                    level: 1,
                    length: 100
                },
                DigitalSample {
                    level: 0,
                    length: 20
                },
            ]
        );
    }
}
