//! The binary-schema validation strategy.
//!
//! The model converts into hand-maintained protobuf messages whose
//! conversions enforce the same field bounds as the constraint-schema
//! strategy, then the bytes round-trip through encode/decode. The schema
//! enforces shape; referential integrity stays with the shared semantic
//! pass in `validate`. The message definitions mirror generated code and
//! are kept flat for that reason.

use std::collections::HashMap;

use prost::Message;

use carillon_core::config::{
    Config, Controller, Element, ElementInput, Mixer, Octave, OperationKind, PortRef, Pulse,
    Waveform,
};

use super::{ConfigError, Problem};

const MAX_ANALOG_OFFSET: f64 = 0.5;

/// Run the binary-schema strategy. Field-bound violations come back as
/// problems; an encode/decode divergence is an internal error.
pub(crate) fn check(config: &Config) -> Result<Vec<Problem>, ConfigError> {
    let wire = match encode_model(config) {
        Ok(wire) => wire,
        Err(problems) => return Ok(problems),
    };
    let bytes = wire.encode_to_vec();
    let decoded = WireConfig::decode(bytes.as_slice())
        .map_err(|err| ConfigError::Internal(format!("wire schema decode failed: {err}")))?;
    if decoded != wire {
        return Err(ConfigError::Internal(
            "wire schema round trip diverged".to_string(),
        ));
    }
    Ok(Vec::new())
}

// ---------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireConfig {
    #[prost(map = "string, message", tag = "1")]
    pub controllers: HashMap<String, WireController>,
    #[prost(map = "string, message", tag = "2")]
    pub elements: HashMap<String, WireElement>,
    #[prost(map = "string, message", tag = "3")]
    pub pulses: HashMap<String, WirePulse>,
    #[prost(map = "string, message", tag = "4")]
    pub waveforms: HashMap<String, WireWaveform>,
    #[prost(map = "string, message", tag = "5")]
    pub integration_weights: HashMap<String, WireIntegrationWeights>,
    #[prost(map = "string, message", tag = "6")]
    pub mixers: HashMap<String, WireMixer>,
    #[prost(map = "string, message", tag = "7")]
    pub digital_waveforms: HashMap<String, WireDigitalWaveform>,
    #[prost(map = "string, message", tag = "8")]
    pub octaves: HashMap<String, WireOctave>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireController {
    #[prost(map = "uint32, message", tag = "1")]
    pub analog_outputs: HashMap<u32, WireAnalogOutput>,
    #[prost(map = "uint32, message", tag = "2")]
    pub analog_inputs: HashMap<u32, WireAnalogInput>,
    #[prost(map = "uint32, message", tag = "3")]
    pub digital_outputs: HashMap<u32, WireDigitalOutput>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireAnalogOutput {
    #[prost(double, tag = "1")]
    pub offset: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireAnalogInput {
    #[prost(double, tag = "1")]
    pub offset: f64,
    #[prost(sint32, tag = "2")]
    pub gain_db: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireDigitalOutput {
    #[prost(bool, tag = "1")]
    pub inverted: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WirePortRef {
    #[prost(string, tag = "1")]
    pub controller: String,
    #[prost(uint32, tag = "2")]
    pub port: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireMixedInput {
    #[prost(message, optional, tag = "1")]
    pub i: Option<WirePortRef>,
    #[prost(message, optional, tag = "2")]
    pub q: Option<WirePortRef>,
    #[prost(double, tag = "3")]
    pub lo_frequency: f64,
    #[prost(string, optional, tag = "4")]
    pub mixer: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireSticky {
    #[prost(bool, tag = "1")]
    pub analog: bool,
    #[prost(bool, tag = "2")]
    pub digital: bool,
    #[prost(uint32, tag = "3")]
    pub duration: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireElement {
    #[prost(oneof = "wire_element::Input", tags = "1, 2")]
    pub input: Option<wire_element::Input>,
    #[prost(double, optional, tag = "3")]
    pub intermediate_frequency: Option<f64>,
    #[prost(map = "string, string", tag = "4")]
    pub operations: HashMap<String, String>,
    #[prost(message, optional, tag = "5")]
    pub sticky: Option<WireSticky>,
    #[prost(uint32, optional, tag = "6")]
    pub time_of_flight: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub smearing: Option<u32>,
    #[prost(map = "string, message", tag = "8")]
    pub outputs: HashMap<String, WirePortRef>,
}

pub mod wire_element {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Input {
        #[prost(message, tag = "1")]
        Single(super::WirePortRef),
        #[prost(message, tag = "2")]
        Mixed(super::WireMixedInput),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireOperationKind {
    Control = 0,
    Measurement = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WirePulse {
    #[prost(enumeration = "WireOperationKind", tag = "1")]
    pub operation: i32,
    #[prost(uint32, tag = "2")]
    pub length: u32,
    #[prost(map = "string, string", tag = "3")]
    pub waveforms: HashMap<String, String>,
    #[prost(map = "string, string", tag = "4")]
    pub integration_weights: HashMap<String, String>,
    #[prost(string, optional, tag = "5")]
    pub digital_marker: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireSamples {
    #[prost(double, repeated, tag = "1")]
    pub samples: Vec<f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireWaveform {
    #[prost(oneof = "wire_waveform::Kind", tags = "1, 2")]
    pub kind: Option<wire_waveform::Kind>,
}

pub mod wire_waveform {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(double, tag = "1")]
        Constant(f64),
        #[prost(message, tag = "2")]
        Arbitrary(super::WireSamples),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireWeightEntry {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(uint32, tag = "2")]
    pub length: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireIntegrationWeights {
    #[prost(message, repeated, tag = "1")]
    pub cosine: Vec<WireWeightEntry>,
    #[prost(message, repeated, tag = "2")]
    pub sine: Vec<WireWeightEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireMixerCorrection {
    #[prost(double, tag = "1")]
    pub intermediate_frequency: f64,
    #[prost(double, tag = "2")]
    pub lo_frequency: f64,
    #[prost(double, repeated, tag = "3")]
    pub correction: Vec<f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireMixer {
    #[prost(message, repeated, tag = "1")]
    pub corrections: Vec<WireMixerCorrection>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireDigitalSample {
    #[prost(uint32, tag = "1")]
    pub level: u32,
    #[prost(uint32, tag = "2")]
    pub length: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireDigitalWaveform {
    #[prost(message, repeated, tag = "1")]
    pub samples: Vec<WireDigitalSample>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireOctaveRfOutput {
    #[prost(double, tag = "1")]
    pub lo_frequency: f64,
    #[prost(double, tag = "2")]
    pub gain: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireLoopback {
    #[prost(string, tag = "1")]
    pub source_octave: String,
    #[prost(string, tag = "2")]
    pub source_port: String,
    #[prost(string, tag = "3")]
    pub destination_port: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireOctave {
    #[prost(map = "uint32, message", tag = "1")]
    pub rf_outputs: HashMap<u32, WireOctaveRfOutput>,
    #[prost(message, repeated, tag = "2")]
    pub loopbacks: Vec<WireLoopback>,
}

// ---------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------

fn port_ref(port: &PortRef) -> WirePortRef {
    WirePortRef {
        controller: port.controller.clone(),
        port: port.port,
    }
}

fn encode_model(config: &Config) -> Result<WireConfig, Vec<Problem>> {
    let mut problems = Vec::new();
    let wire = WireConfig {
        controllers: config
            .controllers
            .iter()
            .map(|(name, controller)| {
                (name.clone(), encode_controller(name, controller, &mut problems))
            })
            .collect(),
        elements: config
            .elements
            .iter()
            .map(|(name, element)| (name.clone(), encode_element(name, element, &mut problems)))
            .collect(),
        pulses: config
            .pulses
            .iter()
            .map(|(name, pulse)| (name.clone(), encode_pulse(name, pulse, &mut problems)))
            .collect(),
        waveforms: config
            .waveforms
            .iter()
            .map(|(name, waveform)| {
                (name.clone(), encode_waveform(name, waveform, &mut problems))
            })
            .collect(),
        integration_weights: config
            .integration_weights
            .iter()
            .map(|(name, weights)| {
                let entry = WireIntegrationWeights {
                    cosine: weights
                        .cosine
                        .iter()
                        .map(|w| WireWeightEntry {
                            value: w.value,
                            length: w.length,
                        })
                        .collect(),
                    sine: weights
                        .sine
                        .iter()
                        .map(|w| WireWeightEntry {
                            value: w.value,
                            length: w.length,
                        })
                        .collect(),
                };
                (name.clone(), entry)
            })
            .collect(),
        mixers: config
            .mixers
            .iter()
            .map(|(name, mixer)| (name.clone(), encode_mixer(name, mixer, &mut problems)))
            .collect(),
        digital_waveforms: config
            .digital_waveforms
            .iter()
            .map(|(name, waveform)| {
                let samples = waveform
                    .samples
                    .iter()
                    .enumerate()
                    .map(|(index, sample)| {
                        if sample.level > 1 {
                            problems.push(Problem::new(
                                format!("digital_waveforms.{name}.samples[{index}]"),
                                "digital sample level must be 0 or 1",
                            ));
                        }
                        WireDigitalSample {
                            level: u32::from(sample.level),
                            length: sample.length,
                        }
                    })
                    .collect();
                (name.clone(), WireDigitalWaveform { samples })
            })
            .collect(),
        octaves: config
            .octaves
            .iter()
            .map(|(name, octave)| (name.clone(), encode_octave(octave)))
            .collect(),
    };
    if problems.is_empty() {
        Ok(wire)
    } else {
        Err(problems)
    }
}

fn encode_controller(
    name: &str,
    controller: &Controller,
    problems: &mut Vec<Problem>,
) -> WireController {
    WireController {
        analog_outputs: controller
            .analog_outputs
            .iter()
            .map(|(port, output)| {
                if !(output.offset.is_finite() && output.offset.abs() <= MAX_ANALOG_OFFSET) {
                    problems.push(Problem::new(
                        format!("controllers.{name}.analog_outputs.{port}.offset"),
                        "DC offset must be within ±0.5 V",
                    ));
                }
                (*port, WireAnalogOutput { offset: output.offset })
            })
            .collect(),
        analog_inputs: controller
            .analog_inputs
            .iter()
            .map(|(port, input)| {
                if !(input.offset.is_finite() && input.offset.abs() <= MAX_ANALOG_OFFSET) {
                    problems.push(Problem::new(
                        format!("controllers.{name}.analog_inputs.{port}.offset"),
                        "DC offset must be within ±0.5 V",
                    ));
                }
                (
                    *port,
                    WireAnalogInput {
                        offset: input.offset,
                        gain_db: input.gain_db,
                    },
                )
            })
            .collect(),
        digital_outputs: controller
            .digital_outputs
            .iter()
            .map(|(port, output)| {
                (
                    *port,
                    WireDigitalOutput {
                        inverted: output.inverted,
                    },
                )
            })
            .collect(),
    }
}

fn encode_element(name: &str, element: &Element, problems: &mut Vec<Problem>) -> WireElement {
    let input = match &element.input {
        ElementInput::Single { port } => wire_element::Input::Single(port_ref(port)),
        ElementInput::Mixed {
            i,
            q,
            lo_frequency,
            mixer,
        } => wire_element::Input::Mixed(WireMixedInput {
            i: Some(port_ref(i)),
            q: Some(port_ref(q)),
            lo_frequency: *lo_frequency,
            mixer: mixer.clone(),
        }),
    };
    let sticky = element.sticky.as_ref().map(|sticky| {
        if sticky.duration == 0 || sticky.duration % 4 != 0 {
            problems.push(Problem::new(
                format!("elements.{name}.sticky.duration"),
                "sticky duration must be a positive multiple of 4",
            ));
        }
        WireSticky {
            analog: sticky.analog,
            digital: sticky.digital,
            duration: sticky.duration,
        }
    });
    WireElement {
        input: Some(input),
        intermediate_frequency: element.intermediate_frequency,
        operations: element
            .operations
            .iter()
            .map(|(op, pulse)| (op.clone(), pulse.clone()))
            .collect(),
        sticky,
        time_of_flight: element.time_of_flight,
        smearing: element.smearing,
        outputs: element
            .outputs
            .iter()
            .map(|(out, port)| (out.clone(), port_ref(port)))
            .collect(),
    }
}

fn encode_pulse(name: &str, pulse: &Pulse, problems: &mut Vec<Problem>) -> WirePulse {
    if pulse.length == 0 {
        problems.push(Problem::new(
            format!("pulses.{name}.length"),
            "pulse length must be positive",
        ));
    }
    let operation = match pulse.operation {
        OperationKind::Control => WireOperationKind::Control,
        OperationKind::Measurement => WireOperationKind::Measurement,
    };
    WirePulse {
        operation: operation as i32,
        length: pulse.length,
        waveforms: pulse
            .waveforms
            .iter()
            .map(|(slot, wf)| (slot.clone(), wf.clone()))
            .collect(),
        integration_weights: pulse
            .integration_weights
            .iter()
            .map(|(label, weights)| (label.clone(), weights.clone()))
            .collect(),
        digital_marker: pulse.digital_marker.clone(),
    }
}

fn encode_waveform(name: &str, waveform: &Waveform, problems: &mut Vec<Problem>) -> WireWaveform {
    let kind = match waveform {
        Waveform::Constant { sample } => wire_waveform::Kind::Constant(*sample),
        Waveform::Arbitrary { samples } => {
            if samples.is_empty() {
                problems.push(Problem::new(
                    format!("waveforms.{name}.samples"),
                    "arbitrary waveform needs at least one sample",
                ));
            }
            wire_waveform::Kind::Arbitrary(WireSamples {
                samples: samples.clone(),
            })
        }
    };
    WireWaveform { kind: Some(kind) }
}

fn encode_mixer(name: &str, mixer: &Mixer, problems: &mut Vec<Problem>) -> WireMixer {
    WireMixer {
        corrections: mixer
            .corrections
            .iter()
            .enumerate()
            .map(|(index, correction)| {
                if correction.correction.iter().any(|entry| !entry.is_finite()) {
                    problems.push(Problem::new(
                        format!("mixers.{name}[{index}].correction"),
                        "correction matrix entries must be finite",
                    ));
                }
                WireMixerCorrection {
                    intermediate_frequency: correction.intermediate_frequency,
                    lo_frequency: correction.lo_frequency,
                    correction: correction.correction.to_vec(),
                }
            })
            .collect(),
    }
}

fn encode_octave(octave: &Octave) -> WireOctave {
    WireOctave {
        rf_outputs: octave
            .rf_outputs
            .iter()
            .map(|(port, output)| {
                (
                    *port,
                    WireOctaveRfOutput {
                        lo_frequency: output.lo_frequency,
                        gain: output.gain,
                    },
                )
            })
            .collect(),
        loopbacks: octave
            .loopbacks
            .iter()
            .map(|loopback| WireLoopback {
                source_octave: loopback.source_octave.clone(),
                source_port: loopback.source_port.clone(),
                destination_port: loopback.destination_port.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use carillon_core::config::{AnalogOutput, Sticky};
    use indexmap::IndexMap;

    fn element(sticky: Option<Sticky>) -> Element {
        Element {
            input: ElementInput::Single {
                port: PortRef {
                    controller: "con1".to_string(),
                    port: 1,
                },
            },
            intermediate_frequency: Some(-50e6),
            operations: IndexMap::new(),
            sticky,
            time_of_flight: None,
            smearing: None,
            outputs: IndexMap::new(),
        }
    }

    #[test]
    fn test_valid_config_round_trips() {
        let mut config = Config::default();
        let mut controller = Controller::default();
        controller
            .analog_outputs
            .insert(1, AnalogOutput { offset: 0.1 });
        config.controllers.insert("con1".to_string(), controller);
        config.elements.insert("qubit".to_string(), element(None));

        assert_eq!(check(&config).unwrap(), Vec::new());
    }

    #[test]
    fn test_bad_sticky_duration_matches_rules_path() {
        let mut config = Config::default();
        config.elements.insert(
            "qubit".to_string(),
            element(Some(Sticky {
                analog: true,
                digital: false,
                duration: 6,
            })),
        );

        let problems = check(&config).unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].path, "elements.qubit.sticky.duration");
        assert_eq!(problems, super::super::rules::check(&config));
    }

    #[test]
    fn test_offset_bound_matches_rules() {
        let mut config = Config::default();
        let mut controller = Controller::default();
        controller
            .analog_outputs
            .insert(2, AnalogOutput { offset: -0.6 });
        config.controllers.insert("con1".to_string(), controller);

        let problems = check(&config).unwrap();
        assert_eq!(problems, super::super::rules::check(&config));
    }

    #[test]
    fn test_negative_frequency_survives_encoding() {
        let mut config = Config::default();
        config.elements.insert("qubit".to_string(), element(None));
        let wire = encode_model(&config).unwrap();
        assert_eq!(
            wire.elements["qubit"].intermediate_frequency,
            Some(-50e6)
        );
    }
}
