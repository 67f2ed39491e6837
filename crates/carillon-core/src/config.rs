//! The normalized hardware-configuration model.
//!
//! Instances are produced by the configuration constructor in the facade
//! crate, already normalized (tuple-vs-list ports unified, legacy sticky
//! fields rewritten, empty loopbacks dropped, frequency signs preserved
//! exactly as supplied). Validators accept or reject but never mutate.

use indexmap::IndexMap;
use serde::Serialize;

/// A physical port on a named controller.
///
/// Accepted in the raw mapping as either a 2-entry list or a tuple-style
/// pair; both normalize to this struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PortRef {
    pub controller: String,
    pub port: u32,
}

/// Analog output port definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalogOutput {
    /// DC offset in volts.
    pub offset: f64,
}

/// Analog input port definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalogInput {
    pub offset: f64,
    pub gain_db: i32,
}

/// Digital output port definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigitalOutput {
    pub inverted: bool,
}

/// A controller with its port banks. Port numbers are map keys, so they are
/// unique per controller by construction; the constructor rejects raw keys
/// that collide after normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Controller {
    pub analog_outputs: IndexMap<u32, AnalogOutput>,
    pub analog_inputs: IndexMap<u32, AnalogInput>,
    pub digital_outputs: IndexMap<u32, DigitalOutput>,
}

/// How an element drives its controller ports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ElementInput {
    /// One analog output port.
    Single { port: PortRef },
    /// An IQ pair routed through an up-conversion mixer.
    Mixed {
        i: PortRef,
        q: PortRef,
        lo_frequency: f64,
        mixer: Option<String>,
    },
}

/// Sticky mode: the element retains its last output value between
/// operations. `duration` is in nanoseconds and must divide by 4.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sticky {
    pub analog: bool,
    pub digital: bool,
    pub duration: u32,
}

/// A named logical control channel mapping to physical ports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub input: ElementInput,
    /// Stored with the sign exactly as the user supplied it.
    pub intermediate_frequency: Option<f64>,
    /// Operation name → pulse name.
    pub operations: IndexMap<String, String>,
    pub sticky: Option<Sticky>,
    pub time_of_flight: Option<u32>,
    pub smearing: Option<u32>,
    pub outputs: IndexMap<String, PortRef>,
}

impl Element {
    /// Whether the element reads anything back.
    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }
}

/// What a pulse is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Control,
    Measurement,
}

/// A named timed signal shape referenced by element operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pulse {
    pub operation: OperationKind,
    /// Length in nanoseconds.
    pub length: u32,
    /// Waveform slot (`single`, `I`, `Q`) → waveform name.
    pub waveforms: IndexMap<String, String>,
    /// Integration-weight label → weight-set name.
    pub integration_weights: IndexMap<String, String>,
    pub digital_marker: Option<String>,
}

/// Raw or constant output samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Waveform {
    Constant { sample: f64 },
    Arbitrary { samples: Vec<f64> },
}

/// One integration-weight entry: a value held for `length` nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightEntry {
    pub value: f64,
    pub length: u32,
}

/// Per-sample weighting used during demodulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationWeights {
    pub cosine: Vec<WeightEntry>,
    pub sine: Vec<WeightEntry>,
}

/// One calibration row of a mixer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixerCorrection {
    pub intermediate_frequency: f64,
    pub lo_frequency: f64,
    /// Row-major 2x2 correction matrix.
    pub correction: [f64; 4],
}

/// An up-conversion mixer with its per-frequency corrections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Mixer {
    pub corrections: Vec<MixerCorrection>,
}

///// One digital sample: a level held for a number of nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigitalSample {
    /// 0 or 1.
    pub level: u8,
    pub length: u32,
}

/// A digital marker waveform.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DigitalWaveform {
    pub samples: Vec<DigitalSample>,
}

/// Routing metadata for an up/down-conversion module. Calibration itself is
/// an external collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Octave {
    pub rf_outputs: IndexMap<u32, OctaveRfOutput>,
    /// Empty means no loopback; an explicitly empty raw list normalizes to
    /// the same value as an absent field.
    pub loopbacks: Vec<Loopback>,
}

/// LO metadata of one octave RF output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OctaveRfOutput {
    pub lo_frequency: f64,
    pub gain: f64,
}

/// One loopback route between an octave synthesizer port and a demodulator
/// LO input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loopback {
    pub source_octave: String,
    pub source_port: String,
    pub destination_port: String,
}

/// The complete normalized configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    pub controllers: IndexMap<String, Controller>,
    pub elements: IndexMap<String, Element>,
    pub pulses: IndexMap<String, Pulse>,
    pub waveforms: IndexMap<String, Waveform>,
    pub integration_weights: IndexMap<String, IntegrationWeights>,
    pub mixers: IndexMap<String, Mixer>,
    pub digital_waveforms: IndexMap<String, DigitalWaveform>,
    pub octaves: IndexMap<String, Octave>,
}
