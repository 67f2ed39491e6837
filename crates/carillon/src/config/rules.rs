//! The constraint-schema validation strategy.
//!
//! Field-by-field rule evaluation over the normalized model. The wire
//! strategy enforces the same bounds independently; the conformance corpus
//! in the integration tests keeps the two in agreement.

use carillon_core::config::{Config, Waveform};

use super::Problem;

/// Largest DC offset, in volts, an analog port accepts.
const MAX_ANALOG_OFFSET: f64 = 0.5;

pub(crate) fn check(config: &Config) -> Vec<Problem> {
    let mut problems = Vec::new();

    for (name, controller) in &config.controllers {
        for (port, output) in &controller.analog_outputs {
            if !(output.offset.is_finite() && output.offset.abs() <= MAX_ANALOG_OFFSET) {
                problems.push(Problem::new(
                    format!("controllers.{name}.analog_outputs.{port}.offset"),
                    "DC offset must be within ±0.5 V",
                ));
            }
        }
        for (port, input) in &controller.analog_inputs {
            if !(input.offset.is_finite() && input.offset.abs() <= MAX_ANALOG_OFFSET) {
                problems.push(Problem::new(
                    format!("controllers.{name}.analog_inputs.{port}.offset"),
                    "DC offset must be within ±0.5 V",
                ));
            }
        }
    }

    for (name, element) in &config.elements {
        if let Some(sticky) = &element.sticky {
            if sticky.duration == 0 || sticky.duration % 4 != 0 {
                problems.push(Problem::new(
                    format!("elements.{name}.sticky.duration"),
                    "sticky duration must be a positive multiple of 4",
                ));
            }
        }
    }

    for (name, pulse) in &config.pulses {
        if pulse.length == 0 {
            problems.push(Problem::new(
                format!("pulses.{name}.length"),
                "pulse length must be positive",
            ));
        }
    }

    for (name, waveform) in &config.waveforms {
        if let Waveform::Arbitrary { samples } = waveform {
            if samples.is_empty() {
                problems.push(Problem::new(
                    format!("waveforms.{name}.samples"),
                    "arbitrary waveform needs at least one sample",
                ));
            }
        }
    }

    for (name, mixer) in &config.mixers {
        for (index, correction) in mixer.corrections.iter().enumerate() {
            if correction.correction.iter().any(|entry| !entry.is_finite()) {
                problems.push(Problem::new(
                    format!("mixers.{name}[{index}].correction"),
                    "correction matrix entries must be finite",
                ));
            }
        }
    }

    for (name, waveform) in &config.digital_waveforms {
        for (index, sample) in waveform.samples.iter().enumerate() {
            if sample.level > 1 {
                problems.push(Problem::new(
                    format!("digital_waveforms.{name}.samples[{index}]"),
                    "digital sample level must be 0 or 1",
                ));
            }
        }
    }

    problems
}
