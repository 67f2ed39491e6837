//! Validation entry point and the shared semantic pass.
//!
//! Two strategies check field bounds: [`Strategy::Rules`] evaluates them
//! directly, [`Strategy::Wire`] routes the model through the binary schema.
//! Cross-reference integrity and required-together fields are checked here,
//! once, by both. The strategies must agree on accept/reject for any input;
//! the corpus in the integration tests enforces that.

use carillon_core::config::{Config, Element, ElementInput, OperationKind, PortRef};

use super::{ConfigError, ConfigSemanticError, Problem, rules, wire};

/// Which field-rule checker runs.
///
/// `Wire` carries a larger fixed per-call cost and scales better on large
/// configurations; `Rules` trades the opposite way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Rules,
    Wire,
}

/// Validate a normalized configuration.
///
/// The configuration itself is never mutated; both strategies accept and
/// reject the same inputs.
pub fn validate(config: &Config, strategy: Strategy) -> Result<(), ConfigError> {
    let mut violations = match strategy {
        Strategy::Rules => rules::check(config),
        Strategy::Wire => wire::check(config)?,
    };
    violations.extend(cross_references(config));
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigSemanticError::new(violations).into())
    }
}

/// Referential-integrity and required-together checks shared by both
/// strategies. The binary schema enforces shape, not references, so this
/// pass always runs explicitly.
fn cross_references(config: &Config) -> Vec<Problem> {
    let mut problems = Vec::new();

    for (name, element) in &config.elements {
        let path = format!("elements.{name}");
        check_element_ports(config, name, element, &mut problems);

        for (operation, pulse) in &element.operations {
            if !config.pulses.contains_key(pulse) {
                problems.push(Problem::new(
                    format!("{path}.operations.{operation}"),
                    format!("references undefined pulse `{pulse}`"),
                ));
            }
        }

        if let ElementInput::Mixed {
            mixer: Some(mixer), ..
        } = &element.input
        {
            if !config.mixers.contains_key(mixer) {
                problems.push(Problem::new(
                    format!("{path}.mixInputs.mixer"),
                    format!("references undefined mixer `{mixer}`"),
                ));
            }
        }

        // outputs requires both readout timings; without outputs neither
        // may appear.
        if element.has_outputs() {
            if element.time_of_flight.is_none() {
                problems.push(Problem::new(
                    format!("{path}.time_of_flight"),
                    "required when outputs is set",
                ));
            }
            if element.smearing.is_none() {
                problems.push(Problem::new(
                    format!("{path}.smearing"),
                    "required when outputs is set",
                ));
            }
        } else {
            if element.time_of_flight.is_some() {
                problems.push(Problem::new(
                    format!("{path}.time_of_flight"),
                    "only allowed when outputs is set",
                ));
            }
            if element.smearing.is_some() {
                problems.push(Problem::new(
                    format!("{path}.smearing"),
                    "only allowed when outputs is set",
                ));
            }
        }
    }

    for (name, pulse) in &config.pulses {
        let path = format!("pulses.{name}");
        for (slot, waveform) in &pulse.waveforms {
            if !config.waveforms.contains_key(waveform) {
                problems.push(Problem::new(
                    format!("{path}.waveforms.{slot}"),
                    format!("references undefined waveform `{waveform}`"),
                ));
            }
        }
        for (label, weights) in &pulse.integration_weights {
            if !config.integration_weights.contains_key(weights) {
                problems.push(Problem::new(
                    format!("{path}.integration_weights.{label}"),
                    format!("references undefined integration weights `{weights}`"),
                ));
            }
        }
        if let Some(marker) = &pulse.digital_marker {
            if !config.digital_waveforms.contains_key(marker) {
                problems.push(Problem::new(
                    format!("{path}.digital_marker"),
                    format!("references undefined digital waveform `{marker}`"),
                ));
            }
        }
        if pulse.operation == OperationKind::Control && !pulse.integration_weights.is_empty() {
            problems.push(Problem::new(
                format!("{path}.integration_weights"),
                "only measurement pulses carry integration weights",
            ));
        }
    }

    problems
}

fn check_element_ports(
    config: &Config,
    name: &str,
    element: &Element,
    problems: &mut Vec<Problem>,
) {
    let path = format!("elements.{name}");
    match &element.input {
        ElementInput::Single { port } => {
            check_analog_output(config, port, &format!("{path}.singleInput.port"), problems);
        }
        ElementInput::Mixed { i, q, .. } => {
            check_analog_output(config, i, &format!("{path}.mixInputs.I"), problems);
            check_analog_output(config, q, &format!("{path}.mixInputs.Q"), problems);
        }
    }
    for (output, port) in &element.outputs {
        let out_path = format!("{path}.outputs.{output}");
        match config.controllers.get(&port.controller) {
            Some(controller) if controller.analog_inputs.contains_key(&port.port) => {}
            Some(_) => problems.push(Problem::new(
                out_path,
                format!(
                    "controller `{}` has no analog input {}",
                    port.controller, port.port
                ),
            )),
            None => problems.push(Problem::new(
                out_path,
                format!("references undefined controller `{}`", port.controller),
            )),
        }
    }
}

fn check_analog_output(
    config: &Config,
    port: &PortRef,
    path: &str,
    problems: &mut Vec<Problem>,
) {
    match config.controllers.get(&port.controller) {
        Some(controller) if controller.analog_outputs.contains_key(&port.port) => {}
        Some(_) => problems.push(Problem::new(
            path,
            format!(
                "controller `{}` has no analog output {}",
                port.controller, port.port
            ),
        )),
        None => problems.push(Problem::new(
            path,
            format!("references undefined controller `{}`", port.controller),
        )),
    }
}
