//! Document parsing and validation
//!
//! `parse` is a pure function from document text to the validated
//! intermediate form; it performs no I/O and leaves no partial state behind
//! on failure.

use crate::core::node::DockerOption;
use crate::core::path;
use crate::doc::yml::{FlowYml, StepYml, SubflowYml};
use crate::error::DocumentError;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// Parse a flow document into its validated intermediate form.
pub fn parse(text: &str) -> Result<FlowYml, DocumentError> {
    let flow: FlowYml = serde_yaml::from_str(text)?;
    validate(&flow)?;

    debug!(
        name = flow.effective_name(),
        steps = flow.steps.len(),
        "parsed flow document"
    );
    Ok(flow)
}

/// Run the semantic checks over an intermediate form.
pub(crate) fn validate(flow: &FlowYml) -> Result<(), DocumentError> {
    let name = flow.effective_name();
    if !path::is_valid_name(name) {
        return Err(DocumentError::InvalidName(name.to_string()));
    }

    if let Some(trigger) = &flow.trigger {
        for pattern in trigger.branches.iter().chain(trigger.tags.iter()) {
            Regex::new(pattern).map_err(|source| DocumentError::InvalidTriggerPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
    }

    validate_dockers(name, &flow.docker, &flow.dockers)?;
    validate_steps(&flow.steps)
}

fn validate_steps(steps: &[StepYml]) -> Result<(), DocumentError> {
    let mut names: HashSet<String> = HashSet::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let name = step.effective_name(index + 1);
        if !path::is_valid_name(&name) {
            return Err(DocumentError::InvalidName(name));
        }
        if !names.insert(name.clone()) {
            return Err(DocumentError::DuplicateElement(name));
        }

        if let Some(parallel) = &step.parallel {
            if step.has_step_fields() {
                return Err(DocumentError::ParallelSectionOnly(name));
            }
            if parallel.is_empty() {
                return Err(DocumentError::EmptyParallel(name));
            }
            for (sub_name, sub) in parallel {
                if !path::is_valid_name(sub_name) {
                    return Err(DocumentError::InvalidName(sub_name.clone()));
                }
                validate_subflow(sub_name, sub)?;
            }
            continue;
        }

        if step.plugin.is_some() && !step.steps.is_empty() {
            return Err(DocumentError::PluginOnParent(name));
        }
        if step.tail && !step.steps.is_empty() {
            return Err(DocumentError::TailOnParent(name));
        }

        validate_dockers(&name, &step.docker, &step.dockers)?;
        validate_steps(&step.steps)?;
    }

    Ok(())
}

fn validate_subflow(name: &str, sub: &SubflowYml) -> Result<(), DocumentError> {
    validate_dockers(name, &sub.docker, &sub.dockers)?;
    validate_steps(&sub.steps)
}

fn validate_dockers(
    owner: &str,
    docker: &Option<DockerOption>,
    dockers: &[DockerOption],
) -> Result<(), DocumentError> {
    if docker.is_some() && !dockers.is_empty() {
        return Err(DocumentError::DuplicateDockerSection(owner.to_string()));
    }

    // a lone `docker` section is implicitly the runtime container
    if let Some(docker) = docker {
        if !docker.command.is_empty() {
            return Err(DocumentError::RuntimeWithCommand);
        }
        return Ok(());
    }

    if dockers.is_empty() {
        return Ok(());
    }

    let runtimes: Vec<&DockerOption> = dockers.iter().filter(|d| d.is_runtime).collect();
    match runtimes.as_slice() {
        [] => Err(DocumentError::MissingRuntimeFlag),
        [runtime] => {
            if !runtime.command.is_empty() {
                return Err(DocumentError::RuntimeWithCommand);
            }
            Ok(())
        }
        _ => Err(DocumentError::MultipleRuntimeFlags),
    }
}
