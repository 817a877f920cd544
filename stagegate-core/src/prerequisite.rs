//! Prerequisite evaluation
//!
//! Decides whether a stage may run for a given build. Evaluation happens in
//! three steps:
//!
//! 1. Build parameters referencing each other through `{{.name}}`
//!    placeholders are resolved against a private copy of the build.
//! 2. Each prerequisite's expected value is expanded by an
//!    [`ExpectedValueExpander`] and anchored so it must match a whole value.
//! 3. Every build parameter named by a prerequisite must match its pattern.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::domain::action::Parameter;
use crate::domain::build::PipelineBuild;
use crate::domain::stage::Stage;

/// Default cap on placeholder substitution passes
pub const DEFAULT_PASS_LIMIT: usize = 64;

/// Errors raised while evaluating prerequisites
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Expected value is not a valid regular expression
    #[error("Invalid pattern '{pattern}' for parameter '{parameter}': {source}")]
    InvalidPattern {
        parameter: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Placeholders kept substituting past the pass limit or the size budget
    #[error("Build parameter placeholders did not converge within {passes} passes")]
    PlaceholdersDiverge { passes: usize },
}

/// Expands macros in a prerequisite's raw expected value for a build.
///
/// Implemented by the trigger service; any `Fn(&str, &PipelineBuild) -> String`
/// closure also implements it.
pub trait ExpectedValueExpander: Send + Sync {
    fn expand(&self, raw: &str, build: &PipelineBuild) -> String;
}

impl<F> ExpectedValueExpander for F
where
    F: Fn(&str, &PipelineBuild) -> String + Send + Sync,
{
    fn expand(&self, raw: &str, build: &PipelineBuild) -> String {
        self(raw, build)
    }
}

/// Expander returning expected values untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl ExpectedValueExpander for Verbatim {
    fn expand(&self, raw: &str, _build: &PipelineBuild) -> String {
        raw.to_string()
    }
}

/// Floor of the byte budget for resolved parameter values
pub const RESOLVED_BYTES_FLOOR: usize = 1 << 20;

/// Resolved values may grow to this multiple of the input before resolution
/// is abandoned
const RESOLVED_GROWTH_FACTOR: usize = 16;

/// Replaces `{{.name}}` placeholders in parameter values with the value of
/// the parameter called `name`, pass after pass, until a pass changes
/// nothing.
///
/// A parameter never substitutes into itself, so `{{.a}}` inside `a` is left
/// as written. Mutually referencing parameters that keep growing are stopped
/// with [`EvaluationError::PlaceholdersDiverge`] after `max_passes`, or as
/// soon as a substitution would push the total size of all values past the
/// byte budget (the larger of [`RESOLVED_BYTES_FLOOR`] and a fixed multiple
/// of the input size).
pub fn resolve_placeholders(
    parameters: &mut [Parameter],
    max_passes: usize,
) -> Result<(), EvaluationError> {
    let mut total: usize = parameters.iter().map(|p| p.value.len()).sum();
    let budget = total
        .saturating_mul(RESOLVED_GROWTH_FACTOR)
        .max(RESOLVED_BYTES_FLOOR);

    for pass in 1..=max_passes {
        let mut replaced = false;

        for source in 0..parameters.len() {
            let placeholder = format!("{{{{.{}}}}}", parameters[source].name);
            let value = parameters[source].value.clone();

            for (target, param) in parameters.iter_mut().enumerate() {
                if target == source {
                    continue;
                }
                let occurrences = param.value.matches(&placeholder).count();
                if occurrences == 0 || value == placeholder {
                    continue;
                }

                // Checked before replacing so the oversized value is never built
                let resolved_len = (param.value.len() - occurrences * placeholder.len())
                    .saturating_add(occurrences.saturating_mul(value.len()));
                total = total - param.value.len() + resolved_len.min(budget.saturating_add(1));
                if resolved_len > budget || total > budget {
                    tracing::warn!(
                        parameter = %param.name,
                        pass,
                        budget,
                        "Build parameter placeholders exceed the size budget"
                    );
                    return Err(EvaluationError::PlaceholdersDiverge { passes: pass });
                }

                param.value = param.value.replace(&placeholder, &value);
                replaced = true;
            }
        }

        if !replaced {
            return Ok(());
        }
    }

    Err(EvaluationError::PlaceholdersDiverge { passes: max_passes })
}

/// Anchors `pattern` at both ends unless the caller already did
pub fn anchor(pattern: &str) -> String {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    if !pattern.starts_with('^') {
        anchored.push('^');
    }
    anchored.push_str(pattern);
    if !pattern.ends_with('$') {
        anchored.push('$');
    }
    anchored
}

/// Prerequisite evaluator with its expansion collaborator
#[derive(Clone)]
pub struct Evaluator {
    expander: Arc<dyn ExpectedValueExpander>,
    max_passes: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Verbatim)
    }
}

impl Evaluator {
    pub fn new(expander: impl ExpectedValueExpander + 'static) -> Self {
        Self::with_shared(Arc::new(expander))
    }

    pub fn with_shared(expander: Arc<dyn ExpectedValueExpander>) -> Self {
        Self {
            expander,
            max_passes: DEFAULT_PASS_LIMIT,
        }
    }

    pub fn with_pass_limit(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Whether every prerequisite of `stage` is satisfied by `build`.
    ///
    /// A stage without prerequisites is always eligible. Prerequisites naming
    /// a parameter the build does not carry are ignored.
    pub fn is_eligible(
        &self,
        stage: &Stage,
        build: &PipelineBuild,
    ) -> Result<bool, EvaluationError> {
        if stage.prerequisites.is_empty() {
            return Ok(true);
        }

        let mut resolved = build.clone();
        resolve_placeholders(&mut resolved.parameters, self.max_passes)?;

        for prerequisite in &stage.prerequisites {
            let values: Vec<&str> = resolved
                .parameters
                .iter()
                .filter(|p| p.name == prerequisite.parameter)
                .map(|p| p.value.as_str())
                .collect();
            if values.is_empty() {
                continue;
            }

            let expected = self.expander.expand(&prerequisite.expected_value, &resolved);
            let pattern = anchor(&expected);
            let regex = Regex::new(&pattern).map_err(|source| {
                tracing::warn!(
                    stage_id = stage.id,
                    parameter = %prerequisite.parameter,
                    "Cannot compile prerequisite pattern '{}': {}",
                    prerequisite.expected_value,
                    source
                );
                EvaluationError::InvalidPattern {
                    parameter: prerequisite.parameter.clone(),
                    pattern,
                    source,
                }
            })?;

            if let Some(value) = values.into_iter().find(|v| !regex.is_match(v)) {
                tracing::debug!(
                    stage_id = stage.id,
                    parameter = %prerequisite.parameter,
                    "Expected '{}', got '{}'",
                    prerequisite.expected_value,
                    value
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Evaluates `stage` against `build` with verbatim expected values
pub fn is_eligible(stage: &Stage, build: &PipelineBuild) -> Result<bool, EvaluationError> {
    Evaluator::default().is_eligible(stage, build)
}
