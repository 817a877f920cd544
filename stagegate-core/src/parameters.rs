//! Action parameter resolution
//!
//! A stage placement stores its parameter overrides as one serialized JSON
//! array. The effective parameters of the placed action are the definition
//! defaults with those overrides layered on top.

use crate::domain::action::Parameter;

/// Decodes the serialized override list of a placement
pub fn decode_overrides(blob: &str) -> Result<Vec<Parameter>, serde_json::Error> {
    serde_json::from_str(blob)
}

/// Layers `overrides` onto `defaults`.
///
/// Defaults keep their order; a default is replaced by the override of the
/// same name when there is one. Overrides naming no default follow, in their
/// original order.
pub fn merge_parameters(defaults: &[Parameter], overrides: Vec<Parameter>) -> Vec<Parameter> {
    let mut pending: Vec<Option<Parameter>> = overrides.into_iter().map(Some).collect();

    let mut merged: Vec<Parameter> = defaults
        .iter()
        .map(|default| {
            pending
                .iter_mut()
                .find(|o| o.as_ref().is_some_and(|o| o.name == default.name))
                .and_then(Option::take)
                .unwrap_or_else(|| default.clone())
        })
        .collect();

    merged.extend(pending.into_iter().flatten());
    merged
}
