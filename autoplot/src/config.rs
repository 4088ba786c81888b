use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, info};

use crate::plot::PlotDescriptor;
use crate::AutoplotError;

/// Everything a parse produced: the good descriptors in declaration order and
/// one error per rejected entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParseOutcome {
    pub plots: Vec<PlotDescriptor>,
    pub errors: Vec<AutoplotError>,
    /// Every declared plot name, rejected entries included.
    pub names: Vec<String>,
}

impl ParseOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: ParseOutcome) {
        self.plots.extend(other.plots);
        self.errors.extend(other.errors);
        self.names.extend(other.names);
    }

    /// Fail if any entry was rejected, listing every rejection.
    pub fn into_result(self) -> Result<Vec<PlotDescriptor>, AutoplotError> {
        if self.errors.is_empty() {
            Ok(self.plots)
        } else {
            Err(AutoplotError::InvalidConfiguration(self.errors))
        }
    }
}

/// Resolve every entry of a `name -> settings` mapping. One bad entry never
/// stops the others from being resolved.
pub fn parse_plots(config: &Value) -> Result<ParseOutcome, AutoplotError> {
    let mapping = match config {
        Value::Null => return Ok(ParseOutcome::default()),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(AutoplotError::Config(
                "expected a mapping of plot names to plot settings".to_string(),
            ))
        }
    };

    let mut outcome = ParseOutcome::default();
    for (key, raw) in mapping {
        let name = match key {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                outcome.errors.push(AutoplotError::Config(format!(
                    "plot names must be strings, found {other:?}"
                )));
                continue;
            }
        };
        outcome.names.push(name.clone());
        match PlotDescriptor::from_config(&name, raw) {
            Ok(plot) => outcome.plots.push(plot),
            Err(e) => {
                debug!(plot = %name, error = %e, "rejected plot entry");
                outcome.errors.push(e);
            }
        }
    }
    Ok(outcome)
}

pub fn parse_yaml(text: &str) -> Result<ParseOutcome, AutoplotError> {
    let config: Value =
        serde_yaml::from_str(text).map_err(|e| AutoplotError::Config(e.to_string()))?;
    parse_plots(&config)
}

/// Parse several configuration files in order. A plot name may only be
/// declared once across all of them.
pub fn load_config_files<P: AsRef<Path>>(paths: &[P]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut seen = HashSet::new();
    for path in paths {
        let path = path.as_ref();
        let parsed = fs::read_to_string(path)
            .map_err(|e| AutoplotError::Config(format!("failed to read {}: {}", path.display(), e)))
            .and_then(|text| {
                parse_yaml(&text).map_err(|e| match e {
                    AutoplotError::Config(reason) => {
                        AutoplotError::Config(format!("{}: {}", path.display(), reason))
                    }
                    other => other,
                })
            });
        let mut parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                outcome.errors.push(e);
                continue;
            }
        };

        let mut duplicates = HashSet::new();
        for name in &parsed.names {
            if !seen.insert(name.clone()) {
                outcome
                    .errors
                    .push(AutoplotError::DuplicatePlotName(name.clone()));
                duplicates.insert(name.clone());
            }
        }
        parsed.plots.retain(|plot| !duplicates.contains(plot.name()));
        info!(path = %path.display(), entries = parsed.names.len(), "parsed plot configuration");
        outcome.merge(parsed);
    }
    outcome
}
