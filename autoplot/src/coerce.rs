// Loose YAML value coercions shared by the axis, bin and plot-type resolvers.

use serde_yaml::Value;

use crate::AutoplotError;

pub(crate) fn invalid(plot: &str, key: &str, reason: impl Into<String>) -> AutoplotError {
    AutoplotError::InvalidField {
        plot: plot.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Fetch `key` from a mapping, treating an explicit YAML `null` as absent.
pub(crate) fn lookup<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|value| !value.is_null())
}

pub(crate) fn string(plot: &str, key: &str, value: &Value) -> Result<String, AutoplotError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(invalid(plot, key, "expected a string")),
    }
}

pub(crate) fn float(plot: &str, key: &str, value: &Value) -> Result<f64, AutoplotError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(plot, key, "expected a finite number")),
    }
}

pub(crate) fn boolean(plot: &str, key: &str, value: &Value) -> Result<bool, AutoplotError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            other => Err(invalid(plot, key, format!("`{other}` is not a boolean"))),
        },
        _ => Err(invalid(plot, key, "expected a boolean")),
    }
}

/// A strictly positive integer; integral floats and numeric strings are accepted.
pub(crate) fn count(plot: &str, key: &str, value: &Value) -> Result<usize, AutoplotError> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(v) if v >= 1.0 && v.fract() == 0.0 && v <= usize::MAX as f64 => Ok(v as usize),
        _ => Err(invalid(plot, key, "expected a positive integer")),
    }
}

/// A dotted accessor path (`masses.mass_200crit`) or an explicit list of segments.
pub(crate) fn path(plot: &str, key: &str, value: &Value) -> Result<Vec<String>, AutoplotError> {
    let segments: Vec<String> = match value {
        Value::String(s) => s.split('.').map(|seg| seg.trim().to_string()).collect(),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                let segment = string(plot, key, item)?;
                if segment.contains('.') {
                    return Err(invalid(
                        plot,
                        key,
                        format!("list segment `{segment}` must not contain `.`"),
                    ));
                }
                Ok(segment.trim().to_string())
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(invalid(plot, key, "expected a dotted quantity path")),
    };
    if segments.is_empty() || segments.iter().any(|seg| seg.is_empty()) {
        return Err(invalid(plot, key, "quantity path has an empty segment"));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_boolean_coercion() {
        assert!(boolean("p", "x.log", &yaml("true")).unwrap());
        assert!(!boolean("p", "x.log", &yaml("0")).unwrap());
        assert!(!boolean("p", "x.log", &yaml("'off'")).unwrap());
        assert!(boolean("p", "x.log", &yaml("'maybe'")).is_err());
    }

    #[test]
    fn test_float_accepts_numeric_strings() {
        assert_eq!(float("p", "x.start", &yaml("'1e10'")).unwrap(), 1e10);
        assert_eq!(float("p", "x.start", &yaml("3")).unwrap(), 3.0);
        assert!(float("p", "x.start", &yaml("'ten'")).is_err());
        assert!(float("p", "x.start", &yaml(".inf")).is_err());
    }

    #[test]
    fn test_count_rejects_zero_and_fractions() {
        assert_eq!(count("p", "number_of_bins", &yaml("64")).unwrap(), 64);
        assert_eq!(count("p", "number_of_bins", &yaml("32.0")).unwrap(), 32);
        assert!(count("p", "number_of_bins", &yaml("0")).is_err());
        assert!(count("p", "number_of_bins", &yaml("2.5")).is_err());
        assert!(count("p", "number_of_bins", &yaml("-4")).is_err());
    }

    #[test]
    fn test_path_forms() {
        assert_eq!(
            path("p", "x.quantity", &yaml("masses.mass_200crit")).unwrap(),
            vec!["masses", "mass_200crit"]
        );
        assert_eq!(
            path("p", "x.quantity", &yaml("[masses, mass_200crit]")).unwrap(),
            vec!["masses", "mass_200crit"]
        );
        let err = path("p", "x.quantity", &yaml("masses..m200")).unwrap_err();
        assert!(err.to_string().contains("x.quantity"));
        let err = path("p", "x.quantity", &yaml("[masses.m200, crit]")).unwrap_err();
        assert!(err.to_string().contains("masses.m200"));
    }
}
