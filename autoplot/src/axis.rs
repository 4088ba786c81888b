use std::fmt;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::coerce;
use crate::units::{Quantity, Unit};
use crate::AutoplotError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Coordinate {
    X,
    Y,
}

impl Coordinate {
    pub fn key(&self) -> &'static str {
        match self {
            Coordinate::X => "x",
            Coordinate::Y => "y",
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One resolved axis of a plot.
///
/// `limit_lower`/`limit_upper` are expressed in `unit`. A missing bound means
/// the renderer picks one from the data.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisSpec {
    pub quantity_path: Option<Vec<String>>,
    pub unit: Unit,
    pub log_scale: bool,
    pub limit_lower: Option<Quantity>,
    pub limit_upper: Option<Quantity>,
    pub label_override: Option<String>,
}

impl AxisSpec {
    pub fn quantity_name(&self) -> Option<String> {
        self.quantity_path.as_ref().map(|path| path.join("."))
    }

    /// The normalised configuration form of this axis, with every default
    /// written out. Resolving it again yields an identical `AxisSpec`.
    pub fn to_config(&self) -> Value {
        let mut map = Mapping::new();
        if let Some(name) = self.quantity_name() {
            map.insert("quantity".into(), Value::String(name));
        }
        map.insert("units".into(), Value::String(self.unit.to_string()));
        map.insert("log".into(), Value::Bool(self.log_scale));
        if let Some(lower) = &self.limit_lower {
            map.insert("start".into(), Value::from(lower.value));
        }
        if let Some(upper) = &self.limit_upper {
            map.insert("end".into(), Value::from(upper.value));
        }
        if let Some(label) = &self.label_override {
            map.insert("label_override".into(), Value::String(label.clone()));
        }
        Value::Mapping(map)
    }
}

/// Resolve the `x` or `y` sub-mapping of a plot entry.
///
/// A required axis must name a `quantity` and its `units`. An axis that is not
/// required (the y axis of a mass function) carries no quantity and is
/// dimensionless, but still honours `log`, `start`, `end` and `label_override`.
pub fn resolve_axis(
    plot: &str,
    raw: Option<&Value>,
    coordinate: Coordinate,
    required: bool,
) -> Result<AxisSpec, AutoplotError> {
    let empty = Value::Mapping(Mapping::new());
    let raw = match raw {
        Some(value) if value.is_mapping() => value,
        Some(value) if !value.is_null() => {
            return Err(coerce::invalid(
                plot,
                coordinate.key(),
                "expected a mapping of axis settings",
            ))
        }
        _ => &empty,
    };
    let key = |field: &str| format!("{coordinate}.{field}");

    let (quantity_path, unit) = if required {
        let quantity = coerce::lookup(raw, "quantity").ok_or_else(|| {
            AutoplotError::MissingAxisQuantity {
                plot: plot.to_string(),
                coordinate,
            }
        })?;
        let path = coerce::path(plot, &key("quantity"), quantity)?;
        let units = coerce::lookup(raw, "units").ok_or_else(|| AutoplotError::MissingAxisUnits {
            plot: plot.to_string(),
            coordinate,
        })?;
        let units = coerce::string(plot, &key("units"), units)?;
        let unit = Unit::parse(&units).map_err(|e| coerce::invalid(plot, &key("units"), e.to_string()))?;
        (Some(path), unit)
    } else {
        (None, Unit::dimensionless())
    };

    let log_scale = match coerce::lookup(raw, "log") {
        Some(value) => coerce::boolean(plot, &key("log"), value)?,
        None => true,
    };

    let limit = |field: &str| -> Result<Option<Quantity>, AutoplotError> {
        coerce::lookup(raw, field)
            .map(|value| coerce::float(plot, &key(field), value))
            .transpose()
            .map(|value| value.map(|v| Quantity::new(v, unit.clone())))
    };
    let limit_lower = limit("start")?;
    let limit_upper = limit("end")?;
    if let (Some(lower), Some(upper)) = (&limit_lower, &limit_upper) {
        if lower.value >= upper.value {
            return Err(AutoplotError::InvertedLimits {
                plot: plot.to_string(),
                coordinate,
                lower: lower.value,
                upper: upper.value,
            });
        }
    }

    let label_override = coerce::lookup(raw, "label_override")
        .map(|value| coerce::string(plot, &key("label_override"), value))
        .transpose()?;

    Ok(AxisSpec {
        quantity_path,
        unit,
        log_scale,
        limit_lower,
        limit_upper,
        label_override,
    })
}
