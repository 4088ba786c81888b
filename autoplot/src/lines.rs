use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

use crate::bins::{bin_index, make_bins, BinError};
use crate::catalogue::Series;
use crate::units::{Quantity, Unit, UnitError};

pub const DEFAULT_LINE_BIN_COUNT: usize = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Median,
    Mean,
}

impl LineKind {
    pub const ALL: [LineKind; 2] = [LineKind::Median, LineKind::Mean];

    pub fn key(&self) -> &'static str {
        match self {
            LineKind::Median => "median",
            LineKind::Mean => "mean",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LineKind::Median => "Median",
            LineKind::Mean => "Mean",
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A requested overlay. The payload is handed to the overlay computer as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct LineOverlaySpec {
    pub kind: LineKind,
    pub payload: Value,
}

/// `Some` whenever the entry carries the `kind` key, even with an empty value.
pub fn resolve_overlay(raw: &Value, kind: LineKind) -> Option<LineOverlaySpec> {
    raw.as_mapping()?
        .get(kind.key())
        .map(|payload| LineOverlaySpec {
            kind,
            payload: payload.clone(),
        })
}

/// Every overlay present on a plot entry, median first.
pub fn resolve_overlays(raw: &Value) -> Vec<LineOverlaySpec> {
    LineKind::ALL
        .iter()
        .filter_map(|kind| resolve_overlay(raw, *kind))
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScatterMode {
    None,
    #[serde(alias = "errorbars")]
    ErrorBar,
    #[default]
    Shaded,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QuantityConfig {
    pub value: f64,
    pub units: String,
}

impl QuantityConfig {
    fn to_quantity(&self) -> Result<Quantity, UnitError> {
        Ok(Quantity::new(self.value, Unit::parse(&self.units)?))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub plot: bool,
    pub log: bool,
    pub number_of_bins: usize,
    pub start: Option<QuantityConfig>,
    pub end: Option<QuantityConfig>,
    pub scatter: ScatterMode,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            plot: true,
            log: true,
            number_of_bins: DEFAULT_LINE_BIN_COUNT,
            start: None,
            end: None,
            scatter: ScatterMode::default(),
        }
    }
}

impl LineConfig {
    pub fn from_payload(payload: &Value) -> Result<Self, LineError> {
        if payload.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(payload.clone()).map_err(|e| LineError::Config(e.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("invalid line settings: {0}")]
    Config(String),
    #[error(transparent)]
    Bins(#[from] BinError),
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// A computed statistic curve, in the units of the series it was built from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverlayLine {
    pub kind: LineKind,
    pub scatter: ScatterMode,
    pub centers: Vec<f64>,
    pub values: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl OverlayLine {
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

pub trait OverlayComputer {
    /// `Ok(None)` means the overlay was requested but has nothing to draw.
    fn compute(
        &self,
        spec: &LineOverlaySpec,
        x: &Series,
        y: &Series,
    ) -> Result<Option<OverlayLine>, LineError>;
}

/// Bins `y` in `x` and reports the median (16th/84th percentile band) or the
/// mean (one standard deviation band) of every non-empty bin.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinnedLines;

impl OverlayComputer for BinnedLines {
    fn compute(
        &self,
        spec: &LineOverlaySpec,
        x: &Series,
        y: &Series,
    ) -> Result<Option<OverlayLine>, LineError> {
        let config = LineConfig::from_payload(&spec.payload)?;
        if !config.plot {
            return Ok(None);
        }

        let bound = |config: &Option<QuantityConfig>| -> Result<Option<f64>, LineError> {
            match config {
                Some(q) => Ok(Some(q.to_quantity()?.to(&x.unit)?.value)),
                None => Ok(None),
            }
        };
        let (data_lo, data_hi) = match data_range(x, config.log) {
            Some(range) => range,
            None => return Ok(None),
        };
        let lo = bound(&config.start)?.unwrap_or(data_lo);
        let hi = bound(&config.end)?.unwrap_or(data_hi);
        if lo >= hi {
            return Ok(None);
        }

        let bins = make_bins(
            Some(&Quantity::new(lo, x.unit.clone())),
            Some(&Quantity::new(hi, x.unit.clone())),
            config.number_of_bins,
            config.log,
        )?;

        let mut grouped: Vec<Vec<f64>> = vec![Vec::new(); bins.bin_count()];
        for (&xv, &yv) in x.values.iter().zip(y.values.iter()) {
            if !yv.is_finite() {
                continue;
            }
            if let Some(idx) = bin_index(xv, bins.edges()) {
                grouped[idx].push(yv);
            }
        }

        let mut line = OverlayLine {
            kind: spec.kind,
            scatter: config.scatter,
            centers: Vec::new(),
            values: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
        };
        for (center, mut values) in bins.centers().into_iter().zip(grouped) {
            if values.is_empty() {
                continue;
            }
            let (value, lower, upper) = match spec.kind {
                LineKind::Median => {
                    values.sort_by(f64::total_cmp);
                    (
                        percentile(&values, 50.0),
                        percentile(&values, 16.0),
                        percentile(&values, 84.0),
                    )
                }
                LineKind::Mean => {
                    let (mean, std) = mean_std(&values);
                    (mean, mean - std, mean + std)
                }
            };
            line.centers.push(center);
            line.values.push(value);
            line.lower.push(lower);
            line.upper.push(upper);
        }
        Ok(Some(line))
    }
}

fn data_range(x: &Series, log: bool) -> Option<(f64, f64)> {
    x.values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && (!log || *v > 0.0))
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let frac = rank - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * frac
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    fn series(values: Vec<f64>, unit: &str) -> Series {
        Series::new(values, Unit::parse(unit).unwrap())
    }

    #[test]
    fn test_absent_overlay_is_none() {
        let raw = yaml("type: scatter\nx: {quantity: a.b, units: kpc}");
        assert!(resolve_overlay(&raw, LineKind::Median).is_none());
        assert!(resolve_overlays(&raw).is_empty());
    }

    #[test]
    fn test_present_overlays_keep_payload() {
        let raw = yaml("median:\n  number_of_bins: 10\n  whatever: [1, 2]\nmean:");
        let overlays = resolve_overlays(&raw);
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].kind, LineKind::Median);
        assert_eq!(overlays[0].payload.get("whatever"), Some(&yaml("[1, 2]")));
        assert_eq!(overlays[1].kind, LineKind::Mean);
        assert!(overlays[1].payload.is_null());
    }

    #[test]
    fn test_line_config_defaults() {
        let config = LineConfig::from_payload(&Value::Null).unwrap();
        assert_eq!(config, LineConfig::default());
        assert_eq!(config.number_of_bins, 25);
        assert_eq!(config.scatter, ScatterMode::Shaded);

        let config = LineConfig::from_payload(&yaml("plot: false\nscatter: errorbar")).unwrap();
        assert!(!config.plot);
        assert!(config.log);
        assert_eq!(config.scatter, ScatterMode::ErrorBar);

        assert!(LineConfig::from_payload(&yaml("number_of_bins: many")).is_err());
    }

    #[test]
    fn test_median_line() {
        let spec = LineOverlaySpec {
            kind: LineKind::Median,
            payload: yaml("log: false\nnumber_of_bins: 2\nstart: {value: 0, units: kpc}\nend: {value: 2, units: kpc}"),
        };
        let x = series(vec![0.1, 0.2, 0.3, 1.5, 1.6, 5.0], "kpc");
        let y = series(vec![1.0, 2.0, 3.0, 10.0, 20.0, 99.0], "Msun");
        let line = BinnedLines.compute(&spec, &x, &y).unwrap().unwrap();
        assert_eq!(line.centers, vec![0.5, 1.5]);
        assert_eq!(line.values, vec![2.0, 15.0]);
        assert!((line.lower[0] - 1.32).abs() < 1e-12);
        assert!((line.upper[0] - 2.68).abs() < 1e-12);
    }

    #[test]
    fn test_mean_line_skips_empty_bins() {
        let spec = LineOverlaySpec {
            kind: LineKind::Mean,
            payload: yaml("log: false\nnumber_of_bins: 3"),
        };
        let x = series(vec![0.0, 0.0, 3.0], "kpc");
        let y = series(vec![1.0, 3.0, 7.0], "Msun");
        let line = BinnedLines.compute(&spec, &x, &y).unwrap().unwrap();
        assert_eq!(line.centers, vec![0.5, 2.5]);
        assert_eq!(line.values, vec![2.0, 7.0]);
        assert_eq!(line.lower, vec![1.0, 7.0]);
        assert_eq!(line.upper, vec![3.0, 7.0]);
    }

    #[test]
    fn test_line_start_is_converted_to_series_unit() {
        let spec = LineOverlaySpec {
            kind: LineKind::Mean,
            payload: yaml("log: false\nnumber_of_bins: 1\nstart: {value: 0.001, units: Mpc}"),
        };
        let x = series(vec![0.5, 2.0, 4.0], "kpc");
        let y = series(vec![100.0, 1.0, 3.0], "Msun");
        let line = BinnedLines.compute(&spec, &x, &y).unwrap().unwrap();
        assert_eq!(line.values, vec![2.0]);

        let bad = LineOverlaySpec {
            kind: LineKind::Mean,
            payload: yaml("start: {value: 1, units: Msun}"),
        };
        assert!(matches!(
            BinnedLines.compute(&bad, &x, &y),
            Err(LineError::Unit(UnitError::Incompatible { .. }))
        ));
    }

    #[test]
    fn test_disabled_or_empty_lines() {
        let x = series(vec![1.0, 2.0], "kpc");
        let y = series(vec![1.0, 2.0], "Msun");
        let disabled = LineOverlaySpec {
            kind: LineKind::Median,
            payload: yaml("plot: false"),
        };
        assert!(BinnedLines.compute(&disabled, &x, &y).unwrap().is_none());

        let empty = series(vec![], "kpc");
        let spec = LineOverlaySpec {
            kind: LineKind::Median,
            payload: Value::Null,
        };
        assert!(BinnedLines.compute(&spec, &empty, &empty).unwrap().is_none());
    }
}
