use std::fmt;

use serde::Serialize;
use serde_yaml::Value;
use tracing::debug;

use crate::axis::{resolve_axis, AxisSpec, Coordinate};
use crate::bins::{make_bins, BinError, BinSpec, DEFAULT_BIN_COUNT};
use crate::coerce;
use crate::lines::{resolve_overlays, LineOverlaySpec};
use crate::AutoplotError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotType {
    Scatter,
    Histogram2d,
    MassFunction,
}

/// Every spelling accepted for the `type` key.
pub const VALID_PLOT_TYPES: [&str; 5] = [
    "scatter",
    "histogram2d",
    "2dhistogram",
    "massfunction",
    "histogram",
];

impl PlotType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "scatter" => Some(PlotType::Scatter),
            "histogram2d" | "2dhistogram" => Some(PlotType::Histogram2d),
            "massfunction" | "histogram" => Some(PlotType::MassFunction),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlotType::Scatter => "scatter",
            PlotType::Histogram2d => "histogram2d",
            PlotType::MassFunction => "massfunction",
        }
    }

    fn layout(&self) -> Layout {
        match self {
            PlotType::Scatter => Layout {
                y_required: true,
                overlays: true,
                binned: &[],
            },
            PlotType::Histogram2d => Layout {
                y_required: true,
                overlays: true,
                binned: &[Coordinate::X, Coordinate::Y],
            },
            PlotType::MassFunction => Layout {
                y_required: false,
                overlays: false,
                binned: &[Coordinate::X],
            },
        }
    }
}

impl fmt::Display for PlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// What each plot type resolves on top of the shared x-axis resolution.
struct Layout {
    y_required: bool,
    overlays: bool,
    binned: &'static [Coordinate],
}

/// A fully resolved, immutable plot request.
#[derive(Clone, Debug, PartialEq)]
pub struct PlotDescriptor {
    name: String,
    plot_type: PlotType,
    x: AxisSpec,
    y: AxisSpec,
    bin_count: Option<usize>,
    x_bins: Option<BinSpec>,
    y_bins: Option<BinSpec>,
    overlays: Vec<LineOverlaySpec>,
}

impl PlotDescriptor {
    /// Build a descriptor from one named configuration entry.
    pub fn from_config(name: &str, raw: &Value) -> Result<Self, AutoplotError> {
        if !raw.is_mapping() {
            return Err(coerce::invalid(name, "entry", "expected a mapping of plot settings"));
        }

        let plot_type = match coerce::lookup(raw, "type") {
            None => PlotType::Scatter,
            Some(value) => {
                let found = coerce::string(name, "type", value)?;
                PlotType::from_name(&found).ok_or(AutoplotError::UnknownPlotType {
                    plot: name.to_string(),
                    found,
                })?
            }
        };
        let layout = plot_type.layout();

        let x = resolve_axis(name, raw.get("x"), Coordinate::X, true)?;
        let y = resolve_axis(name, raw.get("y"), Coordinate::Y, layout.y_required)?;

        let bin_count = if layout.binned.is_empty() {
            None
        } else {
            Some(match coerce::lookup(raw, "number_of_bins") {
                Some(value) => coerce::count(name, "number_of_bins", value)?,
                None => DEFAULT_BIN_COUNT,
            })
        };

        let mut x_bins = None;
        let mut y_bins = None;
        if let Some(count) = bin_count {
            for &coordinate in layout.binned {
                let axis = match coordinate {
                    Coordinate::X => &x,
                    Coordinate::Y => &y,
                };
                let bins = axis_bins(name, coordinate, axis, count)?;
                match coordinate {
                    Coordinate::X => x_bins = Some(bins),
                    Coordinate::Y => y_bins = Some(bins),
                }
            }
        }

        let overlays = if layout.overlays {
            resolve_overlays(raw)
        } else {
            Vec::new()
        };

        debug!(
            plot = name,
            plot_type = %plot_type,
            bins = ?bin_count,
            overlays = overlays.len(),
            "resolved plot descriptor"
        );

        Ok(Self {
            name: name.to_string(),
            plot_type,
            x,
            y,
            bin_count,
            x_bins,
            y_bins,
            overlays,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plot_type(&self) -> PlotType {
        self.plot_type
    }

    pub fn x(&self) -> &AxisSpec {
        &self.x
    }

    pub fn y(&self) -> &AxisSpec {
        &self.y
    }

    pub fn axis(&self, coordinate: Coordinate) -> &AxisSpec {
        match coordinate {
            Coordinate::X => &self.x,
            Coordinate::Y => &self.y,
        }
    }

    pub fn bin_count(&self) -> Option<usize> {
        self.bin_count
    }

    pub fn x_bins(&self) -> Option<&BinSpec> {
        self.x_bins.as_ref()
    }

    pub fn y_bins(&self) -> Option<&BinSpec> {
        self.y_bins.as_ref()
    }

    pub fn overlays(&self) -> &[LineOverlaySpec] {
        &self.overlays
    }
}

fn axis_bins(
    plot: &str,
    coordinate: Coordinate,
    axis: &AxisSpec,
    count: usize,
) -> Result<BinSpec, AutoplotError> {
    make_bins(
        axis.limit_lower.as_ref(),
        axis.limit_upper.as_ref(),
        count,
        axis.log_scale,
    )
    .map_err(|e| match e {
        BinError::IncompleteRange => AutoplotError::IncompleteBinRange {
            plot: plot.to_string(),
            coordinate,
        },
        BinError::NonPositiveLogBound { lower } => AutoplotError::NonPositiveLogBound {
            plot: plot.to_string(),
            coordinate,
            lower,
        },
        BinError::EmptyRange { lower, upper } => AutoplotError::InvertedLimits {
            plot: plot.to_string(),
            coordinate,
            lower,
            upper,
        },
        BinError::ZeroCount => {
            coerce::invalid(plot, "number_of_bins", "at least one bin is required")
        }
        BinError::Unit(source) => AutoplotError::UnitConversion {
            plot: plot.to_string(),
            key: format!("{coordinate}.end"),
            source,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::LineKind;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    const MASS_AXIS: &str = "x:\n  quantity: masses.mass_200crit\n  units: Solar_Mass\n  start: 1e10\n  end: 1e15\n";

    #[test]
    fn test_default_type_is_scatter() {
        let raw = yaml(
            "x: {quantity: masses.mass_200crit, units: Solar_Mass}\ny: {quantity: apertures.mass_star_30_kpc, units: Solar_Mass}",
        );
        let plot = PlotDescriptor::from_config("smhm", &raw).unwrap();
        assert_eq!(plot.plot_type(), PlotType::Scatter);
        assert!(plot.x_bins().is_none());
        assert!(plot.y_bins().is_none());
        assert!(plot.bin_count().is_none());
        assert!(plot.overlays().is_empty());
    }

    #[test]
    fn test_unknown_type() {
        let raw = yaml("type: violin\nx: {quantity: a.b, units: kpc}");
        let err = PlotDescriptor::from_config("odd", &raw).unwrap_err();
        assert_eq!(
            err,
            AutoplotError::UnknownPlotType {
                plot: "odd".to_string(),
                found: "violin".to_string()
            }
        );
        assert!(err.to_string().contains("massfunction"));
    }

    #[test]
    fn test_histogram2d_builds_both_bins() {
        let raw = yaml(
            "type: 2dhistogram\nnumber_of_bins: 4\nx: {quantity: a.b, units: kpc, start: 1, end: 100}\ny: {quantity: c.d, units: km/s, log: false, start: 0, end: 8}",
        );
        let plot = PlotDescriptor::from_config("hist", &raw).unwrap();
        assert_eq!(plot.plot_type(), PlotType::Histogram2d);
        assert_eq!(plot.x_bins().unwrap().edges().len(), 5);
        assert_eq!(plot.y_bins().unwrap().edges(), &[0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_histogram2d_needs_both_bounds() {
        let raw = yaml(
            "type: histogram2d\nx: {quantity: a.b, units: kpc, start: 1, end: 100}\ny: {quantity: c.d, units: km/s, start: 1}",
        );
        let err = PlotDescriptor::from_config("hist", &raw).unwrap_err();
        assert_eq!(
            err,
            AutoplotError::IncompleteBinRange {
                plot: "hist".to_string(),
                coordinate: Coordinate::Y
            }
        );
    }

    #[test]
    fn test_massfunction_defaults() {
        let raw = yaml(&format!("type: massfunction\n{MASS_AXIS}"));
        let plot = PlotDescriptor::from_config("hmf", &raw).unwrap();
        assert_eq!(plot.bin_count(), Some(128));
        assert_eq!(plot.x_bins().unwrap().bin_count(), 128);
        assert!(plot.y_bins().is_none());
        assert!(plot.y().quantity_path.is_none());
        assert!(plot.y().unit.is_dimensionless());
    }

    #[test]
    fn test_histogram_alias_matches_massfunction() {
        let mass = PlotDescriptor::from_config(
            "a",
            &yaml(&format!("type: massfunction\nnumber_of_bins: 16\n{MASS_AXIS}")),
        )
        .unwrap();
        let hist = PlotDescriptor::from_config(
            "a",
            &yaml(&format!("type: histogram\nnumber_of_bins: 16\n{MASS_AXIS}")),
        )
        .unwrap();
        assert_eq!(mass.x(), hist.x());
        assert_eq!(mass.x_bins(), hist.x_bins());
        assert_eq!(mass, hist);
    }

    #[test]
    fn test_massfunction_log_bound_must_be_positive() {
        let raw = yaml("type: massfunction\nx: {quantity: a.b, units: Solar_Mass, start: 0, end: 1e15}");
        let err = PlotDescriptor::from_config("hmf", &raw).unwrap_err();
        assert!(matches!(
            err,
            AutoplotError::NonPositiveLogBound {
                coordinate: Coordinate::X,
                ..
            }
        ));
    }

    #[test]
    fn test_massfunction_ignores_overlays() {
        let raw = yaml(&format!("type: massfunction\nmedian: {{}}\n{MASS_AXIS}"));
        let plot = PlotDescriptor::from_config("hmf", &raw).unwrap();
        assert!(plot.overlays().is_empty());
    }

    #[test]
    fn test_scatter_overlays() {
        let raw = yaml(
            "x: {quantity: a.b, units: kpc}\ny: {quantity: c.d, units: kpc}\nmean: {number_of_bins: 10}\nmedian:",
        );
        let plot = PlotDescriptor::from_config("lines", &raw).unwrap();
        let kinds: Vec<_> = plot.overlays().iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![LineKind::Median, LineKind::Mean]);
    }

    #[test]
    fn test_bad_bin_count() {
        let raw = yaml(&format!("type: massfunction\nnumber_of_bins: 0\n{MASS_AXIS}"));
        let err = PlotDescriptor::from_config("hmf", &raw).unwrap_err();
        assert!(err.to_string().contains("number_of_bins"));
    }

    #[test]
    fn test_entry_must_be_mapping() {
        let err = PlotDescriptor::from_config("broken", &yaml("[1, 2]")).unwrap_err();
        assert!(matches!(err, AutoplotError::InvalidField { .. }));
    }
}
