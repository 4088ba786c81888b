use std::path::Path;

use ndarray::Array2;
use serde::Serialize;

use crate::catalogue::CatalogueContext;
use crate::lines::OverlayLine;
use crate::plot::PlotType;
use crate::units::{Quantity, Unit};
use crate::AutoplotError;

/// Axis decoration handed to the renderer. Limits are plain values in `unit`.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisConfig {
    pub label: String,
    pub unit: Unit,
    pub log_scale: bool,
    pub limits: (Option<f64>, Option<f64>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FigureData {
    Scatter {
        x: Vec<f64>,
        y: Vec<f64>,
    },
    /// `counts[[i, j]]` is the number of objects in x bin `i` and y bin `j`.
    Histogram2d {
        x_edges: Vec<f64>,
        y_edges: Vec<f64>,
        counts: Array2<f64>,
    },
    /// Number density per unit log10(x) (or per unit x on linear axes).
    MassFunction {
        centers: Vec<f64>,
        values: Vec<f64>,
        errors: Vec<f64>,
        volume: Quantity,
    },
}

/// A backend-agnostic figure: transformed data plus everything needed to
/// decorate it.
#[derive(Clone, Debug, PartialEq)]
pub struct Figure {
    pub name: String,
    pub plot_type: PlotType,
    pub x: AxisConfig,
    pub y: AxisConfig,
    pub data: FigureData,
    pub overlays: Vec<OverlayLine>,
    pub context: CatalogueContext,
}

impl Figure {
    /// Number of objects or non-empty bins that will be drawn.
    pub fn point_count(&self) -> usize {
        match &self.data {
            FigureData::Scatter { x, .. } => x.len(),
            FigureData::Histogram2d { counts, .. } => {
                counts.iter().filter(|count| **count > 0.0).count()
            }
            FigureData::MassFunction { values, .. } => {
                values.iter().filter(|value| **value > 0.0).count()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Svg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "svg" => Some(OutputFormat::Svg),
            _ => None,
        }
    }
}

/// Draws a figure and persists it at `path`.
pub trait Renderer {
    fn render(&self, figure: &Figure, path: &Path) -> Result<(), AutoplotError>;
}
