//! Declarative plot resolution and dispatch for halo catalogues.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod axis;
pub mod bins;
pub mod catalogue;
mod coerce;
pub mod config;
pub mod dispatch;
pub mod figure;
pub mod lines;
pub mod metadata;
pub mod plot;
pub mod units;

pub use axis::{resolve_axis, AxisSpec, Coordinate};
pub use bins::{make_bins, BinError, BinSpec, DEFAULT_BIN_COUNT};
pub use catalogue::{Catalogue, CatalogueContext, DataSource, Series};
pub use config::{load_config_files, parse_plots, parse_yaml, ParseOutcome};
pub use dispatch::{prepare_output_dir, Dispatcher, RenderReport, RenderedPlot};
pub use figure::{AxisConfig, Figure, FigureData, OutputFormat, Renderer};
pub use lines::{
    resolve_overlay, BinnedLines, LineConfig, LineKind, LineOverlaySpec, OverlayComputer,
    OverlayLine, ScatterMode,
};
pub use metadata::FigureMetadata;
pub use plot::{PlotDescriptor, PlotType, VALID_PLOT_TYPES};
pub use units::{Quantity, Unit, UnitError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutoplotError {
    #[error("plot `{plot}`: `{coordinate}.quantity` is required")]
    MissingAxisQuantity { plot: String, coordinate: Coordinate },
    #[error("plot `{plot}`: `{coordinate}.units` is required alongside `{coordinate}.quantity`")]
    MissingAxisUnits { plot: String, coordinate: Coordinate },
    #[error("plot `{plot}`: unknown type `{found}`, expected one of {}", VALID_PLOT_TYPES.join(", "))]
    UnknownPlotType { plot: String, found: String },
    #[error("plot `{plot}`: binning needs both `{coordinate}.start` and `{coordinate}.end`")]
    IncompleteBinRange { plot: String, coordinate: Coordinate },
    #[error("plot `{plot}`: `{coordinate}.start` is {lower} but must be positive on a log axis")]
    NonPositiveLogBound {
        plot: String,
        coordinate: Coordinate,
        lower: f64,
    },
    #[error("plot `{plot}`: `{coordinate}.start` ({lower}) must be below `{coordinate}.end` ({upper})")]
    InvertedLimits {
        plot: String,
        coordinate: Coordinate,
        lower: f64,
        upper: f64,
    },
    #[error("plot `{plot}`: invalid `{key}`: {reason}")]
    InvalidField {
        plot: String,
        key: String,
        reason: String,
    },
    #[error("plot `{plot}`: `{coordinate}.quantity` `{path}` not found in the catalogue")]
    AxisResolution {
        plot: String,
        coordinate: Coordinate,
        path: String,
    },
    #[error("plot `{plot}`: `{key}`: {source}")]
    UnitConversion {
        plot: String,
        key: String,
        source: UnitError,
    },
    #[error("plot `{plot}`: the catalogue has no box volume to normalise by")]
    MissingNormalization { plot: String },
    #[error("plot `{plot}`: failed to write {}: {reason}", .path.display())]
    OutputWrite {
        plot: String,
        path: PathBuf,
        reason: String,
    },
    #[error("cannot create output directory {}: {reason}", .path.display())]
    OutputDirectory { path: PathBuf, reason: String },
    #[error("plot `{0}` is declared more than once")]
    DuplicatePlotName(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("catalogue error: {0}")]
    Catalogue(String),
    #[error("{}", summarize(.0))]
    InvalidConfiguration(Vec<AutoplotError>),
}

fn summarize(errors: &[AutoplotError]) -> String {
    let mut text = format!("{} invalid plot entr", errors.len());
    text.push_str(if errors.len() == 1 { "y" } else { "ies" });
    for error in errors {
        text.push_str("\n  - ");
        text.push_str(&error.to_string());
    }
    text
}

/// A validated set of plot descriptors, ready to be rendered against any
/// data source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AutoPlotter {
    plots: Vec<PlotDescriptor>,
}

impl AutoPlotter {
    /// Fails with every rejected entry if any entry is invalid.
    pub fn from_outcome(outcome: ParseOutcome) -> Result<Self, AutoplotError> {
        outcome.into_result().map(|plots| Self { plots })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, AutoplotError> {
        Self::from_outcome(parse_yaml(text)?)
    }

    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, AutoplotError> {
        Self::from_outcome(load_config_files(paths))
    }

    pub fn plots(&self) -> &[PlotDescriptor] {
        &self.plots
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Render every plot into `output_dir`. Only a failure to create the
    /// directory aborts the run; per-plot failures are collected.
    pub fn create_plots(
        &self,
        dispatcher: &Dispatcher<'_>,
        output_dir: &Path,
        extension: &str,
    ) -> Result<RenderReport, AutoplotError> {
        dispatcher.render_all(&self.plots, output_dir, extension)
    }
}
