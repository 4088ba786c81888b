use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::axis::{AxisSpec, Coordinate};
use crate::bins::{histogram1d, histogram2d, BinSpec};
use crate::catalogue::{DataSource, Series};
use crate::figure::{AxisConfig, Figure, FigureData, Renderer};
use crate::lines::{BinnedLines, OverlayComputer, OverlayLine};
use crate::metadata::FigureMetadata;
use crate::plot::{PlotDescriptor, PlotType};
use crate::units::Unit;
use crate::AutoplotError;

static DEFAULT_LINES: BinnedLines = BinnedLines;

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedPlot {
    pub name: String,
    pub path: PathBuf,
    pub metadata: FigureMetadata,
}

/// Outcome of rendering a whole set: every figure is attempted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderReport {
    pub rendered: Vec<RenderedPlot>,
    pub failures: Vec<AutoplotError>,
}

impl RenderReport {
    pub fn push(&mut self, result: Result<RenderedPlot, AutoplotError>) {
        match result {
            Ok(plot) => self.rendered.push(plot),
            Err(e) => self.failures.push(e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl FromIterator<Result<RenderedPlot, AutoplotError>> for RenderReport {
    fn from_iter<I: IntoIterator<Item = Result<RenderedPlot, AutoplotError>>>(iter: I) -> Self {
        let mut report = RenderReport::default();
        for result in iter {
            report.push(result);
        }
        report
    }
}

/// Create `dir` if it does not exist yet. Safe to call from several threads.
pub fn prepare_output_dir(dir: &Path) -> Result<(), AutoplotError> {
    fs::create_dir_all(dir).map_err(|e| AutoplotError::OutputDirectory {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Binds plot descriptors to a data source and hands the transformed data to
/// a renderer.
#[derive(Clone, Copy)]
pub struct Dispatcher<'a> {
    source: &'a (dyn DataSource + Sync),
    renderer: &'a (dyn Renderer + Sync),
    lines: &'a (dyn OverlayComputer + Sync),
}

impl<'a> Dispatcher<'a> {
    pub fn new(source: &'a (dyn DataSource + Sync), renderer: &'a (dyn Renderer + Sync)) -> Self {
        Self {
            source,
            renderer,
            lines: &DEFAULT_LINES,
        }
    }

    pub fn with_overlay_computer(mut self, lines: &'a (dyn OverlayComputer + Sync)) -> Self {
        self.lines = lines;
        self
    }

    /// Resolve, convert and bin the data of one descriptor.
    pub fn build_figure(&self, descriptor: &PlotDescriptor) -> Result<Figure, AutoplotError> {
        let name = descriptor.name();
        debug!(plot = name, plot_type = %descriptor.plot_type(), "building figure");

        let x_series = self.series(descriptor, Coordinate::X)?;
        let x = axis_config(descriptor.x(), &x_series);

        let (y, data, overlays) = match descriptor.plot_type() {
            PlotType::Scatter => {
                let y_series = self.series(descriptor, Coordinate::Y)?;
                check_lengths(name, &x_series, &y_series)?;
                let overlays = self.overlays(descriptor, &x_series, &y_series)?;
                (
                    axis_config(descriptor.y(), &y_series),
                    FigureData::Scatter {
                        x: x_series.values.to_vec(),
                        y: y_series.values.to_vec(),
                    },
                    overlays,
                )
            }
            PlotType::Histogram2d => {
                let y_series = self.series(descriptor, Coordinate::Y)?;
                check_lengths(name, &x_series, &y_series)?;
                let x_bins = self.bins(descriptor, Coordinate::X, descriptor.x_bins(), &x_series.unit)?;
                let y_bins = self.bins(descriptor, Coordinate::Y, descriptor.y_bins(), &y_series.unit)?;
                let x_values = x_series.values.to_vec();
                let y_values = y_series.values.to_vec();
                let counts = histogram2d(&x_values, &y_values, x_bins.edges(), y_bins.edges());
                let overlays = self.overlays(descriptor, &x_series, &y_series)?;
                (
                    axis_config(descriptor.y(), &y_series),
                    FigureData::Histogram2d {
                        x_edges: x_bins.edges().to_vec(),
                        y_edges: y_bins.edges().to_vec(),
                        counts,
                    },
                    overlays,
                )
            }
            PlotType::MassFunction => {
                let volume = self.source.normalization_volume().ok_or_else(|| {
                    AutoplotError::MissingNormalization {
                        plot: name.to_string(),
                    }
                })?;
                let bins = self.bins(descriptor, Coordinate::X, descriptor.x_bins(), &x_series.unit)?;
                let counts = histogram1d(&x_series.values.to_vec(), bins.edges());
                let mut values = Vec::with_capacity(counts.len());
                let mut errors = Vec::with_capacity(counts.len());
                for (count, width) in counts.iter().zip(bins.widths()) {
                    let norm = volume.value * width;
                    values.push(count / norm);
                    errors.push(count.sqrt() / norm);
                }

                let y_unit = volume.unit.reciprocal();
                let quantity = series_name(descriptor.x(), &x_series);
                let default_label = if bins.log_scale() {
                    format!("dn/dlog10({quantity})")
                } else {
                    format!("dn/d({quantity})")
                };
                let y_axis = descriptor.y();
                let y = AxisConfig {
                    label: y_axis
                        .label_override
                        .clone()
                        .unwrap_or_else(|| with_unit(&default_label, &y_unit)),
                    unit: y_unit,
                    log_scale: y_axis.log_scale,
                    limits: limits(y_axis),
                };
                (
                    y,
                    FigureData::MassFunction {
                        centers: bins.centers(),
                        values,
                        errors,
                        volume,
                    },
                    Vec::new(),
                )
            }
        };

        Ok(Figure {
            name: name.to_string(),
            plot_type: descriptor.plot_type(),
            x,
            y,
            data,
            overlays,
            context: self.source.context(),
        })
    }

    /// Build one figure and persist it at `{output_dir}/{name}.{extension}`.
    pub fn render(
        &self,
        descriptor: &PlotDescriptor,
        output_dir: &Path,
        extension: &str,
    ) -> Result<RenderedPlot, AutoplotError> {
        prepare_output_dir(output_dir)?;
        let figure = self.build_figure(descriptor)?;
        let path = output_dir.join(format!("{}.{}", descriptor.name(), extension));
        self.renderer.render(&figure, &path)?;
        debug!(plot = descriptor.name(), path = %path.display(), "rendered figure");
        let metadata = FigureMetadata::from_figure(&figure, &path);
        Ok(RenderedPlot {
            name: descriptor.name().to_string(),
            path,
            metadata,
        })
    }

    /// Render every descriptor in order; a failure does not stop the rest.
    pub fn render_all(
        &self,
        descriptors: &[PlotDescriptor],
        output_dir: &Path,
        extension: &str,
    ) -> Result<RenderReport, AutoplotError> {
        prepare_output_dir(output_dir)?;
        Ok(descriptors
            .iter()
            .map(|descriptor| self.render(descriptor, output_dir, extension))
            .collect())
    }

    fn series(
        &self,
        descriptor: &PlotDescriptor,
        coordinate: Coordinate,
    ) -> Result<Series, AutoplotError> {
        let plot = descriptor.name();
        let axis = descriptor.axis(coordinate);
        let path = axis
            .quantity_path
            .as_ref()
            .ok_or_else(|| AutoplotError::MissingAxisQuantity {
                plot: plot.to_string(),
                coordinate,
            })?;
        let raw = self
            .source
            .resolve(path)
            .ok_or_else(|| AutoplotError::AxisResolution {
                plot: plot.to_string(),
                coordinate,
                path: path.join("."),
            })?;
        self.source
            .convert(&raw, &axis.unit)
            .map_err(|source| AutoplotError::UnitConversion {
                plot: plot.to_string(),
                key: format!("{coordinate}.units"),
                source,
            })
    }

    fn bins(
        &self,
        descriptor: &PlotDescriptor,
        coordinate: Coordinate,
        bins: Option<&BinSpec>,
        unit: &Unit,
    ) -> Result<BinSpec, AutoplotError> {
        let plot = descriptor.name().to_string();
        let bins = bins.ok_or(AutoplotError::IncompleteBinRange {
            plot: plot.clone(),
            coordinate,
        })?;
        bins.to_unit(unit)
            .map_err(|source| AutoplotError::UnitConversion {
                plot,
                key: format!("{coordinate}.units"),
                source,
            })
    }

    fn overlays(
        &self,
        descriptor: &PlotDescriptor,
        x: &Series,
        y: &Series,
    ) -> Result<Vec<OverlayLine>, AutoplotError> {
        let mut lines = Vec::new();
        for spec in descriptor.overlays() {
            let line = self.lines.compute(spec, x, y).map_err(|e| AutoplotError::InvalidField {
                plot: descriptor.name().to_string(),
                key: spec.kind.key().to_string(),
                reason: e.to_string(),
            })?;
            match line {
                Some(line) if !line.is_empty() => lines.push(line),
                _ => debug!(plot = descriptor.name(), line = %spec.kind, "overlay has nothing to draw"),
            }
        }
        Ok(lines)
    }
}

// x and y are paired per object, so a length mismatch means the two paths
// point into different tables.
fn check_lengths(plot: &str, x: &Series, y: &Series) -> Result<(), AutoplotError> {
    if x.len() == y.len() {
        return Ok(());
    }
    Err(AutoplotError::InvalidField {
        plot: plot.to_string(),
        key: format!("{}.quantity", Coordinate::Y),
        reason: format!("has {} values but `x.quantity` has {}", y.len(), x.len()),
    })
}

fn series_name(axis: &AxisSpec, series: &Series) -> String {
    series
        .name
        .clone()
        .or_else(|| axis.quantity_name())
        .unwrap_or_default()
}

fn with_unit(label: &str, unit: &Unit) -> String {
    if unit.is_dimensionless() {
        label.to_string()
    } else {
        format!("{label} [{unit}]")
    }
}

fn limits(axis: &AxisSpec) -> (Option<f64>, Option<f64>) {
    (
        axis.limit_lower.as_ref().map(|q| q.value),
        axis.limit_upper.as_ref().map(|q| q.value),
    )
}

fn axis_config(axis: &AxisSpec, series: &Series) -> AxisConfig {
    let label = axis
        .label_override
        .clone()
        .unwrap_or_else(|| with_unit(&series_name(axis, series), &axis.unit));
    AxisConfig {
        label,
        unit: axis.unit.clone(),
        log_scale: axis.log_scale,
        limits: limits(axis),
    }
}
