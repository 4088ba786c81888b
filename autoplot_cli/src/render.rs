use std::ops::Range;
use std::panic;
use std::path::Path;

use anyhow::Result;
use autoplot::{
    AutoplotError, AxisConfig, Figure, FigureData, LineKind, OutputFormat, OverlayLine, Renderer,
    ScatterMode,
};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

const MARGIN_FRACTION: f64 = 0.05;
const POINT_COLOR: RGBColor = RGBColor(50, 50, 50);
const MASS_FUNCTION_COLOR: RGBColor = RGBColor(30, 144, 255);
const LOW_DENSITY: RGBColor = RGBColor(222, 235, 247);
const HIGH_DENSITY: RGBColor = RGBColor(8, 48, 107);

/// Draws figures with plotters: PNG through the bitmap backend, SVG otherwise.
#[derive(Clone, Copy, Debug)]
pub struct PlottersRenderer {
    width: u32,
    height: u32,
}

impl PlottersRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Renderer for PlottersRenderer {
    fn render(&self, figure: &Figure, path: &Path) -> Result<(), AutoplotError> {
        let write_error = |reason: String| AutoplotError::OutputWrite {
            plot: figure.name.clone(),
            path: path.to_path_buf(),
            reason,
        };
        let format = OutputFormat::from_path(path)
            .ok_or_else(|| write_error("unsupported output extension".to_string()))?;
        render_guard(figure, path, format, (self.width, self.height)).map_err(write_error)
    }
}

fn render_guard(
    figure: &Figure,
    path: &Path,
    format: OutputFormat,
    size: (u32, u32),
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_to_backend(figure, path, format, size).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_to_backend(
    figure: &Figure,
    path: &Path,
    format: OutputFormat,
    size: (u32, u32),
) -> Result<()> {
    match format {
        OutputFormat::Png => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_figure(root, figure)
        }
        OutputFormat::Svg => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_figure(root, figure)
        }
    }
}

/// Maps data values into drawing space; log axes are drawn in log10 units.
#[derive(Clone, Copy, Debug, PartialEq)]
struct AxisScale {
    log: bool,
}

impl AxisScale {
    fn of(axis: &AxisConfig) -> Self {
        Self {
            log: axis.log_scale,
        }
    }

    fn forward(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            None
        } else if self.log {
            (value > 0.0).then(|| value.log10())
        } else {
            Some(value)
        }
    }

    fn label(&self, position: f64) -> String {
        if self.log {
            format_tick(10f64.powf(position))
        } else {
            format_tick(position)
        }
    }
}

fn format_tick(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude == 0.0 {
        "0".to_string()
    } else if !(1e-2..1e4).contains(&magnitude) {
        format!("{:.1e}", value)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Drawing-space range for an axis: explicit limits win, the data fills in
/// whatever bound is missing.
fn axis_range(axis: &AxisConfig, scale: AxisScale, values: &[f64]) -> Range<f64> {
    let (data_lo, data_hi) = values
        .iter()
        .filter_map(|v| scale.forward(*v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let (mut lo, mut hi) = if data_lo <= data_hi {
        let pad = ((data_hi - data_lo) * MARGIN_FRACTION).max(1e-9);
        (data_lo - pad, data_hi + pad)
    } else {
        (0.0, 1.0)
    };
    if let Some(lower) = axis.limits.0.and_then(|v| scale.forward(v)) {
        lo = lower;
    }
    if let Some(upper) = axis.limits.1.and_then(|v| scale.forward(v)) {
        hi = upper;
    }
    if lo >= hi {
        hi = lo + 1.0;
    }
    lo..hi
}

fn extents(figure: &Figure) -> (Vec<f64>, Vec<f64>) {
    let (mut xs, mut ys) = match &figure.data {
        FigureData::Scatter { x, y } => (x.clone(), y.clone()),
        FigureData::Histogram2d {
            x_edges, y_edges, ..
        } => (x_edges.clone(), y_edges.clone()),
        FigureData::MassFunction {
            centers, values, ..
        } => (centers.clone(), values.clone()),
    };
    for line in &figure.overlays {
        xs.extend_from_slice(&line.centers);
        ys.extend_from_slice(&line.lower);
        ys.extend_from_slice(&line.upper);
    }
    (xs, ys)
}

fn density_color(count: f64, max_count: f64) -> RGBColor {
    let t = if max_count > 0.0 {
        ((count + 1.0).ln() / (max_count + 1.0).ln()).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(
        mix(LOW_DENSITY.0, HIGH_DENSITY.0),
        mix(LOW_DENSITY.1, HIGH_DENSITY.1),
        mix(LOW_DENSITY.2, HIGH_DENSITY.2),
    )
}

fn line_color(kind: LineKind) -> RGBColor {
    match kind {
        LineKind::Median => RGBColor(200, 0, 100),
        LineKind::Mean => RGBColor(34, 139, 34),
    }
}

fn draw_figure<DB>(root: DrawingArea<DB, Shift>, figure: &Figure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let x_scale = AxisScale::of(&figure.x);
    let y_scale = AxisScale::of(&figure.y);
    let (x_values, y_values) = extents(figure);
    let x_range = axis_range(&figure.x, x_scale, &x_values);
    let y_range = axis_range(&figure.y, y_scale, &y_values);
    let y_floor = y_range.start;

    let title_font = FontDesc::new(FontFamily::SansSerif, 22.0, FontStyle::Normal);
    let axis_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);

    let mut chart = ChartBuilder::on(&root)
        .margin(25)
        .caption(&figure.name, title_font)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .x_desc(figure.x.label.clone())
        .y_desc(figure.y.label.clone())
        .x_label_formatter(&|v| x_scale.label(*v))
        .y_label_formatter(&|v| y_scale.label(*v))
        .label_style(axis_font.clone().color(&BLACK.mix(0.85)))
        .draw()?;

    match &figure.data {
        FigureData::Scatter { x, y } => {
            let points: Vec<(f64, f64)> = x
                .iter()
                .zip(y.iter())
                .filter_map(|(xv, yv)| Some((x_scale.forward(*xv)?, y_scale.forward(*yv)?)))
                .collect();
            chart.draw_series(
                points
                    .into_iter()
                    .map(|point| Circle::new(point, 2, POINT_COLOR.mix(0.6).filled())),
            )?;
        }
        FigureData::Histogram2d {
            x_edges,
            y_edges,
            counts,
        } => {
            let max_count = counts.iter().copied().fold(0.0, f64::max);
            let mut cells = Vec::new();
            for ((i, j), count) in counts.indexed_iter() {
                if *count <= 0.0 {
                    continue;
                }
                let corners = (
                    x_scale.forward(x_edges[i]),
                    x_scale.forward(x_edges[i + 1]),
                    y_scale.forward(y_edges[j]),
                    y_scale.forward(y_edges[j + 1]),
                );
                if let (Some(x0), Some(x1), Some(y0), Some(y1)) = corners {
                    let color = density_color(*count, max_count);
                    cells.push(Rectangle::new([(x0, y0), (x1, y1)], color.filled()));
                }
            }
            chart.draw_series(cells)?;
        }
        FigureData::MassFunction {
            centers,
            values,
            errors,
            ..
        } => {
            let mut points = Vec::new();
            let mut bars = Vec::new();
            for ((center, value), error) in centers.iter().zip(values).zip(errors) {
                let (x, y) = match (x_scale.forward(*center), y_scale.forward(*value)) {
                    (Some(x), Some(y)) => (x, y),
                    _ => continue,
                };
                points.push((x, y));
                let low = y_scale.forward(value - error).unwrap_or(y_floor);
                let high = y_scale.forward(value + error).unwrap_or(y);
                bars.push(PathElement::new(vec![(x, low), (x, high)], MASS_FUNCTION_COLOR));
            }
            chart.draw_series(bars)?;
            chart.draw_series(LineSeries::new(points.clone(), &MASS_FUNCTION_COLOR))?;
            chart.draw_series(
                points
                    .into_iter()
                    .map(|point| Circle::new(point, 3, MASS_FUNCTION_COLOR.filled())),
            )?;
        }
    }

    for line in &figure.overlays {
        draw_overlay(&mut chart, line, x_scale, y_scale, y_floor)?;
    }

    if !figure.overlays.is_empty() {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.7))
            .border_style(&BLACK.mix(0.3))
            .label_font(axis_font.clone().color(&BLACK))
            .position(SeriesLabelPosition::LowerRight)
            .draw()?;
    }

    let context_style = axis_font.color(&BLACK.mix(0.7));
    let lines = figure
        .context
        .title
        .iter()
        .chain(figure.context.annotations.iter());
    for (idx, text) in lines.enumerate() {
        root.draw_text(text, &context_style, (110, 60 + 20 * idx as i32))?;
    }

    root.present()?;
    Ok(())
}

fn draw_overlay<DB>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    line: &OverlayLine,
    x_scale: AxisScale,
    y_scale: AxisScale,
    y_floor: f64,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let color = line_color(line.kind);
    let mut center_line = Vec::new();
    let mut upper = Vec::new();
    let mut lower = Vec::new();
    for idx in 0..line.centers.len() {
        let x = match x_scale.forward(line.centers[idx]) {
            Some(x) => x,
            None => continue,
        };
        let y = match y_scale.forward(line.values[idx]) {
            Some(y) => y,
            None => continue,
        };
        center_line.push((x, y));
        upper.push((x, y_scale.forward(line.upper[idx]).unwrap_or(y)));
        lower.push((x, y_scale.forward(line.lower[idx]).unwrap_or(y_floor)));
    }
    if center_line.is_empty() {
        return Ok(());
    }

    match line.scatter {
        ScatterMode::None => {}
        ScatterMode::Shaded => {
            let mut band = upper.clone();
            band.extend(lower.iter().rev());
            chart.draw_series(std::iter::once(Polygon::new(band, color.mix(0.2).filled())))?;
        }
        ScatterMode::ErrorBar => {
            chart.draw_series(
                lower
                    .iter()
                    .zip(upper.iter())
                    .map(|(lo, hi)| PathElement::new(vec![*lo, *hi], color)),
            )?;
        }
    }

    let style = ShapeStyle {
        color: color.to_rgba(),
        filled: false,
        stroke_width: 2,
    };
    chart
        .draw_series(LineSeries::new(center_line, style))?
        .label(line.kind.label())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoplot::Unit;

    fn axis(log_scale: bool, limits: (Option<f64>, Option<f64>)) -> AxisConfig {
        AxisConfig {
            label: "x".to_string(),
            unit: Unit::dimensionless(),
            log_scale,
            limits,
        }
    }

    #[test]
    fn test_log_scale_drops_non_positive_values() {
        let scale = AxisScale { log: true };
        assert_eq!(scale.forward(100.0), Some(2.0));
        assert_eq!(scale.forward(0.0), None);
        assert_eq!(scale.forward(-3.0), None);
        assert_eq!(AxisScale { log: false }.forward(-3.0), Some(-3.0));
        assert_eq!(scale.forward(f64::NAN), None);
    }

    #[test]
    fn test_explicit_limits_win() {
        let config = axis(true, (Some(1e9), Some(1e15)));
        let range = axis_range(&config, AxisScale::of(&config), &[1e11, 1e12]);
        assert!((range.start - 9.0).abs() < 1e-12);
        assert!((range.end - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_auto_range_pads_data() {
        let config = axis(false, (None, None));
        let range = axis_range(&config, AxisScale::of(&config), &[0.0, 10.0, f64::NAN]);
        assert!((range.start + 0.5).abs() < 1e-12);
        assert!((range.end - 10.5).abs() < 1e-12);

        let empty = axis_range(&config, AxisScale::of(&config), &[]);
        assert_eq!(empty, 0.0..1.0);
    }

    #[test]
    fn test_partial_limit_keeps_data_bound() {
        let config = axis(false, (None, Some(4.0)));
        let range = axis_range(&config, AxisScale::of(&config), &[0.0, 10.0]);
        assert_eq!(range.end, 4.0);
        assert!(range.start < 0.0);
    }

    #[test]
    fn test_tick_labels() {
        assert_eq!(format_tick(0.0), "0");
        assert_eq!(format_tick(2.5), "2.5");
        assert_eq!(format_tick(100.0), "100");
        assert_eq!(format_tick(1e10), "1.0e10");
        assert_eq!(AxisScale { log: true }.label(3.0), "1000");
    }

    #[test]
    fn test_density_gradient_endpoints() {
        assert_eq!(density_color(0.0, 10.0), LOW_DENSITY);
        assert_eq!(density_color(10.0, 10.0), HIGH_DENSITY);
    }

    #[test]
    fn test_unsupported_extension_is_an_output_error() {
        let figure = Figure {
            name: "odd".to_string(),
            plot_type: autoplot::PlotType::Scatter,
            x: axis(false, (None, None)),
            y: axis(false, (None, None)),
            data: FigureData::Scatter {
                x: vec![1.0],
                y: vec![1.0],
            },
            overlays: Vec::new(),
            context: Default::default(),
        };
        let err = PlottersRenderer::new(320, 240)
            .render(&figure, Path::new("odd.pdf"))
            .unwrap_err();
        assert!(matches!(err, AutoplotError::OutputWrite { .. }));
    }
}
