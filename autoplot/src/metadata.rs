use std::path::Path;

use serde::Serialize;

use crate::figure::{AxisConfig, Figure, FigureData};
use crate::lines::OverlayLine;
use crate::plot::PlotType;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AxisMetadata {
    pub label: String,
    pub units: String,
    pub log: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

impl From<&AxisConfig> for AxisMetadata {
    fn from(axis: &AxisConfig) -> Self {
        Self {
            label: axis.label.clone(),
            units: axis.unit.to_string(),
            log: axis.log_scale,
            start: axis.limits.0,
            end: axis.limits.1,
        }
    }
}

/// What was drawn for one figure, as written to the run's metadata file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FigureMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub plot_type: PlotType,
    pub path: String,
    pub x: AxisMetadata,
    pub y: AxisMetadata,
    pub points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<OverlayLine>,
}

impl FigureMetadata {
    pub fn from_figure(figure: &Figure, path: &Path) -> Self {
        let volume = match &figure.data {
            FigureData::MassFunction { volume, .. } => Some(volume.to_string()),
            _ => None,
        };
        Self {
            name: figure.name.clone(),
            plot_type: figure.plot_type,
            path: path.display().to_string(),
            x: AxisMetadata::from(&figure.x),
            y: AxisMetadata::from(&figure.y),
            points: figure.point_count(),
            volume,
            lines: figure.overlays.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::CatalogueContext;
    use crate::lines::{LineKind, ScatterMode};
    use crate::units::Unit;

    fn axis(label: &str, unit: &str, limits: (Option<f64>, Option<f64>)) -> AxisConfig {
        AxisConfig {
            label: label.to_string(),
            unit: Unit::parse(unit).unwrap(),
            log_scale: true,
            limits,
        }
    }

    #[test]
    fn test_metadata_serialises_lines() {
        let figure = Figure {
            name: "smhm".to_string(),
            plot_type: PlotType::Scatter,
            x: axis("M_200crit [Solar_Mass]", "Solar_Mass", (Some(1e10), None)),
            y: axis("M_star [Solar_Mass]", "Solar_Mass", (None, None)),
            data: FigureData::Scatter {
                x: vec![1e10, 1e11],
                y: vec![1e8, 1e9],
            },
            overlays: vec![OverlayLine {
                kind: LineKind::Median,
                scatter: ScatterMode::Shaded,
                centers: vec![3e10],
                values: vec![5e8],
                lower: vec![1e8],
                upper: vec![9e8],
            }],
            context: CatalogueContext::default(),
        };
        let metadata = FigureMetadata::from_figure(&figure, Path::new("out/smhm.png"));
        assert_eq!(metadata.points, 2);
        assert_eq!(metadata.x.start, Some(1e10));

        let text = serde_yaml::to_string(&metadata).unwrap();
        assert!(text.contains("type: scatter"));
        assert!(text.contains("kind: median"));
        assert!(text.contains("path: out/smhm.png"));
        assert!(!text.contains("volume"));
    }
}
