use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::units::{Quantity, Unit, UnitError};

pub const DEFAULT_BIN_COUNT: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BinError {
    #[error("both a lower and an upper bound are required")]
    IncompleteRange,
    #[error("lower bound {lower} must be positive for logarithmic bins")]
    NonPositiveLogBound { lower: f64 },
    #[error("lower bound {lower} must be less than upper bound {upper}")]
    EmptyRange { lower: f64, upper: f64 },
    #[error("at least one bin is required")]
    ZeroCount,
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Ordered bin edges expressed in `unit`; `edges.len() == bin_count + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct BinSpec {
    edges: Vec<f64>,
    unit: Unit,
    log_scale: bool,
}

impl BinSpec {
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn log_scale(&self) -> bool {
        self.log_scale
    }

    pub fn bin_count(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn to_unit(&self, unit: &Unit) -> Result<BinSpec, UnitError> {
        let factor = self.unit.conversion_factor(unit)?;
        Ok(BinSpec {
            edges: self.edges.iter().map(|e| e * factor).collect(),
            unit: unit.clone(),
            log_scale: self.log_scale,
        })
    }

    /// Geometric centres for log-spaced bins, arithmetic otherwise.
    pub fn centers(&self) -> Vec<f64> {
        self.edges
            .windows(2)
            .map(|w| {
                if self.log_scale {
                    (w[0] * w[1]).sqrt()
                } else {
                    0.5 * (w[0] + w[1])
                }
            })
            .collect()
    }

    /// Bin widths in log10 space for log-spaced bins, linear widths otherwise.
    pub fn widths(&self) -> Vec<f64> {
        self.edges
            .windows(2)
            .map(|w| {
                if self.log_scale {
                    w[1].log10() - w[0].log10()
                } else {
                    w[1] - w[0]
                }
            })
            .collect()
    }
}

/// Build `count + 1` edges between `lower` and `upper` in `lower`'s unit.
///
/// Log-scaled edges are uniform in log10 space. The outermost edges are the
/// bounds themselves, not values recovered from the log transform.
pub fn make_bins(
    lower: Option<&Quantity>,
    upper: Option<&Quantity>,
    count: usize,
    log_scale: bool,
) -> Result<BinSpec, BinError> {
    let (lower, upper) = match (lower, upper) {
        (Some(lower), Some(upper)) => (lower, upper),
        _ => return Err(BinError::IncompleteRange),
    };
    if count == 0 {
        return Err(BinError::ZeroCount);
    }
    let unit = lower.unit.clone();
    let lo = lower.value;
    let hi = upper.to(&unit)?.value;

    if log_scale && lo <= 0.0 {
        return Err(BinError::NonPositiveLogBound { lower: lo });
    }
    if lo >= hi {
        return Err(BinError::EmptyRange {
            lower: lo,
            upper: hi,
        });
    }

    let mut edges: Vec<f64> = if log_scale {
        let (log_lo, log_hi) = (lo.log10(), hi.log10());
        let step = (log_hi - log_lo) / count as f64;
        (0..=count)
            .map(|i| 10f64.powf(log_lo + step * i as f64))
            .collect()
    } else {
        let step = (hi - lo) / count as f64;
        (0..=count).map(|i| lo + step * i as f64).collect()
    };
    edges[0] = lo;
    edges[count] = hi;

    Ok(BinSpec {
        edges,
        unit,
        log_scale,
    })
}

/// Index of the bin holding `value`: half-open bins, the last one closed.
pub fn bin_index(value: f64, edges: &[f64]) -> Option<usize> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if !value.is_finite() || edges.len() < 2 || value < first || value > last {
        return None;
    }
    if value == last {
        return Some(edges.len() - 2);
    }
    Some(edges.partition_point(|edge| *edge <= value) - 1)
}

pub fn histogram1d(values: &[f64], edges: &[f64]) -> Array1<f64> {
    let mut counts = Array1::zeros(edges.len().saturating_sub(1));
    for &value in values {
        if let Some(idx) = bin_index(value, edges) {
            counts[idx] += 1.0;
        }
    }
    counts
}

/// Counts indexed `[x_bin, y_bin]`; a pair is dropped if either value falls outside.
pub fn histogram2d(x: &[f64], y: &[f64], x_edges: &[f64], y_edges: &[f64]) -> Array2<f64> {
    let mut counts = Array2::zeros((
        x_edges.len().saturating_sub(1),
        y_edges.len().saturating_sub(1),
    ));
    for (&xv, &yv) in x.iter().zip(y.iter()) {
        if let (Some(i), Some(j)) = (bin_index(xv, x_edges), bin_index(yv, y_edges)) {
            counts[[i, j]] += 1.0;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(value: f64) -> Quantity {
        Quantity::new(value, Unit::parse("Solar_Mass").unwrap())
    }

    #[test]
    fn test_log_bins_are_geometric() {
        let bins = make_bins(Some(&q(1.0)), Some(&q(100.0)), 2, true).unwrap();
        assert_eq!(bins.edges(), &[1.0, 10.0, 100.0]);
        assert_eq!(bins.bin_count(), 2);
    }

    #[test]
    fn test_linear_bins_are_uniform() {
        let bins = make_bins(Some(&q(0.0)), Some(&q(10.0)), 5, false).unwrap();
        assert_eq!(bins.edges(), &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_log_bins_are_strictly_increasing() {
        let bins = make_bins(Some(&q(1e8)), Some(&q(1e15)), 128, true).unwrap();
        assert_eq!(bins.edges().len(), 129);
        assert!(bins.edges().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(bins.edges()[0], 1e8);
        assert_eq!(bins.edges()[128], 1e15);
    }

    #[test]
    fn test_non_positive_log_bound() {
        assert_eq!(
            make_bins(Some(&q(0.0)), Some(&q(10.0)), 4, true),
            Err(BinError::NonPositiveLogBound { lower: 0.0 })
        );
        assert_eq!(
            make_bins(Some(&q(-1.0)), Some(&q(10.0)), 4, true),
            Err(BinError::NonPositiveLogBound { lower: -1.0 })
        );
        // Linear bins do not care about the sign.
        assert!(make_bins(Some(&q(-1.0)), Some(&q(10.0)), 4, false).is_ok());
    }

    #[test]
    fn test_incomplete_range() {
        assert_eq!(
            make_bins(Some(&q(1.0)), None, 4, true),
            Err(BinError::IncompleteRange)
        );
        assert_eq!(
            make_bins(None, None, 4, false),
            Err(BinError::IncompleteRange)
        );
    }

    #[test]
    fn test_upper_bound_is_converted() {
        let upper = Quantity::new(1e-3, Unit::parse("Mpc").unwrap());
        let lower = Quantity::new(0.0, Unit::parse("kpc").unwrap());
        let bins = make_bins(Some(&lower), Some(&upper), 2, false).unwrap();
        assert_eq!(bins.unit(), &Unit::parse("kpc").unwrap());
        assert!((bins.edges()[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_centers_and_widths() {
        let bins = make_bins(Some(&q(1.0)), Some(&q(100.0)), 2, true).unwrap();
        let centers = bins.centers();
        assert!((centers[0] - 10f64.sqrt()).abs() < 1e-12);
        assert!(bins.widths().iter().all(|w| (w - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_histogram_edges_are_half_open() {
        let edges = [0.0, 1.0, 2.0];
        let counts = histogram1d(&[0.0, 0.5, 1.0, 2.0, 2.5, -0.1, f64::NAN], &edges);
        assert_eq!(counts.to_vec(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_histogram2d_counts() {
        let edges = [0.0, 1.0, 2.0];
        let counts = histogram2d(&[0.5, 0.5, 1.5, 3.0], &[1.5, 1.5, 0.5, 0.5], &edges, &edges);
        assert_eq!(counts[[0, 1]], 2.0);
        assert_eq!(counts[[1, 0]], 1.0);
        assert_eq!(counts.sum(), 3.0);
    }
}
