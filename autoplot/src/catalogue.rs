use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::units::{Quantity, Unit, UnitError};
use crate::AutoplotError;

/// A unit-bearing column of per-object values.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub values: Array1<f64>,
    pub unit: Unit,
    pub name: Option<String>,
}

impl Series {
    pub fn new(values: Vec<f64>, unit: Unit) -> Self {
        Self {
            values: Array1::from_vec(values),
            unit,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_unit(&self, unit: &Unit) -> Result<Series, UnitError> {
        let factor = self.unit.conversion_factor(unit)?;
        Ok(Series {
            values: self.values.mapv(|v| v * factor),
            unit: unit.clone(),
            name: self.name.clone(),
        })
    }
}

/// Free-form text describing the catalogue, drawn onto every figure.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CatalogueContext {
    pub title: Option<String>,
    pub annotations: Vec<String>,
}

/// The data collaborator a plot descriptor is bound to at render time.
pub trait DataSource {
    /// Look up a quantity by accessor path, e.g. `["masses", "mass_200crit"]`.
    fn resolve(&self, path: &[String]) -> Option<Series>;

    fn convert(&self, series: &Series, unit: &Unit) -> Result<Series, UnitError> {
        series.to_unit(unit)
    }

    /// Comoving volume used to normalise mass functions.
    fn normalization_volume(&self) -> Option<Quantity>;

    fn context(&self) -> CatalogueContext {
        CatalogueContext::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Series(Series),
    Group(BTreeMap<String, Node>),
}

/// An in-memory catalogue of nested quantity groups.
#[derive(Clone, Debug, PartialEq)]
pub struct Catalogue {
    root: BTreeMap<String, Node>,
    name: Option<String>,
    box_volume: Option<Quantity>,
    scale_factor: f64,
    redshift: Option<f64>,
}

impl Default for Catalogue {
    fn default() -> Self {
        Self {
            root: BTreeMap::new(),
            name: None,
            box_volume: None,
            scale_factor: 1.0,
            redshift: None,
        }
    }
}

#[derive(Deserialize)]
struct CatalogueFile {
    #[serde(default)]
    metadata: MetadataRecord,
    quantities: BTreeMap<String, NodeRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeRecord {
    Leaf(LeafRecord),
    Group(BTreeMap<String, NodeRecord>),
}

#[derive(Deserialize)]
struct LeafRecord {
    units: String,
    values: Vec<Option<f64>>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct QuantityRecord {
    value: f64,
    units: String,
}

#[derive(Deserialize)]
struct MetadataRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    box_volume: Option<QuantityRecord>,
    #[serde(default = "unit_scale_factor")]
    scale_factor: f64,
    #[serde(default)]
    redshift: Option<f64>,
}

impl Default for MetadataRecord {
    fn default() -> Self {
        Self {
            name: None,
            box_volume: None,
            scale_factor: unit_scale_factor(),
            redshift: None,
        }
    }
}

fn unit_scale_factor() -> f64 {
    1.0
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON catalogue from disk.
    pub fn load(path: &Path) -> Result<Self, AutoplotError> {
        let text = fs::read_to_string(path).map_err(|e| {
            AutoplotError::Catalogue(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, AutoplotError> {
        let file: CatalogueFile =
            serde_json::from_str(text).map_err(|e| AutoplotError::Catalogue(e.to_string()))?;

        let mut root = BTreeMap::new();
        for (key, record) in file.quantities {
            let node = convert_node(&key, record)?;
            root.insert(key, node);
        }

        let box_volume = file
            .metadata
            .box_volume
            .map(|record| {
                Unit::parse(&record.units)
                    .map(|unit| Quantity::new(record.value, unit))
                    .map_err(|e| AutoplotError::Catalogue(format!("metadata.box_volume: {e}")))
            })
            .transpose()?;
        if file.metadata.scale_factor <= 0.0 {
            return Err(AutoplotError::Catalogue(
                "metadata.scale_factor must be positive".to_string(),
            ));
        }

        Ok(Self {
            root,
            name: file.metadata.name,
            box_volume,
            scale_factor: file.metadata.scale_factor,
            redshift: file.metadata.redshift,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_box_volume(mut self, volume: Quantity, scale_factor: f64) -> Self {
        self.box_volume = Some(volume);
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_redshift(mut self, redshift: f64) -> Self {
        self.redshift = Some(redshift);
        self
    }

    /// Insert a series under a dotted path, creating intermediate groups.
    /// An existing series on the way is replaced by a group.
    pub fn insert(&mut self, path: &str, series: Series) {
        let segments: Vec<&str> = path.split('.').collect();
        let (leaf, groups) = match segments.split_last() {
            Some(split) => split,
            None => return,
        };
        let mut level = &mut self.root;
        for segment in groups {
            let node = level
                .entry(segment.to_string())
                .or_insert_with(|| Node::Group(BTreeMap::new()));
            if let Node::Series(_) = node {
                *node = Node::Group(BTreeMap::new());
            }
            level = match node {
                Node::Group(children) => children,
                Node::Series(_) => return,
            };
        }
        level.insert(leaf.to_string(), Node::Series(series));
    }

    pub fn with_series(mut self, path: &str, series: Series) -> Self {
        self.insert(path, series);
        self
    }
}

fn convert_node(path: &str, record: NodeRecord) -> Result<Node, AutoplotError> {
    match record {
        NodeRecord::Leaf(leaf) => {
            let unit = Unit::parse(&leaf.units)
                .map_err(|e| AutoplotError::Catalogue(format!("{path}: {e}")))?;
            let values = leaf
                .values
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            let mut series = Series::new(values, unit);
            series.name = leaf.name;
            Ok(Node::Series(series))
        }
        NodeRecord::Group(children) => {
            let mut group = BTreeMap::new();
            for (key, child) in children {
                let node = convert_node(&format!("{path}.{key}"), child)?;
                group.insert(key, node);
            }
            Ok(Node::Group(group))
        }
    }
}

impl DataSource for Catalogue {
    fn resolve(&self, path: &[String]) -> Option<Series> {
        let (leaf, groups) = path.split_last()?;
        let mut level = &self.root;
        for segment in groups {
            level = match level.get(segment)? {
                Node::Group(children) => children,
                Node::Series(_) => return None,
            };
        }
        match level.get(leaf)? {
            Node::Series(series) => Some(series.clone()),
            Node::Group(_) => None,
        }
    }

    fn normalization_volume(&self) -> Option<Quantity> {
        self.box_volume.as_ref().map(|volume| {
            Quantity::new(
                volume.value / self.scale_factor.powi(3),
                volume.unit.clone(),
            )
        })
    }

    fn context(&self) -> CatalogueContext {
        let mut annotations = Vec::new();
        if let Some(z) = self.redshift {
            annotations.push(format!("z = {z:.3}"));
        }
        annotations.push(format!("a = {:.3}", self.scale_factor));
        CatalogueContext {
            title: self.name.clone(),
            annotations,
        }
    }
}
