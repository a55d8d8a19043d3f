// crates/core/src/taxonomy.rs
//! Class taxonomy: the labels a model can emit, how they group for display,
//! and which model versions were trained against them.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
#[cfg(feature = "codegen")]
use ts_rs::TS;

use crate::error::TaxonomyError;

const BUILTIN_TAXONOMY: &str = include_str!("taxonomy.toml");

/// One class the model can predict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
pub struct ClassLabel {
    pub index: usize,
    pub name: String,
    pub readable_name: String,
    pub description: String,
}

/// A named bucket of class names, e.g. "Glass".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
pub struct ClassGroup {
    pub name: String,
    pub classes: Vec<String>,
}

/// A complete grouping scheme over the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
pub struct GroupConfig {
    pub name: String,
    pub buckets: Vec<ClassGroup>,
}

/// A released model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
pub struct ModelInfo {
    pub version: String,
    pub date: String,
    pub url: String,
    pub model_size: String,
    pub accuracy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub classes: Vec<ClassLabel>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl Taxonomy {
    /// The taxonomy compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_toml_str(BUILTIN_TAXONOMY).expect("built-in taxonomy is valid")
    }

    pub fn from_toml_str(s: &str) -> Result<Self, TaxonomyError> {
        let taxonomy: Taxonomy = toml::from_str(s)?;
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), TaxonomyError> {
        if self.classes.is_empty() {
            return Err(TaxonomyError::Empty);
        }
        let mut indices = HashSet::new();
        let mut names = HashSet::new();
        for class in &self.classes {
            if !indices.insert(class.index) {
                return Err(TaxonomyError::Duplicate {
                    field: "index",
                    value: class.index.to_string(),
                });
            }
            if !names.insert(class.name.as_str()) {
                return Err(TaxonomyError::Duplicate {
                    field: "name",
                    value: class.name.clone(),
                });
            }
        }
        for bucket in self.groups.iter().flat_map(|g| &g.buckets) {
            if let Some(unknown) = bucket.classes.iter().find(|c| !names.contains(c.as_str())) {
                return Err(TaxonomyError::UnknownGroupClass {
                    bucket: bucket.name.clone(),
                    class: unknown.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn class_by_index(&self, index: usize) -> Option<&ClassLabel> {
        self.classes.iter().find(|c| c.index == index)
    }

    /// Map a probability vector to the class with the highest score.
    ///
    /// Returns `None` for an empty vector or when the winning index has no class.
    pub fn predicted_class(&self, probabilities: &[f32]) -> Option<&ClassLabel> {
        argmax(probabilities).and_then(|i| self.class_by_index(i))
    }

    pub fn latest_model(&self) -> Option<&ModelInfo> {
        self.models.last()
    }
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, top)) if top >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
