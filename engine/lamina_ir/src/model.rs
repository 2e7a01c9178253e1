//! Model kinds and the calling contract they impose on custom functions.

use serde::{Deserialize, Serialize};

/// What a project's custom functions compute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Functions return a layer table, one row per layer:
    /// `[thickness, sld, roughness]`, plus hydration when `columns == 4`.
    CustomLayers { columns: usize },
    /// Functions return an SLD value for every point of the depth grid `x`.
    #[serde(rename = "custom_xy")]
    CustomXY { x: Vec<f64> },
}

impl ModelKind {
    /// Layer model with `[thickness, sld, roughness]` rows.
    pub fn layers() -> Self {
        ModelKind::CustomLayers { columns: 3 }
    }

    /// Layer model with an extra hydration column.
    pub fn hydrated_layers() -> Self {
        ModelKind::CustomLayers { columns: 4 }
    }

    pub fn xy(x: impl Into<Vec<f64>>) -> Self {
        ModelKind::CustomXY { x: x.into() }
    }

    /// Values per output row.
    pub fn columns(&self) -> usize {
        match self {
            ModelKind::CustomLayers { columns } => *columns,
            ModelKind::CustomXY { .. } => 1,
        }
    }

    /// Depth grid handed to XY functions; empty for layer models.
    pub fn x(&self) -> &[f64] {
        match self {
            ModelKind::CustomLayers { .. } => &[],
            ModelKind::CustomXY { x } => x,
        }
    }

    /// Number of arguments the entry point must declare.
    ///
    /// Layer functions take `(params, bulk_in, bulk_out, contrast)` and a
    /// trailing `domain` in domain-resolved projects; XY functions take
    /// `(x, params)`.
    pub fn arity(&self, domains: bool) -> usize {
        match self {
            ModelKind::CustomLayers { .. } if domains => 5,
            ModelKind::CustomLayers { .. } => 4,
            ModelKind::CustomXY { .. } => 2,
        }
    }

    pub fn is_layers(&self) -> bool {
        matches!(self, ModelKind::CustomLayers { .. })
    }
}

/// The fixed shape every custom function of a project must honor.
///
/// Derived from the project schema; checked at load time where the
/// language runtime can report what a function declares.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contract {
    /// Length of the parameter vector.
    pub params: usize,
    /// Values per output row.
    pub columns: usize,
    /// Arguments the entry point declares.
    pub arity: usize,
    /// Whether a substrate roughness scalar accompanies the output.
    pub returns_scalar: bool,
}

impl Contract {
    pub fn for_model(model: &ModelKind, params: usize, domains: bool) -> Self {
        Contract {
            params,
            columns: model.columns(),
            arity: model.arity(domains),
            returns_scalar: model.is_layers(),
        }
    }
}
