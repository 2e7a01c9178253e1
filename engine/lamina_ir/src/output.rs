//! Invocation arguments and decoded evaluation output.

use serde::{Deserialize, Serialize};

use crate::FunctionId;

/// Borrowed arguments handed to one custom-function call.
///
/// Indices are zero-based; adapters translate to the convention of the
/// runtime they talk to.
#[derive(Copy, Clone, Debug)]
pub struct Invocation<'a> {
    pub params: &'a [f64],
    pub bulk_in: &'a [f64],
    pub bulk_out: &'a [f64],
    /// Depth grid for XY models, empty for layer models.
    pub x: &'a [f64],
    pub contrast: usize,
    pub domain: Option<usize>,
}

impl<'a> Invocation<'a> {
    pub fn new(params: &'a [f64]) -> Self {
        Invocation {
            params,
            bulk_in: &[],
            bulk_out: &[],
            x: &[],
            contrast: 0,
            domain: None,
        }
    }

    #[must_use]
    pub fn with_bulk(mut self, bulk_in: &'a [f64], bulk_out: &'a [f64]) -> Self {
        self.bulk_in = bulk_in;
        self.bulk_out = bulk_out;
        self
    }

    #[must_use]
    pub fn with_x(mut self, x: &'a [f64]) -> Self {
        self.x = x;
        self
    }

    #[must_use]
    pub fn with_contrast(mut self, contrast: usize, domain: Option<usize>) -> Self {
        self.contrast = contrast;
        self.domain = domain;
        self
    }
}

/// Flat row-major values returned by an adapter, before decoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    pub values: Vec<f64>,
    /// Values per row as reported by the function.
    pub columns: usize,
    #[serde(default)]
    pub scalar: Option<f64>,
}

impl RawOutput {
    pub fn new(values: Vec<f64>, columns: usize) -> Self {
        RawOutput {
            values,
            columns,
            scalar: None,
        }
    }

    #[must_use]
    pub fn with_scalar(mut self, scalar: f64) -> Self {
        self.scalar = Some(scalar);
        self
    }
}

/// Sequence of (independent variable, computed value) pairs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Profile {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

/// Layer rows produced by a custom layer function.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerTable {
    pub columns: usize,
    pub values: Vec<f64>,
}

impl LayerTable {
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.columns.max(1))
    }

    pub fn row_count(&self) -> usize {
        self.values.len().checked_div(self.columns).unwrap_or(0)
    }
}

/// Decoded output of one contrast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContrastOutput {
    pub function: FunctionId,
    pub contrast: usize,
    pub profile: Profile,
    /// The raw layer rows, for layer models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<LayerTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substrate_roughness: Option<f64>,
}

/// Result of one evaluation: one entry per contrast, in schema order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalOutput {
    pub contrasts: Vec<ContrastOutput>,
}

impl EvalOutput {
    pub fn len(&self) -> usize {
        self.contrasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contrasts.is_empty()
    }

    pub fn get(&self, contrast: usize) -> Option<&ContrastOutput> {
        self.contrasts.get(contrast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_rows_split_by_columns() {
        let table = LayerTable {
            columns: 3,
            values: vec![10.0, 1.0, 3.0, 20.0, 2.0, 4.0],
        };
        let rows: Vec<&[f64]> = table.rows().collect();
        assert_eq!(rows, vec![&[10.0, 1.0, 3.0][..], &[20.0, 2.0, 4.0][..]]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn profile_points_pair_up() {
        let profile = Profile {
            x: vec![0.0, 1.0],
            y: vec![2.0, 3.0],
        };
        assert_eq!(profile.points().collect::<Vec<_>>(), vec![(0.0, 2.0), (1.0, 3.0)]);
    }

    #[test]
    fn invocation_builder() {
        let params = [1.0, 2.0];
        let x = [0.5];
        let call = Invocation::new(&params)
            .with_x(&x)
            .with_contrast(2, Some(1));
        assert_eq!(call.params, &params);
        assert_eq!(call.x, &x);
        assert_eq!(call.contrast, 2);
        assert_eq!(call.domain, Some(1));
        assert!(call.bulk_in.is_empty());
    }
}
