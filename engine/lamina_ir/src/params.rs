//! Flat parameter vectors shared by the optimizer and custom functions.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::ops::Deref;

/// Ordered sequence of fit parameters.
///
/// Positions carry no meaning of their own; the mapping from index to
/// physical quantity is a contract between the optimizer and the function
/// author. Stored inline for typical fit sizes so building one per optimizer
/// iteration does not allocate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterVector(SmallVec<[f64; 16]>);

impl ParameterVector {
    /// Create from any sequence of values.
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        ParameterVector(values.into_iter().collect())
    }

    /// Copy from a slice.
    pub fn from_slice(values: &[f64]) -> Self {
        ParameterVector(SmallVec::from_slice(values))
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for ParameterVector {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for ParameterVector {
    fn from(values: Vec<f64>) -> Self {
        ParameterVector(SmallVec::from_vec(values))
    }
}

impl From<&[f64]> for ParameterVector {
    fn from(values: &[f64]) -> Self {
        Self::from_slice(values)
    }
}

impl<const N: usize> From<[f64; N]> for ParameterVector {
    fn from(values: [f64; N]) -> Self {
        Self::from_slice(&values)
    }
}

impl FromIterator<f64> for ParameterVector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self::new(iter)
    }
}
