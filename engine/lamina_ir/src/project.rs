//! Project schema: custom function slots and the contrasts that use them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Contract, FunctionId, FunctionReference, ModelKind};

/// One row of the evaluation schema.
///
/// The order of contrasts in a project is the physical evaluation order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contrast {
    pub name: String,
    /// Custom function computing this contrast.
    pub function: FunctionId,
    /// Domain index for domain-resolved projects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<usize>,
}

impl Contrast {
    pub fn new(name: impl Into<String>, function: FunctionId) -> Self {
        Contrast {
            name: name.into(),
            function,
            domain: None,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: usize) -> Self {
        self.domain = Some(domain);
        self
    }
}

/// Slot table of custom functions, keyed by identifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFiles(BTreeMap<FunctionId, FunctionReference>);

impl CustomFiles {
    pub fn get(&self, id: FunctionId) -> Option<&FunctionReference> {
        self.0.get(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// References in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionReference> {
        self.0.values()
    }

    fn insert(&mut self, reference: FunctionReference) -> Option<FunctionReference> {
        self.0.insert(reference.id, reference)
    }
}

/// Schema violations detected by [`Project::validate`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProjectError {
    #[error("contrast `{contrast}` uses custom function {function}, which is not configured")]
    UnknownFunction { contrast: String, function: FunctionId },
    #[error("contrast `{contrast}` needs a domain index in a domain-resolved project")]
    MissingDomain { contrast: String },
    #[error("contrast `{contrast}` has a domain index but the project has no domains")]
    UnexpectedDomain { contrast: String },
    #[error("custom XY model has an empty depth grid")]
    EmptyGrid,
    #[error("layer model needs 3 or 4 columns, got {0}")]
    Columns(usize),
}

/// A project as seen by the evaluation core.
///
/// Custom function slots can only change through
/// [`replace_custom_file`](Project::replace_custom_file), so the owner of the
/// project always sees which slots were rewritten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub parameter_names: Vec<String>,
    pub bulk_in: Vec<f64>,
    pub bulk_out: Vec<f64>,
    pub model: ModelKind,
    /// Whether contrasts are resolved per domain.
    #[serde(default)]
    pub domains: bool,
    custom_files: CustomFiles,
    pub contrasts: Vec<Contrast>,
}

impl Project {
    pub fn new(name: impl Into<String>, model: ModelKind) -> Self {
        Project {
            name: name.into(),
            parameter_names: Vec::new(),
            bulk_in: Vec::new(),
            bulk_out: Vec::new(),
            model,
            domains: false,
            custom_files: CustomFiles::default(),
            contrasts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parameters<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.parameter_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_bulk(mut self, bulk_in: Vec<f64>, bulk_out: Vec<f64>) -> Self {
        self.bulk_in = bulk_in;
        self.bulk_out = bulk_out;
        self
    }

    #[must_use]
    pub fn with_domains(mut self, domains: bool) -> Self {
        self.domains = domains;
        self
    }

    #[must_use]
    pub fn with_custom_file(mut self, reference: FunctionReference) -> Self {
        self.custom_files.insert(reference);
        self
    }

    #[must_use]
    pub fn with_contrast(mut self, contrast: Contrast) -> Self {
        self.contrasts.push(contrast);
        self
    }

    /// The contract every custom function of this project must honor.
    pub fn contract(&self) -> Contract {
        Contract::for_model(&self.model, self.parameter_names.len(), self.domains)
    }

    pub fn custom_file(&self, id: FunctionId) -> Option<&FunctionReference> {
        self.custom_files.get(id)
    }

    pub fn custom_files(&self) -> &CustomFiles {
        &self.custom_files
    }

    /// Overwrite the slot named by `reference.id`, returning the previous
    /// reference.
    ///
    /// Any handle cached for the old reference must be invalidated before
    /// this is called; `lamina_bridge::Workspace` does both in order.
    pub fn replace_custom_file(&mut self, reference: FunctionReference) -> Option<FunctionReference> {
        self.custom_files.insert(reference)
    }

    /// Check that every contrast can be evaluated.
    pub fn validate(&self) -> Result<(), ProjectError> {
        match &self.model {
            ModelKind::CustomLayers { columns } if !(3..=4).contains(columns) => {
                return Err(ProjectError::Columns(*columns));
            }
            ModelKind::CustomXY { x } if x.is_empty() => return Err(ProjectError::EmptyGrid),
            _ => {}
        }
        for contrast in &self.contrasts {
            if self.custom_files.get(contrast.function).is_none() {
                return Err(ProjectError::UnknownFunction {
                    contrast: contrast.name.clone(),
                    function: contrast.function,
                });
            }
            match (self.domains, contrast.domain) {
                (true, None) => {
                    return Err(ProjectError::MissingDomain {
                        contrast: contrast.name.clone(),
                    })
                }
                (false, Some(_)) => {
                    return Err(ProjectError::UnexpectedDomain {
                        contrast: contrast.name.clone(),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Language, SourceLocator};
    use pretty_assertions::assert_eq;

    fn reference(slot: u32, file: &str) -> FunctionReference {
        FunctionReference::new(
            FunctionId(slot),
            Language::Interpreted,
            SourceLocator::new("/models", file),
        )
    }

    fn bilayer() -> Project {
        Project::new("bilayer", ModelKind::layers())
            .with_parameters(["thickness", "sld", "roughness"])
            .with_bulk(vec![2.07], vec![6.35])
            .with_custom_file(reference(0, "bilayer.lam"))
            .with_contrast(Contrast::new("D2O", FunctionId(0)))
    }

    #[test]
    fn contract_follows_schema() {
        let contract = bilayer().contract();
        assert_eq!(contract.params, 3);
        assert_eq!(contract.columns, 3);
        assert_eq!(contract.arity, 4);
    }

    #[test]
    fn replace_returns_previous_reference() {
        let mut project = bilayer();
        let old = project.replace_custom_file(reference(0, "other.lam"));
        assert_eq!(old, Some(reference(0, "bilayer.lam")));
        assert_eq!(
            project.custom_file(FunctionId(0)).map(|r| r.name.as_str()),
            Some("other")
        );
        assert_eq!(project.custom_files().len(), 1);
    }

    #[test]
    fn validate_catches_schema_errors() {
        assert_eq!(bilayer().validate(), Ok(()));

        let unknown = bilayer().with_contrast(Contrast::new("H2O", FunctionId(7)));
        assert!(matches!(
            unknown.validate(),
            Err(ProjectError::UnknownFunction { .. })
        ));

        let missing_domain = bilayer().with_domains(true);
        assert!(matches!(
            missing_domain.validate(),
            Err(ProjectError::MissingDomain { .. })
        ));

        let stray_domain =
            bilayer().with_contrast(Contrast::new("H2O", FunctionId(0)).with_domain(1));
        assert!(matches!(
            stray_domain.validate(),
            Err(ProjectError::UnexpectedDomain { .. })
        ));

        let empty_grid = Project::new("xy", ModelKind::xy(Vec::new()));
        assert_eq!(empty_grid.validate(), Err(ProjectError::EmptyGrid));
    }
}
