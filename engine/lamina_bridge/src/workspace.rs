//! A project bound to its own registry.

use lamina_ir::{EvalOutput, FunctionReference, ParameterVector, Project, ProjectError};

use crate::{BridgeConfig, CancelToken, EvalError, EvaluationDriver};

/// Owns a project and the only registry that caches its functions.
///
/// Custom function slots change only through
/// [`replace_custom_file`](Self::replace_custom_file), which invalidates the
/// cached handle before the slot is overwritten. Dropping the workspace
/// releases every handle.
#[derive(Debug)]
pub struct Workspace {
    project: Project,
    driver: EvaluationDriver,
}

impl Workspace {
    pub fn new(project: Project, config: BridgeConfig) -> Result<Self, ProjectError> {
        project.validate()?;
        tracing::debug!(
            project = %project.name,
            functions = project.custom_files().len(),
            contrasts = project.contrasts.len(),
            "opened workspace"
        );
        Ok(Workspace {
            project,
            driver: EvaluationDriver::new(config),
        })
    }

    pub fn evaluate(&self, params: &ParameterVector) -> Result<EvalOutput, EvalError> {
        self.driver.evaluate(&self.project, params)
    }

    pub fn evaluate_with(
        &self,
        params: &ParameterVector,
        cancel: &CancelToken,
    ) -> Result<EvalOutput, EvalError> {
        self.driver.evaluate_with(&self.project, params, cancel)
    }

    pub fn evaluate_population(
        &self,
        population: &[ParameterVector],
    ) -> Vec<Result<EvalOutput, EvalError>> {
        self.driver.evaluate_population(&self.project, population)
    }

    /// Point a slot at another function, returning the previous reference.
    pub fn replace_custom_file(
        &mut self,
        reference: FunctionReference,
    ) -> Option<FunctionReference> {
        let id = reference.id;
        let invalidated = self.driver.registry().invalidate(id);
        tracing::debug!(function = %id, invalidated, locator = %reference.locator, "replacing custom file");
        self.project.replace_custom_file(reference)
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn driver(&self) -> &EvaluationDriver {
        &self.driver
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let released = self.driver.registry().clear();
        tracing::debug!(project = %self.project.name, released, "closed workspace");
    }
}
