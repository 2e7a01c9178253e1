//! Evaluation driver: the optimizer's single entry point.

use std::sync::Arc;

use lamina_ir::{EvalOutput, Invocation, ParameterVector, Project};
use rayon::prelude::*;

use crate::marshal;
use crate::{BridgeConfig, BridgeError, CancelToken, EvalError, FunctionRegistry};

/// Evaluates projects against parameter vectors through one registry.
///
/// Contrasts run serially in schema order. The first failure aborts the
/// evaluation; no partial output is returned.
#[derive(Debug)]
pub struct EvaluationDriver {
    registry: FunctionRegistry,
    config: Arc<BridgeConfig>,
}

impl EvaluationDriver {
    pub fn new(config: BridgeConfig) -> Self {
        let config = Arc::new(config);
        EvaluationDriver {
            registry: FunctionRegistry::new(Arc::clone(&config)),
            config,
        }
    }

    pub fn evaluate(
        &self,
        project: &Project,
        params: &ParameterVector,
    ) -> Result<EvalOutput, EvalError> {
        self.evaluate_with(project, params, &CancelToken::none())
    }

    /// Like [`evaluate`](Self::evaluate), observing `cancel` between
    /// contrasts and inside external-runtime waits.
    pub fn evaluate_with(
        &self,
        project: &Project,
        params: &ParameterVector,
        cancel: &CancelToken,
    ) -> Result<EvalOutput, EvalError> {
        let contract = project.contract();
        if params.len() != contract.params {
            return Err(EvalError::ParameterCount {
                expected: contract.params,
                got: params.len(),
            });
        }
        let _span = tracing::debug_span!(
            "evaluate",
            project = %project.name,
            contrasts = project.contrasts.len(),
            params = params.len()
        )
        .entered();

        // Every slot must be configured before anything is loaded.
        let references = project
            .contrasts
            .iter()
            .enumerate()
            .map(|(index, contrast)| {
                project
                    .custom_file(contrast.function)
                    .ok_or(EvalError::UnknownFunction {
                        function: contrast.function,
                        contrast: index,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut output = EvalOutput {
            contrasts: Vec::with_capacity(project.contrasts.len()),
        };
        for (index, (contrast, reference)) in project.contrasts.iter().zip(references).enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(contrast = index, "evaluation cancelled");
                return Err(EvalError::Cancelled);
            }
            let tag = |err: BridgeError| EvalError::function(reference.id, index, err);

            let handle = self.registry.resolve(reference, &contract).map_err(tag)?;
            let call = Invocation::new(params)
                .with_bulk(&project.bulk_in, &project.bulk_out)
                .with_x(project.model.x())
                .with_contrast(index, contrast.domain);
            let raw = handle.invoke(&call, cancel).map_err(tag)?;
            let decoded = marshal::decode(&project.model, &contract, reference.id, index, raw)
                .map_err(tag)?;
            output.contrasts.push(decoded);
        }
        Ok(output)
    }

    /// Evaluate every member of a population in parallel.
    ///
    /// Results are in population order. Native handles run concurrently;
    /// interpreted and external calls serialize on their shared interpreter
    /// or session.
    pub fn evaluate_population(
        &self,
        project: &Project,
        population: &[ParameterVector],
    ) -> Vec<Result<EvalOutput, EvalError>> {
        population
            .par_iter()
            .map(|params| self.evaluate(project, params))
            .collect()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Default for EvaluationDriver {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_ir::{Contrast, FunctionId, FunctionReference, Language, ModelKind, SourceLocator};

    #[test]
    fn parameter_count_is_checked_first() {
        let driver = EvaluationDriver::default();
        let project = Project::new("p", ModelKind::layers()).with_parameters(["a", "b"]);
        assert_eq!(
            driver.evaluate(&project, &ParameterVector::from([1.0])),
            Err(EvalError::ParameterCount {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn unconfigured_function_is_reported() {
        let driver = EvaluationDriver::default();
        let project = Project::new("p", ModelKind::layers())
            .with_parameters(["a"])
            .with_contrast(Contrast::new("D2O", FunctionId(4)));
        assert_eq!(
            driver.evaluate(&project, &ParameterVector::from([1.0])),
            Err(EvalError::UnknownFunction {
                function: FunctionId(4),
                contrast: 0
            })
        );
        assert!(driver.registry().is_empty());
    }

    #[test]
    fn unconfigured_function_is_reported_before_any_load() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        std::fs::write(
            dir.path().join("slab.lam"),
            "fn slab(p, bi, bo, c) { return [[[p[0], 1, 1]], 0]; }",
        )
        .unwrap_or_else(|e| panic!("write: {e}"));
        let project = Project::new("p", ModelKind::layers())
            .with_parameters(["a"])
            .with_custom_file(FunctionReference::new(
                FunctionId(0),
                Language::Interpreted,
                SourceLocator::new(dir.path(), "slab.lam"),
            ))
            .with_contrast(Contrast::new("D2O", FunctionId(0)))
            .with_contrast(Contrast::new("H2O", FunctionId(7)));

        let driver = EvaluationDriver::default();
        assert_eq!(
            driver.evaluate(&project, &ParameterVector::from([1.0])),
            Err(EvalError::UnknownFunction {
                function: FunctionId(7),
                contrast: 1
            })
        );
        assert_eq!(driver.registry().stats().loads, 0);
        assert!(driver.registry().is_empty());
    }

    #[test]
    fn project_without_contrasts_is_empty() {
        let driver = EvaluationDriver::default();
        let project = Project::new("p", ModelKind::layers());
        let output = driver.evaluate(&project, &ParameterVector::default());
        assert_eq!(output.map(|o| o.len()), Ok(0));
    }
}
