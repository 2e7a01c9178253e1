//! Property-based tests for evaluation through the bridge.
//!
//! Random parameter vectors go through the bilayer demo script; the decoded
//! layers and profile are checked against the same model computed in Rust.

#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

mod common;

use std::sync::LazyLock;

use lamina_bridge::EvaluationDriver;
use lamina_ir::{Contrast, FunctionId, ModelKind, ParameterVector, Project};
use proptest::prelude::*;

const BULK_OUT: [f64; 3] = [6.35, -0.56, 2.07];

static DRIVER: LazyLock<EvaluationDriver> = LazyLock::new(EvaluationDriver::default);

static PROJECT: LazyLock<Project> = LazyLock::new(|| {
    Project::new("bilayer", ModelKind::layers())
        .with_parameters(["a", "b", "c", "d", "e", "f"])
        .with_bulk(vec![2.07; 3], BULK_OUT.to_vec())
        .with_custom_file(common::demo_script(0, "bilayer.lam"))
        .with_contrast(Contrast::new("D2O", FunctionId(0)))
        .with_contrast(Contrast::new("H2O", FunctionId(0)))
        .with_contrast(Contrast::new("CMSi", FunctionId(0)))
});

fn arb_params() -> impl Strategy<Value = [f64; 6]> {
    (
        0.0..200.0f64,
        -1.0..7.0f64,
        0.0..200.0f64,
        -1.0..7.0f64,
        0.0..1.0f64,
        0.0..20.0f64,
    )
        .prop_map(|(a, b, c, d, e, f)| [a, b, c, d, e, f])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn layers_and_profile_follow_the_model(params in arb_params()) {
        let output = DRIVER
            .evaluate(&PROJECT, &ParameterVector::from(params))
            .unwrap();
        prop_assert_eq!(output.len(), BULK_OUT.len());

        let [oxide, oxide_sld, film, film_sld, solvent, roughness] = params;
        for (contrast, result) in output.contrasts.iter().enumerate() {
            let mixed = film_sld * (1.0 - solvent) + BULK_OUT[contrast] * solvent;
            let layers = result.layers.as_ref().unwrap();
            prop_assert_eq!(layers.row_count(), 2);
            prop_assert_eq!(
                &layers.values,
                &vec![oxide, oxide_sld, roughness, film, mixed, roughness]
            );
            prop_assert_eq!(&result.profile.x, &vec![0.0, oxide]);
            prop_assert_eq!(&result.profile.y, &vec![oxide_sld, mixed]);
            prop_assert_eq!(result.substrate_roughness, Some(roughness));
        }
    }

    #[test]
    fn evaluation_is_deterministic(params in arb_params()) {
        let params = ParameterVector::from(params);
        let first = DRIVER.evaluate(&PROJECT, &params);
        let second = DRIVER.evaluate(&PROJECT, &params);
        prop_assert_eq!(first, second);
        // Every case after the first is served from the cache.
        prop_assert_eq!(DRIVER.registry().stats().loads, 1);
    }

    #[test]
    fn populations_match_serial_evaluation(
        population in prop::collection::vec(arb_params(), 1..16)
    ) {
        let population: Vec<ParameterVector> =
            population.into_iter().map(ParameterVector::from).collect();
        let parallel = DRIVER.evaluate_population(&PROJECT, &population);
        for (params, result) in population.iter().zip(parallel) {
            prop_assert_eq!(result, DRIVER.evaluate(&PROJECT, params));
        }
    }
}
