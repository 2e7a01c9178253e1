//! External runtime custom functions, hosted by the `lamina-host` binary.

#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

mod common;

use std::thread;
use std::time::{Duration, Instant};

use lamina_bridge::{
    BridgeConfig, BridgeError, CancelSource, ErrorKind, EvalError, EvaluationDriver, RuntimeCommand,
};
use lamina_ir::{
    Contrast, FunctionId, FunctionReference, Language, ModelKind, ParameterVector, Project,
    RuntimeName, SourceLocator,
};
use pretty_assertions::assert_eq;

use common::{demo_script, demos, host_command, host_config, hosted, write_script};

const SLAB: &str = "fn slab(p, bi, bo, c) { return [[[p[0], p[1], p[2]]], bo[c]]; }";

/// Never returns; the loop counter keeps it busy.
const SPIN: &str = "
fn spin(p, bi, bo, c) {
    let i = 0;
    while true { i = i + 1; }
    return [[], 0];
}";

fn layer_project(references: &[FunctionReference], contrasts: &[u32]) -> Project {
    let mut project = Project::new("hosted", ModelKind::layers())
        .with_parameters(["thickness", "sld", "roughness"])
        .with_bulk(vec![2.07, 2.07], vec![6.35, -0.56]);
    for reference in references {
        project = project.with_custom_file(reference.clone());
    }
    for (i, &function) in contrasts.iter().enumerate() {
        project = project.with_contrast(Contrast::new(format!("c{i}"), FunctionId(function)));
    }
    project
}

fn params() -> ParameterVector {
    ParameterVector::from([12.0, 2.5, 4.0])
}

#[test]
fn hosted_and_in_process_scripts_agree() {
    let bilayer = |language: Language| {
        let reference = demo_script(0, "bilayer.lam");
        let reference = FunctionReference::new(reference.id, language, reference.locator);
        Project::new("bilayer", ModelKind::layers())
            .with_parameters(["a", "b", "c", "d", "e", "f"])
            .with_bulk(vec![2.07, 2.07], vec![6.35, -0.56])
            .with_custom_file(reference)
            .with_contrast(Contrast::new("D2O", FunctionId(0)))
            .with_contrast(Contrast::new("H2O", FunctionId(0)))
    };
    let params = ParameterVector::from([15.0, 3.4, 40.0, 1.0, 0.2, 3.0]);
    let driver = EvaluationDriver::new(host_config());

    let local = driver
        .evaluate(&bilayer(Language::Interpreted), &params)
        .unwrap();
    let remote = driver
        .evaluate(&bilayer(Language::External(RuntimeName::host())), &params)
        .unwrap();
    assert_eq!(local, remote);

    // Same slot, new language tag: the interpreted handle was evicted.
    let stats = driver.registry().stats();
    assert_eq!(stats.loads, 2);
    assert_eq!(stats.releases, 1);
    assert_eq!(stats.sessions_started, 1);
    let handle = driver.registry().cached(FunctionId(0)).unwrap();
    assert_eq!(handle.backend(), "external-runtime");
}

#[test]
fn one_session_serves_every_function() {
    let dir = tempfile::tempdir().unwrap();
    let a = hosted(0, write_script(dir.path(), "slab.lam", SLAB));
    let b = hosted(1, demo_script(1, "bilayer.lam").locator);
    let driver = EvaluationDriver::new(host_config());

    let project = layer_project(&[a.clone()], &[0, 0]);
    for _ in 0..5 {
        let output = driver.evaluate(&project, &params()).unwrap();
        assert_eq!(output.contrasts[1].substrate_roughness, Some(-0.56));
    }
    let six = Project::new("bilayer", ModelKind::layers())
        .with_parameters(["a", "b", "c", "d", "e", "f"])
        .with_bulk(vec![2.07], vec![6.35])
        .with_custom_file(b)
        .with_contrast(Contrast::new("D2O", FunctionId(1)));
    driver
        .evaluate(&six, &ParameterVector::from([15.0, 3.4, 40.0, 1.0, 0.2, 3.0]))
        .unwrap();

    let stats = driver.registry().stats();
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.loads, 2);
}

#[test]
fn runtime_index_base_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    // A one-based runtime sees contrast 0 as 1.
    let one_based = write_script(
        dir.path(),
        "one_based.lam",
        "fn one_based(p, bi, bo, c) { return [[[p[0], p[1], p[2]]], bo[c - 1]]; }",
    );
    let config = BridgeConfig::default()
        .with_runtime(RuntimeName::host(), host_command().with_index_base(1));
    let driver = EvaluationDriver::new(config);
    let output = driver
        .evaluate(&layer_project(&[hosted(0, one_based)], &[0, 0]), &params())
        .unwrap();
    let roughness: Vec<_> = output
        .contrasts
        .iter()
        .map(|c| c.substrate_roughness)
        .collect();
    assert_eq!(roughness, vec![Some(6.35), Some(-0.56)]);
}

#[test]
fn timeout_kills_the_session_and_the_next_resolve_rebuilds_it() {
    let dir = tempfile::tempdir().unwrap();
    let slab = hosted(0, write_script(dir.path(), "slab.lam", SLAB));
    let spin = hosted(1, write_script(dir.path(), "spin.lam", SPIN));
    let timeout = Duration::from_millis(300);
    let driver = EvaluationDriver::new(host_config().with_call_timeout(timeout));
    let healthy = layer_project(&[slab.clone(), spin.clone()], &[0]);
    let hanging = layer_project(&[slab, spin], &[1]);

    driver.evaluate(&healthy, &params()).unwrap();
    let first = driver.registry().cached(FunctionId(0)).unwrap();

    let started = Instant::now();
    let err = driver.evaluate(&hanging, &params()).unwrap_err();
    let elapsed = started.elapsed();
    assert!(
        matches!(
            &err,
            EvalError::Function {
                function: FunctionId(1),
                source: BridgeError::Timeout {
                    operation: "call",
                    ..
                },
                ..
            }
        ),
        "{err}"
    );
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(5), "took {elapsed:?}");

    // The slab handle shared the dead session.
    assert!(!first.is_healthy());
    let output = driver.evaluate(&healthy, &params()).unwrap();
    assert_eq!(output.contrasts[0].substrate_roughness, Some(6.35));

    let stats = driver.registry().stats();
    assert_eq!(stats.sessions_started, 2);
    let second = driver.registry().cached(FunctionId(0)).unwrap();
    assert_ne!(first.id(), second.id());
    assert!(first.is_released());
}

#[test]
fn cancel_aborts_the_wait() {
    let dir = tempfile::tempdir().unwrap();
    let spin = hosted(0, write_script(dir.path(), "spin.lam", SPIN));
    let driver = EvaluationDriver::new(host_config());
    let project = layer_project(&[spin], &[0]);
    let source = CancelSource::new();

    let started = Instant::now();
    let token = source.token();
    let result = thread::scope(|scope| {
        let evaluation = scope.spawn(|| driver.evaluate_with(&project, &params(), &token));
        thread::sleep(Duration::from_millis(200));
        source.cancel();
        evaluation.join().unwrap()
    });
    assert_eq!(result, Err(EvalError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!driver.registry().cached(FunctionId(0)).unwrap().is_healthy());
}

#[test]
fn token_outliving_its_source_does_not_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let slab = hosted(0, write_script(dir.path(), "slab.lam", SLAB));
    let driver = EvaluationDriver::new(host_config());
    let project = layer_project(&[slab], &[0, 0]);
    let token = CancelSource::new().token();

    let output = driver.evaluate_with(&project, &params(), &token).unwrap();
    assert_eq!(output.contrasts[1].substrate_roughness, Some(-0.56));
    assert!(!token.is_cancelled());
    assert!(driver.registry().cached(FunctionId(0)).unwrap().is_healthy());
    assert_eq!(driver.registry().stats().sessions_started, 1);
}

#[test]
fn host_reports_load_and_signature_errors() {
    let dir = tempfile::tempdir().unwrap();
    let driver = EvaluationDriver::new(host_config());

    let missing = hosted(0, SourceLocator::new(dir.path(), "missing.lam"));
    let err = driver
        .evaluate(&layer_project(&[missing], &[0]), &params())
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Load));
    assert!(driver.registry().is_empty());

    let xy = hosted(0, write_script(dir.path(), "xy.lam", "fn xy(x, p) { return x; }"));
    let err = driver
        .evaluate(&layer_project(&[xy], &[0]), &params())
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Signature));
    assert!(driver.registry().is_empty());

    // Neither failure hurt the session.
    assert_eq!(driver.registry().stats().sessions_started, 1);
}

#[test]
fn runtime_call_errors_are_invocation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let broken = hosted(
        0,
        write_script(
            dir.path(),
            "broken.lam",
            "fn broken(p, bi, bo, c) { return [[[p[7], 1, 1]], 0]; }",
        ),
    );
    let driver = EvaluationDriver::new(host_config());
    let err = driver
        .evaluate(&layer_project(&[broken], &[0]), &params())
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Invocation));
    assert!(driver.registry().cached(FunctionId(0)).unwrap().is_healthy());
}

#[test]
fn unavailable_runtimes() {
    let slab = || demo_script(0, "bilayer.lam").locator;

    let config = BridgeConfig::default().with_runtime(
        RuntimeName::host(),
        RuntimeCommand::new(demos().join("no-such-runtime")),
    );
    let driver = EvaluationDriver::new(config);
    let err = driver
        .evaluate(&layer_project(&[hosted(0, slab())], &[0]), &params())
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RuntimeUnavailable));
    assert!(driver.registry().is_empty());

    let matlab = FunctionReference::new(
        FunctionId(0),
        Language::External(RuntimeName::new("matlab")),
        slab(),
    );
    let driver = EvaluationDriver::new(host_config());
    let err = driver
        .evaluate(&layer_project(&[matlab], &[0]), &params())
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RuntimeUnavailable));
}

#[cfg(unix)]
#[test]
fn handshake_is_bounded() {
    let silent = BridgeConfig::default()
        .with_startup_timeout(Duration::from_millis(200))
        .with_runtime(
            RuntimeName::host(),
            RuntimeCommand::new("sleep").with_args(["5"]),
        );
    let driver = EvaluationDriver::new(silent);
    let started = Instant::now();
    let err = driver
        .evaluate(
            &layer_project(&[hosted(0, demo_script(0, "bilayer.lam").locator)], &[0]),
            &params(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EvalError::Function {
            source: BridgeError::Timeout {
                operation: "handshake",
                ..
            },
            ..
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(4));

    let exits = BridgeConfig::default().with_runtime(RuntimeName::host(), RuntimeCommand::new("true"));
    let err = EvaluationDriver::new(exits)
        .evaluate(
            &layer_project(&[hosted(0, demo_script(0, "bilayer.lam").locator)], &[0]),
            &params(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RuntimeUnavailable));
}

#[test]
fn prewarm_starts_the_session_ahead_of_time() {
    let dir = tempfile::tempdir().unwrap();
    let slab = hosted(0, write_script(dir.path(), "slab.lam", SLAB));
    let driver = EvaluationDriver::new(host_config());
    driver.registry().prewarm(&RuntimeName::host());

    let deadline = Instant::now() + Duration::from_secs(20);
    while driver.registry().stats().sessions_started == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(driver.registry().stats().sessions_started, 1);

    driver.evaluate(&layer_project(&[slab], &[0]), &params()).unwrap();
    assert_eq!(driver.registry().stats().sessions_started, 1);
}
