//! End-to-end scenarios against a real temp-directory workflow, exercised through `Engine`.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use lb_core::config::Config;
use lb_core::error::BuildError;
use lb_core::TracingLogger;
use lb_engine::Engine;

fn config(yaml: &str) -> Config {
    Config::from_str(yaml, &HashMap::new()).unwrap()
}

#[tokio::test]
async fn first_build_runs_everything() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "hello").unwrap();
    let output = dir.path().join("out.txt");

    let yaml = format!(
        "PROFILES:\n  default: {{}}\nWORKFLOW:\n  copy:\n    RULE:\n      NAME: cp\n      COMMAND: \"cp {{INPUTS}} {{OUTPUT}}\"\n    INPUTS: \"{}\"\n    OUTPUT: \"{}\"\n",
        input.display(),
        output.display()
    );
    let engine = Engine::new(config(&yaml), dir.path().join("state.json"));

    let ok = engine
        .execute("default", None, Arc::new(TracingLogger), None)
        .await
        .unwrap();

    assert!(ok);
    assert!(output.exists());
}

#[tokio::test]
async fn second_build_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "hello").unwrap();
    let output = dir.path().join("out.txt");

    let yaml = format!(
        "PROFILES:\n  default: {{}}\nWORKFLOW:\n  copy:\n    RULE:\n      NAME: cp\n      COMMAND: \"cp {{INPUTS}} {{OUTPUT}}\"\n    INPUTS: \"{}\"\n    OUTPUT: \"{}\"\n",
        input.display(),
        output.display()
    );
    let engine = Engine::new(config(&yaml), dir.path().join("state.json"));

    engine.execute("default", None, Arc::new(TracingLogger), None).await.unwrap();
    let first_mtime = fs::metadata(&output).unwrap().modified().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.execute("default", None, Arc::new(TracingLogger), None).await.unwrap();
    let second_mtime = fs::metadata(&output).unwrap().modified().unwrap();

    assert_eq!(first_mtime, second_mtime, "up-to-date step must not rerun");
}

#[tokio::test]
async fn newer_input_triggers_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "v1").unwrap();
    let output = dir.path().join("out.txt");

    let yaml = format!(
        "PROFILES:\n  default: {{}}\nWORKFLOW:\n  copy:\n    RULE:\n      NAME: cp\n      COMMAND: \"cp {{INPUTS}} {{OUTPUT}}\"\n    INPUTS: \"{}\"\n    OUTPUT: \"{}\"\n",
        input.display(),
        output.display()
    );
    let engine = Engine::new(config(&yaml), dir.path().join("state.json"));
    engine.execute("default", None, Arc::new(TracingLogger), None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    fs::write(&input, "v2 is longer so the mtime and content both change").unwrap();

    let ok = engine.execute("default", None, Arc::new(TracingLogger), None).await.unwrap();
    assert!(ok);
    assert_eq!(fs::read_to_string(&output).unwrap(), "v2 is longer so the mtime and content both change");
}

#[tokio::test]
async fn staleness_propagates_to_descendants() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "v1").unwrap();
    let a_out = dir.path().join("a.txt");
    let b_out = dir.path().join("b.txt");

    let yaml = format!(
        "PROFILES:\n  default: {{}}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: cp\n      COMMAND: \"cp {{INPUTS}} {{OUTPUT}}\"\n    INPUTS: \"{}\"\n    OUTPUT: \"{}\"\n  b:\n    RULE:\n      NAME: cp\n      COMMAND: \"cp {{REQUIRES[0]}} {{OUTPUT}}\"\n    REQUIRES: [a]\n    OUTPUT: \"{}\"\n",
        input.display(),
        a_out.display(),
        b_out.display(),
    );
    let engine = Engine::new(config(&yaml), dir.path().join("state.json"));
    engine.execute("default", None, Arc::new(TracingLogger), None).await.unwrap();
    let b_mtime_1 = fs::metadata(&b_out).unwrap().modified().unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    fs::write(&input, "v2 changed").unwrap();

    engine.execute("default", None, Arc::new(TracingLogger), None).await.unwrap();
    let b_mtime_2 = fs::metadata(&b_out).unwrap().modified().unwrap();

    assert_ne!(b_mtime_1, b_mtime_2, "downstream step must rebuild when its upstream input changes");
}

#[tokio::test]
async fn independent_steps_run_within_one_generation() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "PROFILES:\n  default: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"a.txt\"\n  b:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"b.txt\"\n"
        .replace("a.txt", &dir.path().join("a.txt").to_string_lossy())
        .replace("b.txt", &dir.path().join("b.txt").to_string_lossy());
    let engine = Engine::new(config(&yaml), dir.path().join("state.json"));

    let ok = engine.execute("default", None, Arc::new(TracingLogger), None).await.unwrap();
    assert!(ok);
    assert!(dir.path().join("a.txt").exists());
    assert!(dir.path().join("b.txt").exists());
}

#[tokio::test]
async fn unresolved_placeholder_surfaces_as_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "PROFILES:\n  default: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT} {MISSING_VALUE}\"\n    OUTPUT: \"out.txt\"\n";
    let engine = Engine::new(config(yaml), dir.path().join("state.json"));

    let err = engine
        .execute("default", None, Arc::new(TracingLogger), None)
        .await
        .unwrap_err();

    match err {
        BuildError::Step { source, .. } => assert!(matches!(*source, BuildError::UnresolvedPlaceholder { .. })),
        other => panic!("expected a wrapped UnresolvedPlaceholder, got {other:?}"),
    }
}
