use std::process::{Command, Output};

fn streamconv(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_streamconv"))
        .args(args)
        .output()
        .expect("run streamconv")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_passes_for_fixture_pipeline() {
    let output = streamconv(&[
        "check",
        "--config",
        "tests/fixtures/encoder_decoder.yaml",
        "--length",
        "300",
        "--chunk",
        "37",
        "--batch",
        "2",
        "--verbose",
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    let text = stdout(&output);
    assert!(text.contains("forward:  [2, 1, 300]"), "stdout: {text}");
    assert!(text.contains("max abs diff"));
    assert!(stderr.contains("pipeline.step"));
}

#[test]
fn check_fails_for_missing_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.yaml");
    let output = streamconv(&["check", "--config", missing.to_str().expect("utf8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config file not found"));
}

#[test]
fn frames_reports_padding_arithmetic() {
    let output = streamconv(&[
        "frames",
        "--length",
        "11",
        "--kernel-size",
        "4",
        "--stride",
        "2",
    ]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(
        text.contains("padding:          left=2 right=1"),
        "stdout: {text}"
    );
    assert!(text.contains("output frames:    6"));
    assert!(text.contains("streamed frames:  5 (+1 on flush)"));

    let centered = streamconv(&[
        "frames",
        "--length",
        "10",
        "--kernel-size",
        "7",
        "--stride",
        "1",
        "--centered",
    ]);
    let text = stdout(&centered);
    assert!(text.contains("left=3 right=3"), "stdout: {text}");
    assert!(!text.contains("streamed frames"));
}
