use super::*;
use std::time::Instant;

fn bash() -> ShellSpec {
    ShellSpec::parse("sh -c").unwrap()
}

#[test]
fn parse_splits_program_and_flags() {
    let spec = ShellSpec::parse("python3 -u -c").unwrap();
    assert_eq!(spec.program, "python3");
    assert_eq!(spec.args, vec!["-u", "-c"]);
}

#[test]
fn parse_rejects_empty_spec() {
    assert!(ShellSpec::parse("   ").is_err());
}

#[test]
fn resolve_prefers_utd_over_settings() {
    let utd = Utd {
        shell: Some("python3 -c".into()),
        ..Default::default()
    };
    let settings = Settings {
        shell: Some("bash -c".into()),
        ..Default::default()
    };
    let spec = ShellSpec::resolve(&utd, &settings).unwrap();
    assert_eq!(spec.program, "python3");

    let spec = ShellSpec::resolve(&Utd::default(), &settings).unwrap();
    assert_eq!(spec.program, "bash");
}

#[test]
fn timeout_precedence_and_clamp() {
    let settings = Settings {
        timeout: Some(120),
        ..Default::default()
    };
    let utd = Utd {
        timeout: Some(5),
        ..Default::default()
    };
    assert_eq!(resolve_timeout(&utd, &settings), Duration::from_secs(5));
    assert_eq!(
        resolve_timeout(&Utd::default(), &settings),
        Duration::from_secs(120)
    );
    assert_eq!(
        resolve_timeout(&Utd::default(), &Settings::default()),
        Duration::from_secs(30)
    );

    let oversized = Utd {
        timeout: Some(999_999),
        ..Default::default()
    };
    assert_eq!(
        resolve_timeout(&oversized, &Settings::default()),
        Duration::from_secs(3600)
    );
}

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let tmp = tempfile::tempdir().unwrap();
    let out = run(&bash(), "echo hello", tmp.path(), Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(out.stdout.trim(), "hello");
    assert_eq!(out.exit_code, 0);
    assert!(!out.timed_out);
}

#[tokio::test]
async fn nonzero_exit_keeps_output() {
    let tmp = tempfile::tempdir().unwrap();
    let out = run(
        &bash(),
        "echo partial; exit 3",
        tmp.path(),
        Duration::from_secs(10),
    )
    .await
    .unwrap();
    assert_eq!(out.stdout.trim(), "partial");
    assert_eq!(out.exit_code, 3);
}

#[tokio::test]
async fn timeout_kills_within_grace_and_keeps_partial_output() {
    let tmp = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let out = run(
        &bash(),
        "echo early; sleep 10; echo late",
        tmp.path(),
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    // Polite term + 1s grace: well under the 10s the command wanted.
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(out.timed_out);
    assert_eq!(out.stdout.trim(), "early");
}

#[tokio::test]
async fn missing_shell_binary_is_classified() {
    let tmp = tempfile::tempdir().unwrap();
    let ghost = ShellSpec::parse("definitely-not-a-shell-7c1 -c").unwrap();
    let err = run(&ghost, "echo hi", tmp.path(), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast::<StartError>().unwrap(),
        StartError::ShellNotFound
    ));
}

#[tokio::test]
async fn runs_in_working_directory() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();
    let out = run(&bash(), "cat marker.txt", tmp.path(), Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(out.stdout, "here");
}
