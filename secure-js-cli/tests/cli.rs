use assert_cmd::Command;
use serde_json::Value;
use std::time::Duration;
use tempfile::tempdir;

fn secure_js_cli() -> Command {
  assert_cmd::cargo::cargo_bin_cmd!("secure-js")
}

fn parse_stdout_json(stdout: &[u8]) -> Value {
  serde_json::from_slice(stdout).expect("stdout should be valid JSON")
}

#[test]
fn untouched_realm_is_secure() {
  let assert = secure_js_cli()
    .timeout(Duration::from_secs(5))
    .arg("--strict")
    .assert()
    .success();

  let report = parse_stdout_json(&assert.get_output().stdout);
  assert_eq!(report["secure"], true);
  let status = report["status"].as_object().unwrap();
  assert_eq!(status.len(), 9);
  assert!(status.values().all(|flag| flag == true));
  assert_eq!(report["insecure_flags"], serde_json::json!([]));
  assert_eq!(report["problems"], serde_json::json!([]));
}

#[test]
fn tampered_nan_is_reported_insecure() {
  let assert = secure_js_cli()
    .timeout(Duration::from_secs(5))
    .args(["--tamper", "NaN=42"])
    .assert()
    .success();

  let report = parse_stdout_json(&assert.get_output().stdout);
  assert_eq!(report["secure"], false);
  assert_eq!(report["status"]["NAN_PROTECTION"], false);
  assert_eq!(report["status"]["NAN_VALUE"], false);
  assert_eq!(report["status"]["UNDEFINED_PROTECTION"], true);
  let flags: Vec<&str> = report["insecure_flags"]
    .as_array()
    .unwrap()
    .iter()
    .map(|flag| flag.as_str().unwrap())
    .collect();
  assert!(flags.contains(&"NAN_PROTECTION"));
  assert!(flags.contains(&"NAN_VALUE"));
}

#[test]
fn strict_mode_fails_when_insecure() {
  secure_js_cli()
    .timeout(Duration::from_secs(5))
    .args(["--tamper", "undefined=42", "--strict"])
    .assert()
    .failure();
}

#[test]
fn overwritten_globals_are_restored() {
  let assert = secure_js_cli()
    .timeout(Duration::from_secs(5))
    .args(["--overwrite", "undefined=1", "--overwrite", "Infinity=0", "--strict"])
    .assert()
    .success();

  let report = parse_stdout_json(&assert.get_output().stdout);
  assert_eq!(report["secure"], true);
  assert_eq!(report["status"]["UNDEFINED_VALUE"], true);
  assert_eq!(report["status"]["INFINITY_VALUE"], true);
}

#[test]
fn lock_stdlib_reports_prelocked_members() {
  let assert = secure_js_cli()
    .timeout(Duration::from_secs(5))
    .args([
      "--prelock",
      "Object.prototype.toString",
      "--prelock",
      "Math.max",
      "--lock-stdlib",
    ])
    .assert()
    .success();

  let report = parse_stdout_json(&assert.get_output().stdout);
  let problems = report["problems"].as_array().unwrap();
  assert_eq!(problems.len(), 2);
  assert_eq!(problems[0]["key"], "Object.prototype.toString");
  assert_eq!(problems[0]["reason"], "already-protected");
  assert_eq!(problems[1]["key"], "Math.max");
  assert_eq!(problems[1]["reason"], "already-protected");
}

#[test]
fn lock_stdlib_problems_fail_strict_mode() {
  secure_js_cli()
    .timeout(Duration::from_secs(5))
    .args(["--prelock", "Date.now", "--lock-stdlib", "--strict"])
    .assert()
    .failure();
}

#[test]
fn eval_calls_are_observed_once_each() {
  let assert = secure_js_cli()
    .timeout(Duration::from_secs(5))
    .args(["--eval", "6*7", "--eval", "(1 + 2) * 3"])
    .assert()
    .success();

  let report = parse_stdout_json(&assert.get_output().stdout);
  assert_eq!(report["evaluations"][0]["result"], "42");
  assert_eq!(report["evaluations"][1]["result"], "9");
  assert_eq!(
    report["dynamic_executions"],
    serde_json::json!(["secure-js", "secure-js"])
  );
}

#[test]
fn config_file_sets_realm_and_load_options() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("config.json");
  std::fs::write(
    &path,
    r#"{"realm": {"dynamic_execution_reads": 2}, "secure": {"report_insecure": false}}"#,
  )
  .unwrap();

  let assert = secure_js_cli()
    .timeout(Duration::from_secs(5))
    .arg("--config")
    .arg(&path)
    .args(["--tamper", "NaN=1", "--eval", "1", "--eval", "2"])
    .assert()
    .success();

  let report = parse_stdout_json(&assert.get_output().stdout);
  assert_eq!(report["secure"], false);
  // Failures are still recorded, but no event is published for them.
  assert_eq!(report["insecure_flags"], serde_json::json!([]));
  assert_eq!(report["dynamic_executions"].as_array().unwrap().len(), 2);
}

#[test]
fn disabled_observer_leaves_eval_flag_false() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("config.json");
  std::fs::write(&path, r#"{"secure": {"observe_dynamic_execution": false}}"#).unwrap();

  let assert = secure_js_cli()
    .timeout(Duration::from_secs(5))
    .arg("--config")
    .arg(&path)
    .args(["--eval", "1"])
    .assert()
    .success();

  let report = parse_stdout_json(&assert.get_output().stdout);
  assert_eq!(report["status"]["EVAL"], false);
  assert_eq!(report["insecure_flags"], serde_json::json!(["EVAL"]));
  assert_eq!(report["dynamic_executions"], serde_json::json!([]));
  assert_eq!(report["evaluations"][0]["result"], "1");
}

#[test]
fn invalid_config_is_rejected() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("config.json");
  std::fs::write(&path, r#"{"secure": {"unknown_option": true}}"#).unwrap();

  secure_js_cli()
    .timeout(Duration::from_secs(5))
    .arg("--config")
    .arg(&path)
    .assert()
    .failure();
}

#[test]
fn malformed_assignment_is_rejected() {
  secure_js_cli()
    .timeout(Duration::from_secs(5))
    .args(["--tamper", "NaN"])
    .assert()
    .failure();
}
