use predicates::prelude::*;

use super::common::{TestEnv, stdout_json};

#[test]
fn dirs_prints_timestamped_paths() {
  let env = TestEnv::new();
  let prefix = env.prefix();

  env
    .hpcrt_cmd()
    .args(["dirs", "testsys", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains(
      prefix.join("stage/ts/testsys/hello").display().to_string(),
    ))
    .stdout(predicate::str::contains(
      prefix.join("output/ts/testsys/hello").display().to_string(),
    ));

  assert!(!prefix.join("stage").exists());
}

#[test]
fn dirs_retry_renames_leaf() {
  let env = TestEnv::new();

  let output = env
    .hpcrt_cmd()
    .args(["--format", "json", "dirs", "testsys", "hello", "--run", "2"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let json = stdout_json(&output);
  assert_eq!(json["run"], 2);
  assert!(json["stagedir"].as_str().unwrap().ends_with("testsys/hello_retry2"));
  assert!(json["outputdir"].as_str().unwrap().ends_with("testsys/hello_retry2"));
}

#[test]
fn dirs_create_wipes_unless_kept() {
  let env = TestEnv::new();
  let stagedir = env.prefix().join("stage/ts/a/b");

  env.hpcrt_cmd().args(["dirs", "a", "b", "--create"]).assert().success();
  assert!(stagedir.is_dir());
  std::fs::write(stagedir.join("leftover"), "x").unwrap();

  env
    .hpcrt_cmd()
    .args(["dirs", "a", "b", "--create", "--keep"])
    .assert()
    .success();
  assert!(stagedir.join("leftover").exists());

  env.hpcrt_cmd().args(["dirs", "a", "b", "--create"]).assert().success();
  assert!(stagedir.is_dir());
  assert!(!stagedir.join("leftover").exists());
}

#[test]
fn sticky_options_override_directories() {
  let env = TestEnv::new();
  let stage = env.temp.path().join("fast");

  env
    .hpcrt_cmd()
    .args(["-o", &format!("systems/stagedir={}", stage.display()), "dirs", "x"])
    .assert()
    .success()
    .stdout(predicate::str::contains(stage.join("ts/x").display().to_string()));
}

#[test]
fn invalid_timestamp_format_fails() {
  let env = TestEnv::new();

  env
    .hpcrt_cmd()
    .args(["-o", "general/timestamp=%Q", "dirs", "x"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid timestamp format"));
}
