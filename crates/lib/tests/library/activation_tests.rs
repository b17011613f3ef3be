//! Environment activation against the current runtime.

use hpcrt_lib::environment::Snapshot;
use hpcrt_lib::runtime::{
  TempEnvironment, TempRuntime, emit_load_env_commands, is_env_loaded, load_env, runtime,
};
use hpcrt_lib::{ConfigError, RuntimeError};
use serial_test::serial;
use tempfile::TempDir;

use super::common::site_config;

fn test_vars() -> [(&'static str, Option<&'static str>); 4] {
  [
    ("HPCRT_IT_CC", None),
    ("HPCRT_IT_PATH", None),
    ("HPCRT_IT_ROOT", Some("/opt/gnu")),
    ("HPCRT_IT_EXTRA", None),
  ]
}

#[test]
#[serial]
fn configured_environment_loads_and_restores() {
  let temp = TempDir::new().unwrap();
  temp_env::with_vars(test_vars(), || {
    let _rt = TempRuntime::new(Some(site_config(temp.path(), "testsys"))).unwrap();
    let gnu = runtime().unwrap().site_config().environment("gnu").unwrap();

    let (snapshot, commands) = load_env(&[&gnu]).unwrap();

    // nomod emits nothing for modules
    assert_eq!(
      commands,
      vec!["export HPCRT_IT_CC=gcc", "export HPCRT_IT_PATH=$HPCRT_IT_ROOT/bin"]
    );
    assert_eq!(std::env::var("HPCRT_IT_PATH").unwrap(), "/opt/gnu/bin");
    assert!(is_env_loaded(&gnu).unwrap());

    snapshot.restore();
    assert!(std::env::var("HPCRT_IT_CC").is_err());
    assert!(!is_env_loaded(&gnu).unwrap());
  });
}

#[test]
#[serial]
fn system_preload_and_partition_environments_compose() {
  let temp = TempDir::new().unwrap();
  temp_env::with_vars([("HPCRT_IT_SITE", None::<&str>), ("HPCRT_IT_CC", None)], || {
    let _rt = TempRuntime::new(Some(site_config(temp.path(), "testsys"))).unwrap();
    let rt = runtime().unwrap();
    let builtin = rt.site_config().environment("builtin").unwrap();
    let login = rt.system().partition("login").unwrap();

    let commands = emit_load_env_commands(&[rt.system().preload_env(), login.local_env(), &builtin]).unwrap();

    assert_eq!(commands, vec!["export HPCRT_IT_SITE=testsys", "export HPCRT_IT_CC=cc"]);
    assert!(std::env::var("HPCRT_IT_SITE").is_err());
  });
}

#[test]
fn environments_outside_the_system_are_not_found() {
  let temp = TempDir::new().unwrap();
  let config = site_config(temp.path(), "testsys");

  // Explicitly targeted entries come first
  assert_eq!(config.environment_names(), vec!["gnu", "builtin"]);
  assert!(matches!(
    config.environment("cray"),
    Err(ConfigError::EnvironmentNotFound(_))
  ));
}

#[test]
#[serial]
fn activation_requires_a_runtime() {
  let _reset = TempRuntime::new(None).unwrap();
  let env = hpcrt_lib::Environment::new("empty");

  assert!(matches!(load_env(&[&env]), Err(RuntimeError::NotConfigured)));
  assert!(matches!(is_env_loaded(&env), Err(RuntimeError::NotConfigured)));
  assert!(matches!(TempEnvironment::new(&[], &[]), Err(RuntimeError::NotConfigured)));
}

#[test]
#[serial]
fn environment_and_runtime_switches_nest() {
  let temp = TempDir::new().unwrap();
  temp_env::with_vars(test_vars(), || {
    let before = Snapshot::capture();
    {
      let _rt = TempRuntime::new(Some(site_config(temp.path(), "testsys"))).unwrap();
      let _outer = TempEnvironment::new(&[], &[("HPCRT_IT_EXTRA", "outer")]).unwrap();
      {
        let _none = TempRuntime::new(None).unwrap();
        // The environment switch does not depend on the current runtime
        assert_eq!(std::env::var("HPCRT_IT_EXTRA").unwrap(), "outer");
      }
      let _inner = TempEnvironment::new(&[], &[("HPCRT_IT_EXTRA", "inner")]).unwrap();
      assert_eq!(std::env::var("HPCRT_IT_EXTRA").unwrap(), "inner");
    }
    assert_eq!(Snapshot::capture(), before);
  });
}
