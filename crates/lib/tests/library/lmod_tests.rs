//! Activation through the Lmod backend, driven by a fake `lmod` script.

#![cfg(unix)]

use std::path::Path;

use hpcrt_lib::RuntimeError;
use hpcrt_lib::runtime::{
  ModuleUse, TempEnvironment, TempRuntime, emit_load_env_commands, is_env_loaded, load_env, runtime,
};
use serial_test::serial;
use tempfile::TempDir;

use super::common::{install_fake_lmod, site_config};

/// Run `f` on `lmodsys` with `PrgEnv-cray` loaded.
fn with_lmod_runtime<F: FnOnce()>(f: F) {
  let temp = TempDir::new().unwrap();
  let lmod = install_fake_lmod(temp.path());

  temp_env::with_vars(
    [
      ("LMOD_CMD", Some(lmod.to_string_lossy().into_owned())),
      ("LOADEDMODULES", Some("PrgEnv-cray".to_string())),
      ("MODULEPATH", None),
      ("FAKE_LMOD_LAST", None),
      ("HPCRT_IT_CC", None),
      ("HPCRT_IT_PATH", None),
      ("HPCRT_IT_ROOT", Some("/opt/gnu".to_string())),
    ],
    || {
      let _rt = TempRuntime::new(Some(site_config(temp.path(), "lmodsys"))).unwrap();
      f();
    },
  );
}

fn loaded_modules() -> String {
  std::env::var("LOADEDMODULES").unwrap_or_default()
}

#[test]
#[serial]
fn lmod_backend_is_selected_from_config() {
  with_lmod_runtime(|| {
    let rt = runtime().unwrap();
    assert_eq!(rt.modules_system().name(), "lmod");
    assert_eq!(rt.modules_system().version(), Some("8.7.32"));
    assert!(rt.show_config().contains("Modules system: lmod 8.7.32"));
  });
}

#[test]
#[serial]
fn conflicting_modules_are_swapped() {
  with_lmod_runtime(|| {
    let gnu = runtime().unwrap().site_config().environment("gnu").unwrap();

    let (snapshot, commands) = load_env(&[&gnu]).unwrap();

    assert_eq!(
      commands,
      vec![
        "module unload PrgEnv-cray",
        "module load PrgEnv-gnu",
        "export HPCRT_IT_CC=gcc",
        "export HPCRT_IT_PATH=$HPCRT_IT_ROOT/bin",
      ]
    );
    assert_eq!(loaded_modules(), "PrgEnv-gnu");
    assert_eq!(std::env::var("FAKE_LMOD_LAST").unwrap(), "PrgEnv-gnu");
    assert!(is_env_loaded(&gnu).unwrap());

    // Module state lives in the environment, so the snapshot reverts it too
    snapshot.restore();
    assert_eq!(loaded_modules(), "PrgEnv-cray");
    assert!(!is_env_loaded(&gnu).unwrap());
  });
}

#[test]
#[serial]
fn already_loaded_modules_are_still_emitted() {
  with_lmod_runtime(|| {
    let cray = runtime().unwrap().site_config().environment("cray").unwrap();

    let commands = emit_load_env_commands(&[&cray]).unwrap();

    // The replaying shell starts without the module, so the load is emitted
    assert_eq!(commands, vec!["module load PrgEnv-cray"]);
    // but lmod itself is never asked to load it again
    assert!(std::env::var("FAKE_LMOD_LAST").is_err());
    assert_eq!(loaded_modules(), "PrgEnv-cray");
  });
}

#[test]
#[serial]
fn temp_environment_unloads_on_drop() {
  with_lmod_runtime(|| {
    {
      let env = TempEnvironment::new(&["cudatoolkit"], &[("HPCRT_IT_CC", "nvc")]).unwrap();
      assert_eq!(env.commands(), ["module load cudatoolkit", "export HPCRT_IT_CC=nvc"]);
      assert_eq!(loaded_modules(), "PrgEnv-cray:cudatoolkit");
    }
    assert_eq!(loaded_modules(), "PrgEnv-cray");
    assert!(std::env::var("HPCRT_IT_CC").is_err());
  });
}

#[test]
#[serial]
fn unknown_module_fails_and_names_environment() {
  with_lmod_runtime(|| {
    let before = loaded_modules();

    let err = TempEnvironment::new(&["missing"], &[]).unwrap_err();

    match &err {
      RuntimeError::ModuleLoad { environment, module, source } => {
        assert_eq!(environment, "_hpcrt_temp_env");
        assert_eq!(module, "missing");
        assert!(source.to_string().contains("unknown"));
      }
      other => panic!("unexpected error: {}", other),
    }
    assert_eq!(loaded_modules(), before);
  });
}

#[test]
#[serial]
fn module_use_extends_search_path_for_scope() {
  with_lmod_runtime(|| {
    let rt = runtime().unwrap();
    {
      let _use = ModuleUse::new(&["/opt/site/modules"]).unwrap();
      assert_eq!(rt.modules_system().searchpath(), vec!["/opt/site/modules"]);
    }
    assert!(rt.modules_system().searchpath().is_empty());
    assert!(std::env::var("MODULEPATH").is_err());
  });
}

#[test]
#[serial]
fn missing_lmod_command_is_fatal() {
  let temp = TempDir::new().unwrap();
  temp_env::with_var_unset("LMOD_CMD", || {
    let err = TempRuntime::new(Some(site_config(temp.path(), "lmodsys"))).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("LMOD_CMD"));
  });
}

#[test]
#[serial]
fn lmod_path_must_exist() {
  temp_env::with_var("LMOD_CMD", Some(Path::new("/nonexistent/lmod")), || {
    let temp = TempDir::new().unwrap();
    let err = TempRuntime::new(Some(site_config(temp.path(), "lmodsys"))).unwrap_err();
    assert!(matches!(err, RuntimeError::Fatal(_)));
  });
}
